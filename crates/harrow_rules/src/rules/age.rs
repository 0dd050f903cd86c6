//! Age encryption secret keys.

use crate::rule::{Rule, RuleSpec, SimpleRule};
use regex::Regex;

pub fn secret_key() -> Box<dyn Rule> {
    SimpleRule::new(
        RuleSpec::new(
            "age-secret-key",
            "Age secret key",
            Regex::new(r"AGE-SECRET-KEY-1[QPZRY9X8GF2TVDW0S3JN54KHCE6MUA7L]{58}")
                .expect("age secret pattern"),
        )
        .keywords(&["AGE-SECRET-KEY-1"])
        .true_positives([format!("apiKey = \"AGE-SECRET-KEY-1{}\"", "Q".repeat(58))]),
    )
}
