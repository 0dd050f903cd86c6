//! Adafruit IO keys.

use crate::rule::{
    alpha_numeric_extended_short, fixture, semi_generic_regex, Rule, RuleSpec, SimpleRule,
};

pub fn api_key() -> Box<dyn Rule> {
    SimpleRule::new(
        RuleSpec::new(
            "adafruit-api-key",
            "Adafruit API Key",
            semi_generic_regex(&["adafruit"], &alpha_numeric_extended_short(32)),
        )
        .secret_group(1)
        .keywords(&["adafruit"])
        .true_positives([fixture("adafruit", "1a2b3c4d5e6f7g8h9i0j1k2l3m4n5o6p")]),
    )
}
