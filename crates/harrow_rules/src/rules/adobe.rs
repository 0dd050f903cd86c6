//! Adobe OAuth credentials.

use crate::rule::{fixture, semi_generic_regex, unique_token_regex, Rule, RuleSpec, SimpleRule};

pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![
        SimpleRule::new(
            RuleSpec::new(
                "adobe-client-id",
                "Adobe Client ID (OAuth Web)",
                semi_generic_regex(&["adobe"], &crate::rule::hex_of(32)),
            )
            .secret_group(1)
            .keywords(&["adobe"])
            .true_positives([fixture("adobe", "0123456789abcdef0123456789abcdef")]),
        ),
        SimpleRule::new(
            RuleSpec::new(
                "adobe-client-secret",
                "Adobe Client Secret",
                unique_token_regex(r"p8e-[a-z0-9]{32}"),
            )
            .secret_group(1)
            .keywords(&["p8e-"])
            .true_positives(["adobeClient = \"p8e-0123456789abcdef0123456789abcdef\""]),
        ),
    ]
}
