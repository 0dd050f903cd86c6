//! Secret-detection rule engine for Harrow.
//!
//! A [`RuleSet`] holds an immutable collection of validated detection rules
//! and scans text for leaked credentials. Rules are registered through one
//! explicit bootstrap list ([`rules::builtin_rules`]); there is no runtime
//! discovery. Every rule proves itself at registration against its own
//! true/false-positive fixtures, so a broken pattern can never run silently.
//!
//! Matching per rule: keyword pre-filter, primary regex (with a designated
//! secret capture group), in-run dedup, exclusion substrings, false-positive
//! regex suppression, then a post-processing hook that can enrich a finding
//! with structured fields (username/password/domain/token/expiry) or veto it
//! outright. Surviving findings carry a severity (0-100), optionally a
//! Shannon entropy, and a fingerprint used downstream for deduplication.

mod engine;
mod entropy;
mod error;
mod rule;
pub mod rules;

pub use engine::{Finding, RuleFindings, RuleSet};
pub use entropy::{shannon_entropy, LeakContext};
pub use error::{Result, RuleError};
pub use rule::{
    alpha_numeric_extended_short, fixture, hex_of, semi_generic_regex, unique_token_regex,
    Enrichment, Outcome, Rule, RuleSpec, SimpleRule,
};
pub use rules::builtin_rules;
