//! Rule engine errors.
//!
//! Registration failures are fatal by design: a rule that cannot prove
//! itself against its own fixtures must never run.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuleError>;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("duplicated rule id: {0}")]
    DuplicateId(String),

    #[error("rule '{rule}' failed validation: true positive produced no findings: {fixture:?}")]
    TruePositiveMissed { rule: String, fixture: String },

    #[error("rule '{rule}' failed validation: false positive produced findings: {fixture:?}")]
    FalsePositiveMatched { rule: String, fixture: String },

    #[error("rule '{rule}' has no keywords and can never match")]
    NoKeywords { rule: String },
}
