//! Error types for the ledger.

use thiserror::Error;

/// Ledger operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Ledger errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// A row that must exist after an insert/upsert could not be read back.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// True for transient lock/busy contention that callers should retry
    /// with backoff, recycling the connection once the budget runs out.
    pub fn is_busy(&self) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::Database(db)) => {
                let msg = db.message().to_ascii_lowercase();
                msg.contains("locked") || msg.contains("busy")
            }
            DbError::Sqlx(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}
