//! Error types for the storage layer.

use thiserror::Error;

/// Storage operation result type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage errors, split so callers can retry the transient class.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Storage signalled overload; the operation may succeed after backoff
    #[error("Storage throttled: {0}")]
    Throttled(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Query(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row that should be well-formed is not
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// True for the overload class the engine retries with backoff.
    pub fn is_throttled(&self) -> bool {
        matches!(self, StoreError::Throttled(_))
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Classify an sqlx error. SQLITE_BUSY / SQLITE_LOCKED surface as
    /// `Throttled`; everything else stays a query error.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            let message = db.message().to_lowercase();
            if message.contains("database is locked")
                || message.contains("database table is locked")
                || message.contains("busy")
            {
                return StoreError::Throttled(db.message().to_string());
            }
        }
        StoreError::Query(err)
    }
}
