//! Error types for the repository layer.

use thiserror::Error;

/// Repository operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Repository errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Bad or missing configuration
    #[error("Database configuration error: {0}")]
    Config(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Safety brake: the primary table is at capacity, writes fail closed
    #[error("Primary table at capacity: {current}/{limit} rows")]
    CapacityExceeded { current: i64, limit: i64 },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// True when the safety brake tripped; the run must end FAILED.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}
