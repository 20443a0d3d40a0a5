//! Error types for the corella-db crate.

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// A query failed to execute.
    #[error("query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl DbError {
    /// Check if this error indicates a connection problem (worth retrying).
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            DbError::ConnectionFailed(_) => true,
            DbError::QueryFailed(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    /// Check if this error is a missing-row error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
            || matches!(self, DbError::QueryFailed(sqlx::Error::RowNotFound))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
