// Error handling framework

use thiserror::Error;

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Redis and distributed-lock errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    RedisError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Lock already held for resource: {0}")]
    LockHeld(String),
}

/// Push delivery errors
///
/// A `PushError` is batch-level: per-message delivery failures are reported
/// through `SendOutcome` entries, not through this type.
#[derive(Error, Debug)]
pub enum PushError {
    #[error("Failed to build push request: {0}")]
    RequestBuild(String),

    #[error("Push endpoint unreachable: {0}")]
    Transport(String),

    #[error("Push endpoint rejected the batch: {0}")]
    BatchRejected(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => DatabaseError::QueryFailed(db_err.message().to_string()),
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::RedisError(err.to_string())
    }
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            PushError::RequestBuild(err.to_string())
        } else {
            PushError::Transport(err.to_string())
        }
    }
}
