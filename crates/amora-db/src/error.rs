//! Typed store errors. The API layer maps these onto its client-facing
//! error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found: {0}")]
    UserNotFound(i64),

    #[error("connection request not found: {0}")]
    RequestNotFound(i64),

    #[error("user {user_id} is not the receiver of request {request_id}")]
    NotReceiver { request_id: i64, user_id: i64 },

    #[error("{0}")]
    Conflict(String),

    #[error("connection lock poisoned")]
    LockPoisoned,

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// True when the error is a SQLite UNIQUE/constraint failure. The unique
/// constraints on likes, connection_requests and matches are the race-safety
/// backstop for concurrent check-then-insert attempts.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
