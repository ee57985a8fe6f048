//! Errors produced by the identity store and the session rules.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Invalid date: {0}")]
    InvalidDateFormat(String),

    #[error("This session has already taken place")]
    SessionInPast,

    #[error("You are already a member of this session")]
    AlreadyMember,

    #[error("You are not a member of this session")]
    NotAMember,

    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("A user with this {field} already exists")]
    UniqueConstraintViolation { field: &'static str },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Failed to hash password: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl CoreError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        CoreError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Application-level outcomes the caller can report to the user.
    /// Anything else is an infrastructure failure.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CoreError::Database(_) | CoreError::PasswordHash(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Returns true if the error is a UNIQUE/PRIMARY KEY violation reported by SQLite.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}
