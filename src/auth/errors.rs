//! Authentication Errors
//! Mission: One stable, caller-safe message per failure kind

use serde::Serialize;
use thiserror::Error;

/// Failure kinds reported on every engine result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    InvalidClient,
    InvalidCredentials,
    AlreadyExists,
    NotFound,
    InvalidToken,
    Invalid,
    Internal,
}

/// Engine error. `Display` is what the caller sees; internal causes are
/// logged where the error is produced and never carried here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid client ID")]
    InvalidClient,

    // Identical for unknown email, wrong password and foreign-tenant email.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    AlreadyExists,

    #[error("User not found")]
    NotFound,

    #[error("Invalid refresh token")]
    InvalidToken,

    #[error("Invalid token")]
    Invalid,

    #[error("Internal server error")]
    Internal,
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) => ErrorKind::ValidationError,
            AuthError::InvalidClient => ErrorKind::InvalidClient,
            AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthError::AlreadyExists => ErrorKind::AlreadyExists,
            AuthError::NotFound => ErrorKind::NotFound,
            AuthError::InvalidToken => ErrorKind::InvalidToken,
            AuthError::Invalid => ErrorKind::Invalid,
            AuthError::Internal => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_generic() {
        assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid credentials");
        assert_eq!(AuthError::Internal.to_string(), "Internal server error");
        assert_eq!(
            AuthError::validation("email is required").to_string(),
            "email is required"
        );
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&AuthError::InvalidToken.kind()).unwrap();
        assert_eq!(json, r#""invalid_token""#);
        let json = serde_json::to_string(&ErrorKind::ValidationError).unwrap();
        assert_eq!(json, r#""validation_error""#);
    }
}
