//! Error types for the authorization engine

use portcullis_core::CoreError;
use thiserror::Error;

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed or incomplete entity; raised at entity boundaries,
    /// never reaches storage
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Semantic duplicate detected at create time via the hash index
    #[error("Duplicate entity (hash {hash}): collides with {existing_ids:?}")]
    Duplicate {
        /// Content hash both entities share
        hash: String,
        /// IDs already registered under this hash
        existing_ids: Vec<String>,
    },

    /// Authorization failure: no match, or a caller-visible diagnostic
    #[error("Auth error [{code}]: {message}")]
    Auth {
        /// Stable diagnostic code
        code: String,
        /// Human-readable detail
        message: String,
    },

    /// Backend failure
    #[error("Database error: {0}")]
    Database(String),

    /// Constraint template parse/exec failure
    #[error("Marshal error: {0}")]
    Marshal(String),

    /// Catch-all for internal invariant violations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthzError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        AuthzError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        AuthzError::NotFound(msg.into())
    }

    /// Create an auth error with a diagnostic code
    pub fn auth<C: Into<String>, S: Into<String>>(code: C, msg: S) -> Self {
        AuthzError::Auth {
            code: code.into(),
            message: msg.into(),
        }
    }

    /// Create a marshal error
    pub fn marshal<S: Into<String>>(msg: S) -> Self {
        AuthzError::Marshal(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        AuthzError::Internal(msg.into())
    }
}

impl From<CoreError> for AuthzError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => AuthzError::NotFound(msg),
            CoreError::Database(msg) => AuthzError::Database(msg),
            CoreError::Serialization(msg) => AuthzError::Marshal(msg),
            other => AuthzError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AuthzError {
    fn from(err: serde_json::Error) -> Self {
        AuthzError::Marshal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_mapping() {
        let err: AuthzError = CoreError::not_found("role r1").into();
        assert!(matches!(err, AuthzError::NotFound(_)));

        let err: AuthzError = CoreError::database("boom").into();
        assert!(matches!(err, AuthzError::Database(_)));
    }

    #[test]
    fn test_auth_error_display() {
        let err = AuthzError::auth("no-permissions", "nothing matched");
        assert_eq!(
            err.to_string(),
            "Auth error [no-permissions]: nothing matched"
        );
    }
}
