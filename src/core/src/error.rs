//! Unified error types for the storage and configuration layers

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type shared across storage backends
#[derive(Debug, Error)]
pub enum CoreError {
    /// Key or record not found in the backing store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend failure (connection, version conflict, corrupt record)
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/Deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input/state
    #[error("Invalid: {0}")]
    Invalid(String),

    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        CoreError::NotFound(msg.into())
    }

    /// Create a database error
    pub fn database<S: Into<String>>(msg: S) -> Self {
        CoreError::Database(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        CoreError::Serialization(msg.into())
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        CoreError::Configuration(msg.into())
    }

    /// Create an invalid error
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        CoreError::Invalid(msg.into())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = CoreError::not_found("principal p1");
        assert!(matches!(err, CoreError::NotFound(_)));

        let err = CoreError::database("version conflict");
        assert!(matches!(err, CoreError::Database(_)));
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::database("connection failed");
        assert_eq!(err.to_string(), "Database error: connection failed");

        let err = CoreError::not_found("role r1");
        assert_eq!(err.to_string(), "Not found: role r1");
    }
}
