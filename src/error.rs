//! Error types for DAO operations.

use thiserror::Error;

/// Result type for DAO operations.
pub type DaoResult<T> = Result<T, DaoError>;

/// Server error codes that signal a `distinct` field path the server cannot
/// evaluate. These are downgraded to an empty result instead of propagating.
pub const UNSUPPORTED_FIELD_PATH_CODES: [i32; 2] = [16410, 40352];

/// Errors that can occur in the data-access layer.
#[derive(Error, Debug)]
pub enum DaoError {
    /// Invalid configuration value, surfaced before any connection attempt.
    #[error("configuration error: {0}")]
    Config(String),

    /// The underlying connect call was rejected. The registry entry is
    /// evicted before this surfaces, so the next `connect()` retries fresh.
    #[error("connection error: {0}")]
    Connection(String),

    /// The caller supplied an invalid value, rejected before any I/O.
    #[error("argument error: {0}")]
    Argument(String),

    /// The server rejected an operation.
    #[error("operation error: {message}")]
    Operation {
        /// Server error code, when the server reported one.
        code: Option<i32>,
        message: String,
    },

    /// MongoDB driver error that is not a server-side command failure.
    #[error("mongodb error: {0}")]
    Driver(mongodb::error::Error),

    /// BSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DaoError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create an argument error.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    /// Create an operation error with an optional server code.
    pub fn operation(code: Option<i32>, message: impl Into<String>) -> Self {
        Self::Operation {
            code,
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this is an argument error.
    pub fn is_argument_error(&self) -> bool {
        matches!(self, Self::Argument(_))
    }

    /// Check if the server rejected a `distinct` because the field path
    /// cannot be evaluated.
    pub fn is_unsupported_field_path(&self) -> bool {
        matches!(
            self,
            Self::Operation { code: Some(code), .. } if UNSUPPORTED_FIELD_PATH_CODES.contains(code)
        )
    }
}

impl From<mongodb::error::Error> for DaoError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            mongodb::error::ErrorKind::Command(command) => DaoError::Operation {
                code: Some(command.code),
                message: command.message.clone(),
            },
            _ => DaoError::Driver(err),
        }
    }
}

impl From<bson::ser::Error> for DaoError {
    fn from(err: bson::ser::Error) -> Self {
        DaoError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for DaoError {
    fn from(err: bson::de::Error) -> Self {
        DaoError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = DaoError::config("invalid readPreference");
        assert!(matches!(err, DaoError::Config(_)));

        let err = DaoError::connection("connection refused");
        assert!(err.is_connection_error());

        let err = DaoError::argument("invalid object id");
        assert!(err.is_argument_error());
    }

    #[test]
    fn test_error_display() {
        let err = DaoError::config("test error");
        assert_eq!(err.to_string(), "configuration error: test error");

        let err = DaoError::operation(Some(11000), "duplicate key");
        assert_eq!(err.to_string(), "operation error: duplicate key");
    }

    #[test]
    fn test_unsupported_field_path() {
        for code in UNSUPPORTED_FIELD_PATH_CODES {
            assert!(DaoError::operation(Some(code), "bad field path").is_unsupported_field_path());
        }
        assert!(!DaoError::operation(Some(11000), "duplicate key").is_unsupported_field_path());
        assert!(!DaoError::operation(None, "no code").is_unsupported_field_path());
        assert!(!DaoError::connection("refused").is_unsupported_field_path());
    }
}
