//! Error types for wq-guard.
//!
//! All fallible operations in the crate return [`Result<T>`], whose error type
//! [`WqError`] separates caller mistakes (rejected before storage is touched)
//! from bad stored data and from storage failures.

use thiserror::Error;

/// The main error type for wq-guard.
#[derive(Error, Debug)]
pub enum WqError {
    /// A request parameter was malformed or out of its allowed domain.
    #[error("{0}")]
    InvalidArgument(String),

    /// A stored value of a declared-numeric field could not be read as a number.
    #[error("Data integrity error in field '{field}': {message}")]
    DataIntegrity {
        /// Field holding the offending value
        field: String,
        /// Detailed error message
        message: String,
    },

    /// The store could not plan or execute a query.
    #[error("Storage error during {operation}: {message}")]
    Storage {
        /// Store operation that failed (e.g. "count", "find")
        operation: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A store call did not finish within the configured timeout.
    #[error("Storage operation '{operation}' timed out after {timeout_ms} ms")]
    Timeout {
        /// Store operation that timed out
        operation: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// Error from batch source discovery or reading.
    #[error("Data source error ({source_type}): {message}")]
    DataSource {
        /// Type of data source (e.g., "CSV")
        source_type: String,
        /// Detailed error message
        message: String,
    },

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, WqError>`.
pub type Result<T> = std::result::Result<T, WqError>;

impl WqError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates a data integrity error for `field`.
    pub fn data_integrity(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataIntegrity {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a storage error without an underlying cause.
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a storage error wrapping the error that caused it.
    pub fn storage_with_source(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new data source error.
    pub fn data_source(source_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataSource {
            source_type: source_type.into(),
            message: message.into(),
        }
    }

    /// Returns true when the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// HTTP-style status class for the request surface.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) => 400,
            Self::DataIntegrity { .. } => 422,
            Self::Timeout { .. } => 504,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_invalid_argument_displays_bare_message() {
        let err = WqError::invalid_argument("limit must be > 0");
        assert_eq!(err.to_string(), "limit must be > 0");
        assert!(err.is_client_error());
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_status_classes() {
        assert_eq!(
            WqError::data_integrity("temperature", "not a number").status_code(),
            422
        );
        assert_eq!(WqError::storage("count", "table missing").status_code(), 500);
        assert_eq!(
            WqError::Timeout {
                operation: "find".to_string(),
                timeout_ms: 10
            }
            .status_code(),
            504
        );
        assert!(!WqError::Internal("x".to_string()).is_client_error());
    }

    #[test]
    fn test_storage_with_source_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = WqError::storage_with_source("find", "scan failed", Box::new(io_error));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "Storage error during find: scan failed");
    }
}
