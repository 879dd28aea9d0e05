//! Domain error types
//!
//! This module defines the error hierarchy for the publisher. All errors are
//! domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main publisher error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum DwcaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Search backend errors
    #[error("Search backend error: {0}")]
    Search(#[from] SearchError),

    /// Provider metadata / state storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Archive writing or assembly errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Export process errors
    #[error("Export error: {0}")]
    Export(String),

    /// A full export retrieved fewer rows than the backend reported
    #[error("Incomplete export: retrieved {retrieved} of {expected} expected records")]
    Incomplete { retrieved: u64, expected: u64 },

    /// Work was stopped by a cancellation signal
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// State management errors
    #[error("State management error: {0}")]
    State(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl DwcaError {
    /// Whether the error represents an intentional stop rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DwcaError::Cancelled(_))
    }
}

/// Search backend errors
///
/// Errors that occur when talking to the observation search backend.
/// These errors don't expose third-party HTTP client types.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Failed to connect to the search backend
    #[error("Failed to connect to search backend: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid response from the backend
    #[error("Invalid response from search backend: {0}")]
    InvalidResponse(String),

    /// Opening or closing a point-in-time snapshot failed
    #[error("Point-in-time error: {0}")]
    PointInTime(String),

    /// Query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for DwcaError {
    fn from(err: std::io::Error) -> Self {
        DwcaError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for DwcaError {
    fn from(err: serde_json::Error) -> Self {
        DwcaError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for DwcaError {
    fn from(err: toml::de::Error) -> Self {
        DwcaError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<csv::Error> for DwcaError {
    fn from(err: csv::Error) -> Self {
        DwcaError::Archive(format!("CSV write error: {err}"))
    }
}

impl From<zip::result::ZipError> for DwcaError {
    fn from(err: zip::result::ZipError) -> Self {
        DwcaError::Archive(format!("Zip error: {err}"))
    }
}

impl From<quick_xml::Error> for DwcaError {
    fn from(err: quick_xml::Error) -> Self {
        DwcaError::Archive(format!("XML error: {err}"))
    }
}

impl From<quick_xml::SeError> for DwcaError {
    fn from(err: quick_xml::SeError) -> Self {
        DwcaError::Serialization(format!("XML serialization error: {err}"))
    }
}

impl From<quick_xml::DeError> for DwcaError {
    fn from(err: quick_xml::DeError) -> Self {
        DwcaError::Serialization(format!("XML deserialization error: {err}"))
    }
}

impl From<tokio::task::JoinError> for DwcaError {
    fn from(err: tokio::task::JoinError) -> Self {
        DwcaError::Other(format!("Background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dwca_error_display() {
        let err = DwcaError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_search_error_conversion() {
        let search_err = SearchError::ConnectionFailed("Network error".to_string());
        let err: DwcaError = search_err.into();
        assert!(matches!(err, DwcaError::Search(_)));
    }

    #[test]
    fn test_incomplete_display() {
        let err = DwcaError::Incomplete {
            retrieved: 980,
            expected: 1000,
        };
        assert_eq!(
            err.to_string(),
            "Incomplete export: retrieved 980 of 1000 expected records"
        );
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_is_distinct() {
        let err = DwcaError::Cancelled("shutdown".to_string());
        assert!(err.is_cancelled());
        assert!(!DwcaError::Export("boom".to_string()).is_cancelled());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: DwcaError = io_err.into();
        assert!(matches!(err, DwcaError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: DwcaError = json_err.into();
        assert!(matches!(err, DwcaError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: DwcaError = toml_err.into();
        assert!(matches!(err, DwcaError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_dwca_error_implements_std_error() {
        let err = DwcaError::Validation("Test error".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
