//! Contact store error types
//!
//! Error taxonomy shared by the collaborator traits and the adapter core.
//! Every variant carries a machine-readable code; the store additionally
//! keeps a last-error snapshot built from these codes.

use thiserror::Error;

/// Error that can occur during contact store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No configured host could be reached and bound. Fatal for the session.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Bind against one specific host failed. Recovered internally by moving
    /// on to the next configured host; only surfaced when it was the last one.
    #[error("bind failed on {host}: {message}")]
    BindFailed { host: String, message: String },

    /// Malformed or unsupported search request. Raised before any directory
    /// call is made.
    #[error("search error: {message}")]
    Search { message: String },

    /// Required logical fields are missing or empty. Raised before any
    /// mutation is attempted.
    #[error("validation failed: missing required field(s) {}", fields.join(", "))]
    Validation { fields: Vec<String> },

    /// A directory mutation call failed. Prior steps of the same plan are
    /// left applied; nothing is rolled back.
    #[error("save failed during {step}: {message}")]
    Save {
        step: &'static str,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Store configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Malformed data from a collaborator or caller (bad identifier, bad URL).
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// Entry not found in the directory.
    #[error("entry not found: {identifier}")]
    NotFound { identifier: String },
}

impl StoreError {
    /// Get a machine-readable code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            StoreError::BindFailed { .. } => "BIND_FAILED",
            StoreError::Search { .. } => "SEARCH_ERROR",
            StoreError::Validation { .. } => "VALIDATION_ERROR",
            StoreError::Save { .. } => "SAVE_ERROR",
            StoreError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            StoreError::InvalidData { .. } => "INVALID_DATA",
            StoreError::NotFound { .. } => "NOT_FOUND",
        }
    }

    /// Check if this error may resolve itself on a fresh session.
    ///
    /// The core never retries automatically; this only classifies for callers.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionFailed { .. } | StoreError::BindFailed { .. }
        )
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        StoreError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a bind failed error for a specific host.
    pub fn bind_failed(host: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::BindFailed {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a search error.
    pub fn search(message: impl Into<String>) -> Self {
        StoreError::Search {
            message: message.into(),
        }
    }

    /// Create a validation error from the offending field names.
    pub fn validation(fields: Vec<String>) -> Self {
        StoreError::Validation { fields }
    }

    /// Create a save error naming the failed plan step.
    pub fn save(step: &'static str, message: impl Into<String>) -> Self {
        StoreError::Save {
            step,
            message: message.into(),
            source: None,
        }
    }

    /// Create a save error with source.
    pub fn save_with_source(
        step: &'static str,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::Save {
            step,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        StoreError::InvalidData {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(identifier: impl Into<String>) -> Self {
        StoreError::NotFound {
            identifier: identifier.into(),
        }
    }
}

/// Result type for contact store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Snapshot of the most recent surfaced error, kept by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    /// Machine-readable kind, one of the `error_code` values.
    pub code: &'static str,
    /// Human-readable detail.
    pub message: String,
}

impl From<&StoreError> for LastError {
    fn from(err: &StoreError) -> Self {
        LastError {
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}
