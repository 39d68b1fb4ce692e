//! Error types module
//!
//! All expected outcomes of the resolution, deploy and delete operations are
//! unified under `DepotError`. Upstream (remote) failures are deliberately not
//! part of this enum: they are recorded by the proxy client and only ever
//! escalate to `NotFound` once every remote has been tried.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like missing artifacts
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "NOT_FOUND")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from clients
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum DepotError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Write disabled: {0}")]
    WriteDisabled(String),

    #[error("Storage failure: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("Insufficient storage space: {available} bytes available, {required} bytes required")]
    InsufficientSpace { available: u64, required: u64 },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type DepotResult<T> = Result<T, DepotError>;

impl DepotError {
    pub fn io(message: impl Into<String>) -> Self {
        DepotError::Io {
            message: message.into(),
            source: None,
        }
    }

    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &'static str {
        match self {
            DepotError::InvalidPath(_) => "InvalidPath",
            DepotError::AccessDenied(_) => "AccessDenied",
            DepotError::NotFound(_) => "NotFound",
            DepotError::Validation(_) => "Validation",
            DepotError::WriteDisabled(_) => "Validation",
            DepotError::Io { .. } => "IoFailure",
            DepotError::InsufficientSpace { .. } => "InsufficientSpace",
            DepotError::Configuration(_) => "Configuration",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl From<io::Error> for DepotError {
    fn from(err: io::Error) -> Self {
        DepotError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for DepotError {
    fn from(err: serde_json::Error) -> Self {
        DepotError::Configuration(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, sensitive, log_level).
fn depot_error_static_metadata(err: &DepotError) -> (u16, &'static str, bool, bool, LogLevel) {
    match err {
        DepotError::InvalidPath(_) => (400, "INVALID_PATH", false, false, LogLevel::Debug),
        DepotError::AccessDenied(_) => (401, "ACCESS_DENIED", false, false, LogLevel::Debug),
        DepotError::NotFound(_) => (404, "NOT_FOUND", false, false, LogLevel::Debug),
        DepotError::Validation(_) => (400, "VALIDATION_FAILED", false, false, LogLevel::Debug),
        DepotError::WriteDisabled(_) => (405, "WRITE_DISABLED", false, false, LogLevel::Debug),
        DepotError::Io { .. } => (500, "STORAGE_ERROR", true, true, LogLevel::Error),
        DepotError::InsufficientSpace { .. } => {
            (507, "INSUFFICIENT_STORAGE", true, false, LogLevel::Warn)
        }
        DepotError::Configuration(_) => (500, "CONFIGURATION_ERROR", false, true, LogLevel::Error),
    }
}

impl ErrorMetadata for DepotError {
    fn http_status_code(&self) -> u16 {
        depot_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        depot_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        depot_error_static_metadata(self).2
    }

    fn is_sensitive(&self) -> bool {
        depot_error_static_metadata(self).3
    }

    fn log_level(&self) -> LogLevel {
        depot_error_static_metadata(self).4
    }

    fn client_message(&self) -> String {
        match self {
            // Existence of private content is never revealed beyond the denial itself.
            DepotError::AccessDenied(_) => "Unauthorized access".to_string(),
            DepotError::InvalidPath(ref msg)
            | DepotError::NotFound(ref msg)
            | DepotError::Validation(ref msg)
            | DepotError::WriteDisabled(ref msg) => msg.clone(),
            DepotError::Io { .. } => "Failed to access storage".to_string(),
            DepotError::InsufficientSpace { .. } => self.to_string(),
            DepotError::Configuration(_) => "Internal server error".to_string(),
        }
    }
}
