//! Error types for the harness
//!
//! Errors raised while loading a suite abort the whole run. Errors raised
//! while a case runs only affect that case: assertion failures mark it as
//! failed, everything else marks it as errored.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === Suite Loading Errors ===
    #[error("Failed to parse test case '{path}': {error}")]
    TestCaseParse { path: String, error: String },

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Step Dispatch Errors ===
    #[error("No {family} handler registered for type '{key}'")]
    UnknownHandler { family: String, key: String },

    #[error("Unknown step kind '{0}'. Supported kinds: 'action', 'expect', 'expect_not'")]
    UnknownStepKind(String),

    #[error("Handler '{key}' failed: {message}")]
    HandlerFailed { key: String, message: String },

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Plugin Errors ===
    #[error("Plugin lifecycle error: {0}")]
    Plugin(String),

    // === Backend Errors ===
    #[error("Live backend setup failed: {0}")]
    LiveSetup(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an unknown handler error
    pub fn unknown_handler(family: &str, key: &str) -> Self {
        Self::UnknownHandler {
            family: family.to_string(),
            key: key.to_string(),
        }
    }

    /// Create a handler failed error
    pub fn handler_failed(key: &str, message: impl Into<String>) -> Self {
        Self::HandlerFailed {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Create a file read error for `path`
    pub fn file_read(path: &std::path::Path, error: impl ToString) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Whether this error is an assertion failure rather than a harness error
    pub fn is_assertion(&self) -> bool {
        matches!(self, Error::TestAssertion(_))
    }
}
