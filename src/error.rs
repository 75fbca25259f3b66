//! Error types for autostub

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for autostub operations
pub type Result<T> = std::result::Result<T, AutostubError>;

/// Errors that can occur while recording or replaying API traffic
#[derive(Debug, Error)]
pub enum AutostubError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Fixture file exists but cannot be parsed
    #[error("Malformed fixture {}: {reason}", path.display())]
    MalformedFixture {
        /// Fixture path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Replay was selected but the fixture has no entry for the test case
    #[error("No recording for test case {title:?} in {}", path.display())]
    MissingRecording {
        /// Fixture path
        path: PathBuf,
        /// Full test-case title
        title: String,
    },

    /// A configured stub pattern is not a valid regular expression
    #[error("Invalid stub pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// Pattern as configured
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// API requests were still in flight when the wait expired
    #[error("Timed out after {waited_ms} ms waiting for API requests: {in_flight} still in flight")]
    QuiescenceTimeout {
        /// How long the wait lasted
        waited_ms: u64,
        /// Last observed in-flight count
        in_flight: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Spec path cannot be turned into a fixture name
    #[error("Invalid spec path: {0}")]
    InvalidSpecPath(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
