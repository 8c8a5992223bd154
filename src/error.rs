//! Fatal error types for the synthesis orchestrator.
//!
//! Only failures that abort a whole run live here. Iteration-scoped
//! failures (a backend timing out, a method that cannot be resolved in
//! source) are caught by the controller and recorded as notes instead.

use thiserror::Error;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, DarnerError>;

/// Errors that abort a run with a non-zero exit code.
#[derive(Debug, Error)]
pub enum DarnerError {
    /// The solution or project path does not exist or is not readable.
    #[error("Solution path not found: {path}")]
    SolutionNotFound {
        /// Path that was checked.
        path: String,
    },

    /// A required output directory could not be created.
    #[error("Cannot create output directory {path}: {message}")]
    OutputDirectory {
        /// Directory that could not be created.
        path: String,
        /// Underlying failure text.
        message: String,
    },

    /// The external build/test toolchain could not be started at all.
    #[error("Cannot start external toolchain: {message}")]
    ToolchainUnavailable {
        /// Underlying failure text.
        message: String,
    },

    /// A configuration file is missing or malformed.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// A persisted report could not be written or re-read.
    #[error("Report error: {message}")]
    Report {
        /// Error message.
        message: String,
    },

    /// I/O error outside any more specific category.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DarnerError {
    /// Create a solution-not-found error.
    #[must_use]
    pub fn solution_not_found(path: impl Into<String>) -> Self {
        Self::SolutionNotFound { path: path.into() }
    }

    /// Create an output-directory error.
    #[must_use]
    pub fn output_directory(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OutputDirectory {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a toolchain-unavailable error.
    #[must_use]
    pub fn toolchain(message: impl Into<String>) -> Self {
        Self::ToolchainUnavailable {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a report error.
    #[must_use]
    pub fn report(message: impl Into<String>) -> Self {
        Self::Report {
            message: message.into(),
        }
    }
}
