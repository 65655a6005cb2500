//! Error types for the terminator.

use std::path::PathBuf;

use thiserror::Error;

use crate::controller::ControllerError;
use crate::mode::TerminationMode;

/// Errors that can abort a termination attempt.
#[derive(Debug, Error)]
pub enum TerminatorError {
    /// Settings rejected before anything touched the filesystem
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Namespace or name would escape the signal root
    #[error("Invalid {field} {value:?}: must be a single non-empty path component")]
    InvalidTarget { field: &'static str, value: String },

    /// Coordination directory could not be created (not the "already exists" case)
    #[error("Failed to create coordination directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Signal file was already present; another terminator got there first
    #[error("Signal file {path} already exists")]
    SignalExists { path: PathBuf },

    /// Signal file could not be created
    #[error("Failed to write signal file {path}: {source}")]
    WriteSignal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The requested mode has no signal file
    #[error("Termination mode {0} does not write a signal file")]
    NoSignalForMode(TerminationMode),

    /// Walking the activities directory failed
    #[error("Failed to scan activities under {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// Control-plane call failed
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

impl TerminatorError {
    /// Whether this error is the expected outcome of racing another terminator.
    #[must_use]
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::SignalExists { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_classification() {
        let exists = TerminatorError::SignalExists {
            path: PathBuf::from("/termination/ns/run/stop"),
        };
        assert!(exists.is_contention());

        let io = TerminatorError::WriteSignal {
            path: PathBuf::from("/termination/ns/run/stop"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(!io.is_contention());
    }

    #[test]
    fn test_invalid_target_message() {
        let err = TerminatorError::InvalidTarget {
            field: "name",
            value: "../etc".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid name \"../etc\": must be a single non-empty path component"
        );
    }
}
