//! Error type for the emulator core

use std::path::PathBuf;

/// Result alias for emulator core operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the emulator core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A command payload was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A command payload was well-formed JSON but not a command object
    #[error("Invalid payload: {0}")]
    InvalidPayload(&'static str),

    /// The payload's `Type` names no known command
    #[error("Unknown command type {0:?}")]
    UnknownCommandType(String),

    /// APDU or hex decoding failed
    #[error(transparent)]
    Apdu(#[from] nfcemu_apdu::Error),

    /// Scenario definition rejected
    #[error("Invalid scenario {name:?}: {reason}")]
    InvalidScenario {
        /// Scenario name as given
        name: String,
        /// What was wrong with it
        reason: String,
    },

    /// No scenario with this name is stored
    #[error("Unknown scenario {0:?}")]
    UnknownScenario(String),

    /// Filter pattern rejected
    #[error("Invalid filter pattern {0:?}: expected hex digits and '*'")]
    InvalidFilter(String),

    /// Log path rejected
    #[error("Invalid log path {path:?}: {reason}")]
    InvalidLogPath {
        /// Path as given
        path: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Writing the log failed
    #[error("Log I/O error at {path}: {source}")]
    LogIo {
        /// File or directory involved
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

impl Error {
    /// Create a new scenario validation error
    pub fn invalid_scenario<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Self::InvalidScenario {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error with the path it happened on
    pub fn log_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LogIo {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;
    use std::io;

    use super::*;

    #[test]
    fn test_log_io_names_path_and_keeps_source() {
        let err = Error::log_io("/tmp/logs/pay.log", io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(err.to_string(), "Log I/O error at /tmp/logs/pay.log: denied");
        assert!(err.source().is_some());
    }
}
