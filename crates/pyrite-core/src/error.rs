//! Unified error type bridging subsystem errors into the CLI's exit-code
//! table (spec §6 "Command line" exit codes; spec §7 "Error handling
//! design").

use std::fmt;

use thiserror::Error;

/// Process exit codes, per spec §6:
/// `0` no errors, `1` errors found, `2` usage error, `3` I/O / configuration
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    NoErrors = 0,
    ErrorsFound = 1,
    UsageError = 2,
    IoOrConfigError = 3,
}

impl ExitCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Unified error type for the CLI and MCP front doors.
///
/// Each variant maps to one of the three error kinds in spec §7
/// (lexical/syntactic and semantic errors never reach this type — they stay
/// diagnostics; this type is for the infrastructure kind plus CLI usage
/// errors that never get to run analysis at all).
#[derive(Debug, Error)]
pub enum PyriteError {
    #[error("usage error: {message}")]
    UsageError { message: String },

    #[error("configuration error in {path}: {message}")]
    ConfigError { path: String, message: String },

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {message}")]
    InternalError { message: String },
}

impl PyriteError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            PyriteError::UsageError { .. } => ExitCode::UsageError,
            PyriteError::ConfigError { .. } | PyriteError::FileRead { .. } => {
                ExitCode::IoOrConfigError
            }
            PyriteError::InternalError { .. } => ExitCode::IoOrConfigError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_maps_to_io_config_exit_code() {
        let err = PyriteError::ConfigError {
            path: "pyrightconfig.json".into(),
            message: "malformed JSON".into(),
        };
        assert_eq!(err.exit_code(), ExitCode::IoOrConfigError);
    }

    #[test]
    fn usage_error_maps_to_usage_exit_code() {
        let err = PyriteError::UsageError {
            message: "unknown flag".into(),
        };
        assert_eq!(err.exit_code(), ExitCode::UsageError);
    }
}
