//! Shell execution errors.

use thiserror::Error;

use crate::error::{AppError, ErrorKind};

/// Failure of a shell invocation.
#[derive(Debug, Clone, Error)]
pub enum ShellError {
    /// The shell itself could not be started.
    #[error("failed to spawn `{command}`: {reason}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying OS error.
        reason: String,
    },

    /// The command exited with a non-zero status.
    #[error("`{command}` exited with code {code}: {stderr}")]
    NonZeroExit {
        /// Rendered command line.
        command: String,
        /// Exit code, `-1` when killed by a signal.
        code: i32,
        /// Captured standard error.
        stderr: String,
        /// Captured standard output.
        stdout: String,
    },

    /// The command ran longer than its timeout.
    #[error("`{command}` timed out after {timeout_seconds}s")]
    Timeout {
        /// Rendered command line.
        command: String,
        /// The timeout that was exceeded.
        timeout_seconds: u64,
    },
}

impl ShellError {
    /// The rendered command line that failed.
    pub fn command(&self) -> &str {
        match self {
            Self::Spawn { command, .. }
            | Self::NonZeroExit { command, .. }
            | Self::Timeout { command, .. } => command,
        }
    }
}

impl From<ShellError> for AppError {
    fn from(err: ShellError) -> Self {
        AppError::with_source(ErrorKind::ExternalService, err.to_string(), err)
    }
}
