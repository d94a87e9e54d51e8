//! Error types for remote execution.

use thiserror::Error;

use super::StderrStream;
use crate::workload::ExecRequest;

/// Errors raised while running a command inside a container.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ExecError {
    /// The command ran and exited with a non-zero status.
    #[error("`{command}` exited with status {exit_code} on {target}")]
    RemoteCommandFailed {
        /// Rendered workload reference.
        target: String,
        /// Rendered command.
        command: String,
        /// Exit status reported by the container runtime.
        exit_code: i32,
        /// Standard error captured from the command.
        stderr: StderrStream,
    },
    /// The execution channel could not be established or broke down.
    #[error("could not run `{command}` on {target}: {message}")]
    Transport {
        /// Rendered workload reference.
        target: String,
        /// Rendered command.
        command: String,
        /// What went wrong.
        message: String,
        /// Whatever standard error was captured before the failure.
        stderr: StderrStream,
    },
}

impl ExecError {
    /// Builds a [`ExecError::RemoteCommandFailed`] for `request`.
    #[must_use]
    pub fn remote_failure(request: &ExecRequest, exit_code: i32, stderr: StderrStream) -> Self {
        Self::RemoteCommandFailed {
            target: request.target.to_string(),
            command: request.command.to_string(),
            exit_code,
            stderr,
        }
    }

    /// Builds a [`ExecError::Transport`] for `request`.
    #[must_use]
    pub fn transport(
        request: &ExecRequest,
        message: impl Into<String>,
        stderr: StderrStream,
    ) -> Self {
        Self::Transport {
            target: request.target.to_string(),
            command: request.command.to_string(),
            message: message.into(),
            stderr,
        }
    }

    /// Whether the command itself ran and reported failure.
    #[must_use]
    pub const fn is_remote_failure(&self) -> bool {
        matches!(self, Self::RemoteCommandFailed { .. })
    }

    /// Whether the execution channel failed.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Remote exit status, when the command ran.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::RemoteCommandFailed { exit_code, .. } => Some(*exit_code),
            Self::Transport { .. } => None,
        }
    }

    /// Captured standard error.
    #[must_use]
    pub const fn stderr(&self) -> &StderrStream {
        match self {
            Self::RemoteCommandFailed { stderr, .. } | Self::Transport { stderr, .. } => stderr,
        }
    }
}
