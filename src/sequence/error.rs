//! Error types for step sequencing.

use thiserror::Error;

use crate::exec::{ExecError, StderrStream};
use crate::readiness::ReadinessError;

/// Coarse classification of a [`SequenceError`], for exit codes and
/// rendering.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// A workload did not become ready in time.
    ReadinessTimeout,
    /// The operation was cancelled or hit its deadline.
    Cancelled,
    /// Listing workloads failed.
    QueryFailed,
    /// The execution channel failed, whichever step was running.
    TransportFailure,
    /// A remote command ran and failed after the preceding work succeeded.
    SequenceAborted,
}

/// Errors raised by [`super::StepSequencer::run`].
#[derive(Debug, Error)]
pub enum SequenceError {
    /// Waiting for a workload failed.
    #[error(transparent)]
    Readiness(#[from] ReadinessError),
    /// The probe could not reach its target.
    #[error("{step} could not reach {target}: {source}")]
    Transport {
        /// Step that failed.
        step: String,
        /// Rendered workload reference.
        target: String,
        /// Underlying failure.
        #[source]
        source: ExecError,
    },
    /// A step failed.
    #[error("{step} failed on {target}: {source}{}", stderr_hint(.source.stderr()))]
    Aborted {
        /// Step that failed.
        step: String,
        /// Rendered workload reference.
        target: String,
        /// Underlying failure.
        #[source]
        source: ExecError,
    },
}

fn stderr_hint(stderr: &StderrStream) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(" ({} bytes of stderr captured)", stderr.len())
    }
}

impl SequenceError {
    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Readiness(ReadinessError::Timeout { .. }) => ErrorKind::ReadinessTimeout,
            Self::Readiness(ReadinessError::Cancelled { .. }) => ErrorKind::Cancelled,
            Self::Readiness(ReadinessError::Query { .. }) => ErrorKind::QueryFailed,
            Self::Transport { .. } => ErrorKind::TransportFailure,
            Self::Aborted { source, .. } if source.is_transport() => ErrorKind::TransportFailure,
            Self::Aborted { .. } => ErrorKind::SequenceAborted,
        }
    }

    /// Remote execution failure behind this error, if any.
    #[must_use]
    pub const fn exec_error(&self) -> Option<&ExecError> {
        match self {
            Self::Transport { source, .. } | Self::Aborted { source, .. } => Some(source),
            Self::Readiness(_) => None,
        }
    }

    /// Captured stderr of the failing remote command, when there is some.
    #[must_use]
    pub fn stderr(&self) -> Option<&StderrStream> {
        self.exec_error()
            .map(ExecError::stderr)
            .filter(|stderr| !stderr.is_empty())
    }
}
