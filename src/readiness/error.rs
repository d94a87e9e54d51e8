//! Error types for readiness polling.

use std::time::Duration;

use thiserror::Error;

use crate::cancel::CancelReason;
use crate::process::ProcessError;

/// Errors raised while listing workloads.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum QueryError {
    /// Raised when the listing command could not be run.
    #[error(transparent)]
    Process(#[from] ProcessError),
    /// Raised when the listing command exits unsuccessfully.
    #[error("{program} exited with status {status}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Exit status rendered for display.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Raised when the listing output cannot be parsed.
    #[error("failed to parse workload listing: {0}")]
    Parse(String),
}

/// Errors raised by [`super::ReadinessPoller::wait_ready`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ReadinessError {
    /// No matching pod became ready before the timeout.
    #[error("timed out after {}s waiting for {target} ({attempts} attempts)", .waited.as_secs())]
    Timeout {
        /// Rendered workload reference.
        target: String,
        /// Time spent waiting.
        waited: Duration,
        /// Number of checks made.
        attempts: u32,
    },
    /// The caller's cancellation fired.
    #[error("stopped waiting for {target}: {reason}")]
    Cancelled {
        /// Rendered workload reference.
        target: String,
        /// Why waiting stopped.
        reason: CancelReason,
    },
    /// Listing the workload failed.
    #[error("failed to query {target}: {source}")]
    Query {
        /// Rendered workload reference.
        target: String,
        /// Underlying failure.
        #[source]
        source: QueryError,
    },
}
