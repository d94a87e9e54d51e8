//! Remote command execution inside running containers.
//!
//! A [`RemoteExecutor`] opens one execution channel per call and classifies
//! the outcome. The classification is the contract callers branch on:
//!
//! - [`ExecError::RemoteCommandFailed`]: the channel worked, the command ran
//!   and exited non-zero. Probes rely on this to mean "absent".
//! - [`ExecError::Transport`]: anything else. Never reinterpreted as a
//!   statement about the command's logic.

use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncWriteExt;

use crate::cancel::Cancellation;
use crate::console::ConsoleFile;
use crate::workload::ExecRequest;

mod error;
mod stderr;

pub use error::ExecError;
pub use stderr::StderrStream;

/// Output of a successful remote command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecOutput {
    /// Fully buffered standard output.
    pub stdout: Vec<u8>,
    /// Standard error, readable on demand.
    pub stderr: StderrStream,
}

impl ExecOutput {
    /// Standard output decoded lossily as UTF-8.
    #[must_use]
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Future returned by executor operations.
pub type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<ExecOutput, ExecError>> + Send + 'a>>;

/// Runs commands inside containers.
pub trait RemoteExecutor: Send + Sync {
    /// Runs `request` in a fresh execution channel.
    fn run<'a>(&'a self, request: &'a ExecRequest, cancel: &'a Cancellation) -> ExecFuture<'a>;

    /// Runs `request` and copies its standard output into `console` as it
    /// arrives. The returned output still carries the full stdout.
    ///
    /// The default implementation forwards stdout once the command has
    /// finished.
    fn run_attached<'a>(
        &'a self,
        request: &'a ExecRequest,
        console: &'a mut ConsoleFile,
        cancel: &'a Cancellation,
    ) -> ExecFuture<'a> {
        Box::pin(async move {
            let output = self.run(request, cancel).await?;
            if let Err(err) = console.write_all(&output.stdout).await {
                tracing::debug!(error = %err, console = console.name(), "console rejected output");
            }
            Ok(output)
        })
    }
}
