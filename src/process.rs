//! Local process execution behind a runner trait, so cluster adapters can be
//! exercised with scripted fakes.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use crate::cancel::{CancelReason, Cancellation};

const CHUNK_SIZE: usize = 8 * 1024;

/// A program together with its arguments and optional stdin payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Invocation {
    /// Program to execute, resolved through `PATH`.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Bytes written to the program's stdin before it is closed.
    pub stdin: Option<Vec<u8>>,
}

impl Invocation {
    /// Creates an invocation without stdin.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
            stdin: None,
        }
    }

    /// Attaches a stdin payload.
    #[must_use]
    pub fn with_stdin(mut self, stdin: Vec<u8>) -> Self {
        self.stdin = Some(stdin);
        self
    }

    /// Renders the invocation for logs and error messages.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }
}

/// Result of running an external command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Standard error decoded lossily and trimmed.
    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_owned()
    }

    /// Exit status rendered for messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Errors raised before a command produced an exit status.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProcessError {
    /// Raised when the program could not be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error message.
        message: String,
    },
    /// Raised when reading or writing the program's pipes failed.
    #[error("i/o failure while running {program}: {message}")]
    Io {
        /// Program being run.
        program: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the caller's cancellation fired first.
    #[error("{program} was stopped: {reason}")]
    Cancelled {
        /// Program that was stopped.
        program: String,
        /// Why it was stopped.
        reason: CancelReason,
    },
}

/// Optional writer receiving stdout chunks as they arrive.
pub type Tee<'w> = Option<&'w mut (dyn AsyncWrite + Send + Unpin)>;

/// Future returned by [`CommandRunner::run`].
pub type CommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, ProcessError>> + Send + 'a>>;

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Runs `invocation`, capturing stdout and stderr and copying stdout into
    /// `tee` when one is supplied.
    ///
    /// A non-zero exit status is not an error at this level; callers inspect
    /// [`CommandOutput::code`].
    ///
    /// The tee may outlive the invocation.
    fn run<'a, 'w: 'a>(
        &'a self,
        invocation: &'a Invocation,
        tee: Tee<'w>,
        cancel: &'a Cancellation,
    ) -> CommandFuture<'a>;
}

/// Real command runner that spawns host processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run<'a, 'w: 'a>(
        &'a self,
        invocation: &'a Invocation,
        tee: Tee<'w>,
        cancel: &'a Cancellation,
    ) -> CommandFuture<'a> {
        Box::pin(run_process(invocation, tee, cancel))
    }
}

async fn run_process(
    invocation: &Invocation,
    tee: Tee<'_>,
    cancel: &Cancellation,
) -> Result<CommandOutput, ProcessError> {
    let program = invocation.program.as_str();
    if let Some(reason) = cancel.fired() {
        return Err(cancelled(program, reason));
    }

    debug!(command = %invocation.command_string(), "spawning");
    let mut child = Command::new(program)
        .args(&invocation.args)
        .stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| ProcessError::Spawn {
            program: program.to_owned(),
            message: err.to_string(),
        })?;

    let stdin_pipe = child.stdin.take();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let feed = async {
        if let (Some(mut pipe), Some(payload)) = (stdin_pipe, invocation.stdin.as_deref()) {
            pipe.write_all(payload).await?;
            pipe.shutdown().await?;
        }
        Ok::<(), io::Error>(())
    };
    let collect_stdout = async {
        let mut captured = Vec::new();
        if let Some(mut pipe) = stdout_pipe {
            copy_with_tee(&mut pipe, tee, &mut captured).await?;
        }
        Ok::<_, io::Error>(captured)
    };
    let collect_stderr = async {
        let mut captured = Vec::new();
        if let Some(mut pipe) = stderr_pipe {
            pipe.read_to_end(&mut captured).await?;
        }
        Ok::<_, io::Error>(captured)
    };

    let work = async {
        let (fed, stdout, stderr) = tokio::join!(feed, collect_stdout, collect_stderr);
        let status = child.wait().await?;
        if let Err(err) = fed {
            // The program may exit without reading its stdin.
            if err.kind() != io::ErrorKind::BrokenPipe {
                return Err(err);
            }
        }
        Ok(CommandOutput {
            code: status.code(),
            stdout: stdout?,
            stderr: stderr?,
        })
    };

    tokio::select! {
        biased;
        reason = cancel.cancelled() => Err(cancelled(program, reason)),
        result = work => result.map_err(|err| ProcessError::Io {
            program: program.to_owned(),
            message: err.to_string(),
        }),
    }
}

fn cancelled(program: &str, reason: CancelReason) -> ProcessError {
    ProcessError::Cancelled {
        program: program.to_owned(),
        reason,
    }
}

async fn copy_with_tee<R>(reader: &mut R, mut tee: Tee<'_>, captured: &mut Vec<u8>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0_u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        let bytes = chunk.get(..read).unwrap_or_default();
        captured.extend_from_slice(bytes);
        if let Some(writer) = tee.as_mut()
            && let Err(err) = writer.write_all(bytes).await
        {
            debug!(error = %err, "stdout tee closed; capturing only");
            tee = None;
        }
    }
    if let Some(writer) = tee.as_mut() {
        writer.flush().await.ok();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation;
    use rstest::rstest;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh", vec![OsString::from("-c"), OsString::from(script)])
    }

    #[tokio::test]
    async fn captures_streams_and_exit_code() {
        let output = ProcessCommandRunner
            .run(&sh("echo out; echo err >&2; exit 3"), None, &Cancellation::never())
            .await
            .expect("sh should run");

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr_text(), "err");
        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn feeds_stdin_and_tees_stdout() {
        let invocation = Invocation::new("cat", Vec::new()).with_stdin(b"payload".to_vec());
        let mut teed: Vec<u8> = Vec::new();

        let output = ProcessCommandRunner
            .run(&invocation, Some(&mut teed), &Cancellation::never())
            .await
            .expect("cat should run");

        assert!(output.is_success());
        assert_eq!(output.stdout, b"payload");
        assert_eq!(teed, b"payload");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let invocation = Invocation::new("fabnctl-definitely-missing", Vec::new());
        let err = ProcessCommandRunner
            .run(&invocation, None, &Cancellation::never())
            .await
            .expect_err("spawn should fail");

        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_the_process() {
        let (handle, cancel) = cancellation();
        handle.cancel();

        let err = ProcessCommandRunner
            .run(&sh("sleep 30"), None, &cancel)
            .await
            .expect_err("cancelled");

        assert_eq!(
            err,
            ProcessError::Cancelled {
                program: String::from("sh"),
                reason: CancelReason::Cancelled,
            }
        );
    }

    async fn run_script(script: &str, tee: Tee<'_>) -> Result<CommandOutput, ProcessError> {
        let invocation = sh(script);
        ProcessCommandRunner
            .run(&invocation, tee, &Cancellation::never())
            .await
    }

    #[tokio::test]
    async fn tee_outlives_locally_built_invocations() {
        let mut teed: Vec<u8> = Vec::new();
        for script in ["echo one", "echo two"] {
            let output = run_script(script, Some(&mut teed)).await.expect("sh should run");
            assert!(output.is_success());
        }

        assert_eq!(teed, b"one\ntwo\n");
    }

    #[rstest]
    #[case("head -c 200000 /dev/zero >&2; head -c 200000 /dev/zero")]
    #[case("head -c 200000 /dev/zero; head -c 200000 /dev/zero >&2")]
    #[tokio::test]
    async fn large_output_on_both_streams_does_not_stall(#[case] script: &str) {
        let output = tokio::time::timeout(
            std::time::Duration::from_secs(20),
            ProcessCommandRunner.run(&sh(script), None, &Cancellation::never()),
        )
        .await
        .expect("both pipes are drained concurrently")
        .expect("sh should run");

        assert!(output.is_success());
        assert_eq!(output.stdout.len(), 200_000);
        assert_eq!(output.stderr.len(), 200_000);
    }

    #[test]
    fn command_string_joins_arguments() {
        assert_eq!(sh("exit 0").command_string(), "sh -c exit 0");
    }
}
