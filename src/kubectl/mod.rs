//! Cluster access through the `kubectl` CLI.
//!
//! [`KubectlClient`] implements the three cluster-facing seams:
//! [`WorkloadQuery`] via `kubectl get pods`, [`RemoteExecutor`] via
//! `kubectl exec` and [`SecretStore`] via `kubectl apply`.
//!
//! `kubectl exec` reports a remote non-zero exit by exiting with the same
//! status and printing `command terminated with exit code N` on stderr. That
//! marker is what distinguishes a command failure from a broken channel.

use std::ffi::OsString;

use tracing::debug;

use crate::cancel::Cancellation;
use crate::console::ConsoleFile;
use crate::exec::{ExecError, ExecFuture, ExecOutput, RemoteExecutor, StderrStream};
use crate::process::{CommandOutput, CommandRunner, Invocation, Tee};
use crate::readiness::{QueryError, QueryFuture, WorkloadQuery, WorkloadStatus};
use crate::secrets::{SecretError, SecretFuture, SecretSpec, SecretStore};
use crate::workload::{ExecRequest, WorkloadRef, WorkloadSelector};

mod pods;

const EXIT_MARKER: &str = "command terminated with exit code";

/// Client invoking `kubectl` through a [`CommandRunner`].
#[derive(Clone, Debug)]
pub struct KubectlClient<R> {
    runner: R,
    kubectl_bin: String,
    context: Option<String>,
}

impl<R: CommandRunner> KubectlClient<R> {
    /// Creates a client invoking `kubectl_bin` through `runner`.
    #[must_use]
    pub fn new(kubectl_bin: impl Into<String>, runner: R) -> Self {
        Self {
            runner,
            kubectl_bin: kubectl_bin.into(),
            context: None,
        }
    }

    /// Targets a specific kubeconfig context.
    #[must_use]
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    fn invocation(&self, args: impl IntoIterator<Item = OsString>) -> Invocation {
        let mut all = Vec::new();
        if let Some(context) = &self.context {
            all.push(OsString::from("--context"));
            all.push(OsString::from(context));
        }
        all.extend(args);
        Invocation::new(&self.kubectl_bin, all)
    }

    async fn list_statuses(
        &self,
        target: &WorkloadRef,
        cancel: &Cancellation,
    ) -> Result<Vec<WorkloadStatus>, QueryError> {
        let selector = match target.selector() {
            WorkloadSelector::Name(name) => {
                vec![OsString::from("--field-selector"), format!("metadata.name={name}").into()]
            }
            WorkloadSelector::Labels(labels) => vec![OsString::from("-l"), labels.into()],
        };
        let invocation = self.invocation(
            ["get", "pods", "-n", target.namespace()]
                .into_iter()
                .map(OsString::from)
                .chain(selector)
                .chain(["-o", "json"].into_iter().map(OsString::from)),
        );
        let output = self.runner.run(&invocation, None, cancel).await?;
        if !output.is_success() {
            return Err(QueryError::CommandFailure {
                program: self.kubectl_bin.clone(),
                status: output.status_text(),
                stderr: output.stderr_text(),
            });
        }
        pods::parse_pod_list(&output.stdout).map_err(|err| QueryError::Parse(err.to_string()))
    }

    async fn resolve_pod(
        &self,
        request: &ExecRequest,
        cancel: &Cancellation,
    ) -> Result<String, ExecError> {
        match request.target.selector() {
            WorkloadSelector::Name(name) => Ok(name.clone()),
            WorkloadSelector::Labels(_) => {
                let statuses = self
                    .list_statuses(&request.target, cancel)
                    .await
                    .map_err(|err| {
                        ExecError::transport(request, err.to_string(), StderrStream::default())
                    })?;
                statuses
                    .into_iter()
                    .find(|status| status.ready)
                    .map(|status| status.name)
                    .ok_or_else(|| {
                        ExecError::transport(request, "no ready pod matches", StderrStream::default())
                    })
            }
        }
    }

    async fn exec(
        &self,
        request: &ExecRequest,
        tee: Tee<'_>,
        cancel: &Cancellation,
    ) -> Result<ExecOutput, ExecError> {
        let pod = self.resolve_pod(request, cancel).await?;
        let mut args: Vec<OsString> = vec!["exec".into()];
        if request.command.stdin().is_some() {
            args.push("-i".into());
        }
        args.extend(["-n", request.target.namespace(), pod.as_str()].map(OsString::from));
        if let Some(container) = request.target.container() {
            args.extend(["-c", container].map(OsString::from));
        }
        args.push("--".into());
        args.extend(request.command.argv().into_iter().map(OsString::from));

        let mut invocation = self.invocation(args);
        if let Some(stdin) = request.command.stdin() {
            invocation = invocation.with_stdin(stdin.to_vec());
        }
        debug!(command = %request.command, %pod, "running remote command");

        let output = self
            .runner
            .run(&invocation, tee, cancel)
            .await
            .map_err(|err| ExecError::transport(request, err.to_string(), StderrStream::default()))?;
        classify(request, output)
    }
}

/// Maps a finished `kubectl exec` onto the executor outcome taxonomy.
fn classify(request: &ExecRequest, output: CommandOutput) -> Result<ExecOutput, ExecError> {
    if output.is_success() {
        return Ok(ExecOutput {
            stdout: output.stdout,
            stderr: StderrStream::new(output.stderr),
        });
    }
    if let Some(exit_code) = remote_exit_code(&output.stderr) {
        return Err(ExecError::remote_failure(
            request,
            exit_code,
            StderrStream::new(output.stderr),
        ));
    }
    let message = format!(
        "kubectl exited with status {}: {}",
        output.status_text(),
        output.stderr_text()
    );
    Err(ExecError::transport(request, message, StderrStream::new(output.stderr)))
}

fn remote_exit_code(stderr: &[u8]) -> Option<i32> {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(EXIT_MARKER)?.trim().parse().ok())
}

impl<R: CommandRunner> WorkloadQuery for KubectlClient<R> {
    fn list<'a>(&'a self, target: &'a WorkloadRef) -> QueryFuture<'a> {
        Box::pin(async move {
            // Readiness polling races this future against its own cancellation.
            self.list_statuses(target, &Cancellation::never()).await
        })
    }
}

impl<R: CommandRunner> RemoteExecutor for KubectlClient<R> {
    fn run<'a>(&'a self, request: &'a ExecRequest, cancel: &'a Cancellation) -> ExecFuture<'a> {
        Box::pin(self.exec(request, None, cancel))
    }

    fn run_attached<'a>(
        &'a self,
        request: &'a ExecRequest,
        console: &'a mut ConsoleFile,
        cancel: &'a Cancellation,
    ) -> ExecFuture<'a> {
        Box::pin(self.exec(request, Some(console), cancel))
    }
}

impl<R: CommandRunner> SecretStore for KubectlClient<R> {
    fn apply<'a>(&'a self, secret: &'a SecretSpec, cancel: &'a Cancellation) -> SecretFuture<'a> {
        Box::pin(async move {
            let manifest = secret.manifest();
            let payload =
                serde_json::to_vec(&manifest).map_err(|err| SecretError::Encode(err.to_string()))?;
            let invocation = self
                .invocation(["apply", "-f", "-"].map(OsString::from))
                .with_stdin(payload);
            let output = self.runner.run(&invocation, None, cancel).await?;
            if !output.is_success() {
                return Err(SecretError::CommandFailure {
                    name: secret.name.clone(),
                    status: output.status_text(),
                    stderr: output.stderr_text(),
                });
            }
            debug!(secret = %secret.name, "secret applied");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests;
