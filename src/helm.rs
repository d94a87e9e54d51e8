//! Helm chart installation behind the [`ChartInstaller`] trait.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::cancel::Cancellation;
use crate::process::{CommandRunner, Invocation, ProcessError};

/// A chart release to install or upgrade.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChartSpec {
    /// Release name.
    pub release: String,
    /// Local chart directory.
    pub chart: Utf8PathBuf,
    /// Namespace to install into.
    pub namespace: String,
    /// Extra values files, applied in order.
    pub values_files: Vec<Utf8PathBuf>,
    /// `--set` overrides, applied in order.
    pub set_values: Vec<(String, String)>,
    /// Whether to wait for the release's resources to become ready.
    pub wait: bool,
    /// Upper bound on the install, passed to Helm.
    pub timeout: Duration,
}

/// Errors raised while installing a chart.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ChartError {
    /// Raised when Helm could not be run or was stopped.
    #[error(transparent)]
    Process(#[from] ProcessError),
    /// Raised when Helm exits unsuccessfully.
    #[error("helm release {release} failed with status {status}: {stderr}")]
    CommandFailure {
        /// Release name.
        release: String,
        /// Exit status rendered for display.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// Future returned by [`ChartInstaller::install_or_upgrade`].
pub type ChartFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ChartError>> + Send + 'a>>;

/// Installs chart releases.
pub trait ChartInstaller: Send + Sync {
    /// Installs `chart`, or upgrades the release when it already exists.
    fn install_or_upgrade<'a>(
        &'a self,
        chart: &'a ChartSpec,
        cancel: &'a Cancellation,
    ) -> ChartFuture<'a>;
}

/// [`ChartInstaller`] driving the `helm` CLI.
#[derive(Clone, Debug)]
pub struct HelmClient<R> {
    runner: R,
    helm_bin: String,
    kube_context: Option<String>,
}

impl<R: CommandRunner> HelmClient<R> {
    /// Creates a client invoking `helm_bin` through `runner`.
    #[must_use]
    pub fn new(helm_bin: impl Into<String>, runner: R) -> Self {
        Self {
            runner,
            helm_bin: helm_bin.into(),
            kube_context: None,
        }
    }

    /// Targets a specific kubeconfig context.
    #[must_use]
    pub fn with_context(mut self, kube_context: Option<String>) -> Self {
        self.kube_context = kube_context;
        self
    }

    fn install_args(&self, chart: &ChartSpec) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "upgrade".into(),
            "--install".into(),
            chart.release.as_str().into(),
            chart.chart.as_str().into(),
            "--namespace".into(),
            chart.namespace.as_str().into(),
        ];
        if let Some(context) = &self.kube_context {
            args.push("--kube-context".into());
            args.push(context.into());
        }
        if chart.wait {
            args.push("--wait".into());
        }
        args.push("--timeout".into());
        args.push(format!("{}s", chart.timeout.as_secs()).into());
        for file in &chart.values_files {
            args.push("-f".into());
            args.push(file.as_str().into());
        }
        for (key, value) in &chart.set_values {
            args.push("--set".into());
            args.push(format!("{key}={value}").into());
        }
        args
    }
}

impl<R: CommandRunner> ChartInstaller for HelmClient<R> {
    fn install_or_upgrade<'a>(
        &'a self,
        chart: &'a ChartSpec,
        cancel: &'a Cancellation,
    ) -> ChartFuture<'a> {
        Box::pin(async move {
            let invocation = Invocation::new(&self.helm_bin, self.install_args(chart));
            debug!(command = %invocation.command_string(), "installing chart");
            let output = self.runner.run(&invocation, None, cancel).await?;
            if !output.is_success() {
                return Err(ChartError::CommandFailure {
                    release: chart.release.clone(),
                    status: output.status_text(),
                    stderr: output.stderr_text(),
                });
            }
            info!(release = %chart.release, "chart installed");
            Ok(())
        })
    }
}
