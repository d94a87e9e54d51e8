//! Core library for the `fabnctl` Fabric network deployment tool.
//!
//! The crate drives a Hyperledger Fabric network on Kubernetes through the
//! `kubectl` and `helm` command-line tools: it waits for workloads to become
//! ready, runs idempotent command sequences inside their containers (probe →
//! create when absent → follow-up), streams remote output through a console
//! bridge, and reports progress through a pluggable sink.

pub mod cancel;
pub mod config;
pub mod console;
pub mod deploy;
pub mod exec;
pub mod helm;
pub mod kubectl;
pub mod logging;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod readiness;
pub mod secrets;
pub mod sequence;
pub mod test_support;
pub mod workload;

pub use cancel::{CancelHandle, CancelReason, Cancellation, cancellation};
pub use config::{ConfigError, FabnctlConfig};
pub use console::{ConsoleBridge, ConsoleFile, ConsoleSession};
pub use deploy::{
    APP_LABEL, ChannelDeployment, DeployError, OrdererDeployer, OrdererDeployment, TlsMaterial,
    deploy_channel,
};
pub use exec::{ExecError, ExecOutput, RemoteExecutor, StderrStream};
pub use helm::{ChartError, ChartInstaller, ChartSpec, HelmClient};
pub use kubectl::KubectlClient;
pub use process::{CommandOutput, CommandRunner, Invocation, ProcessCommandRunner, ProcessError};
pub use progress::{
    Glyphs, Level, ProgressDecorator, ProgressSink, ProgressState, SilentSink, SpinnerSink,
};
pub use prompt::{AutoAnswer, Prompt, StdinPrompt};
pub use readiness::{
    QueryError, Readiness, ReadinessError, ReadinessOutcome, ReadinessPoller, WorkloadQuery,
    WorkloadStatus,
};
pub use secrets::{SecretError, SecretKind, SecretSpec, SecretStore};
pub use sequence::{
    ErrorKind, Probe, SequenceError, SequenceOutcome, SequencePlan, SequenceReport, Step,
    StepRecord, StepSequencer, StepStatus,
};
pub use workload::{
    ExecRequest, RemoteCommand, WorkloadRef, WorkloadRefBuilder, WorkloadRefError,
    WorkloadSelector,
};
