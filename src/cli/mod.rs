//! Command-line interface definitions for the `fabnctl` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI for the `fabnctl` binary.
#[derive(Debug, Parser)]
#[command(
    name = "fabnctl",
    about = "Deploy Hyperledger Fabric network components onto Kubernetes",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Namespace the network is deployed into.
    #[arg(short = 'n', long, global = true, value_name = "NAMESPACE")]
    pub(crate) namespace: Option<String>,
    /// Network domain, such as example.com.
    #[arg(short = 'd', long, global = true, value_name = "DOMAIN")]
    pub(crate) domain: Option<String>,
    /// Log verbosity; overrides FABNCTL_LOG.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub(crate) log_level: Option<LogLevel>,
    /// Never prompt; keep waiting for missing workloads and print captured
    /// stderr on failure.
    #[arg(short = 'y', long, global = true)]
    pub(crate) yes: bool,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of `fabnctl`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Deploy a network component.
    #[command(subcommand)]
    Deploy(DeployTarget),
    /// Run a command inside a running container and stream its output.
    Exec(ExecCommand),
}

/// Components `fabnctl deploy` knows about.
#[derive(Debug, Subcommand)]
pub(crate) enum DeployTarget {
    /// Create a channel if needed and join a peer to it.
    Channel(ChannelCommand),
    /// Create the orderer's TLS secrets and install its chart.
    Orderer,
}

/// Arguments for `fabnctl deploy channel`.
#[derive(Debug, Args)]
pub(crate) struct ChannelCommand {
    /// Organization owning the peer.
    #[arg(short = 'o', long, value_name = "ORG")]
    pub(crate) org: String,
    /// Peer to join to the channel.
    #[arg(short = 'p', long, default_value = "peer0", value_name = "PEER")]
    pub(crate) peer: String,
    /// Channel to create and join.
    #[arg(short = 'c', long, value_name = "CHANNEL")]
    pub(crate) channel: String,
}

/// Arguments for `fabnctl exec`.
#[derive(Debug, Args)]
pub(crate) struct ExecCommand {
    /// Pod to run in.
    #[arg(long, value_name = "POD", conflicts_with = "selector", required_unless_present = "selector")]
    pub(crate) pod: Option<String>,
    /// Label selector; the first ready matching pod is used.
    #[arg(short = 'l', long, value_name = "SELECTOR")]
    pub(crate) selector: Option<String>,
    /// Container within the pod.
    #[arg(long, value_name = "CONTAINER")]
    pub(crate) container: Option<String>,
    /// Command to execute in the container (use -- to separate flags).
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) command: Vec<String>,
}

/// Log levels accepted by `--log-level`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational events.
    Info,
    /// Debugging detail.
    Debug,
    /// Everything.
    Trace,
}
