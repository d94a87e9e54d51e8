//! Deployment flows for network components.
//!
//! [`channel`] builds a [`crate::sequence::SequencePlan`] that ensures a
//! channel exists and joins a peer to it. [`orderer`] materialises the
//! orderer's TLS secrets and installs its chart.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::helm::ChartError;
use crate::secrets::SecretError;
use crate::sequence::SequenceError;
use crate::workload::WorkloadRefError;

pub mod channel;
pub mod orderer;

pub use channel::{ChannelDeployment, deploy_channel};
pub use orderer::{OrdererDeployer, OrdererDeployment, TlsMaterial};

/// Label key the charts attach to every workload.
pub const APP_LABEL: &str = "fabnetd/app";

/// Errors raised by deployment flows.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Raised when a required parameter is missing or blank.
    #[error("required parameter '{0}' is not specified")]
    Config(&'static str),
    /// Raised when a name contains characters it may not carry.
    #[error("invalid {what} name '{value}': use lowercase letters, digits, '.' and '-', starting with a letter")]
    InvalidName {
        /// What was being named.
        what: &'static str,
        /// Rejected value.
        value: String,
    },
    /// Raised when a workload reference cannot be built.
    #[error("invalid workload reference: {0}")]
    Workload(#[from] WorkloadRefError),
    /// Raised when key material cannot be read.
    #[error("failed to read {what} from path: {path}: {message}")]
    Material {
        /// What was being read.
        what: &'static str,
        /// File that could not be read.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Raised when a secret cannot be applied.
    #[error("failed to create {name} secret: {source}")]
    Secret {
        /// Secret name.
        name: String,
        /// Underlying failure.
        #[source]
        source: SecretError,
    },
    /// Raised when the chart installation fails.
    #[error("failed to install orderer helm chart: {0}")]
    Chart(#[source] ChartError),
    /// Raised when a sequenced flow fails.
    #[error(transparent)]
    Sequence(#[from] SequenceError),
}
