//! Channel deployment: ensure the channel exists, then join the peer.

use std::borrow::Cow;

use shell_escape::unix::escape;

use crate::cancel::Cancellation;
use crate::exec::RemoteExecutor;
use crate::readiness::WorkloadQuery;
use crate::sequence::{Probe, SequenceOutcome, SequencePlan, Step, StepSequencer};
use crate::workload::{RemoteCommand, WorkloadRef};

use super::{APP_LABEL, DeployError};

/// Parameters of a channel deployment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelDeployment {
    /// Organization owning the peer.
    pub org: String,
    /// Peer name within the organization, such as `peer0`.
    pub peer: String,
    /// Channel to create and join.
    pub channel: String,
    /// Namespace the network runs in.
    pub namespace: String,
    /// Orderer endpoint, `host:port`.
    pub orderer_address: String,
}

impl ChannelDeployment {
    /// Builds the deployment, rejecting blank parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Config`] naming the first blank parameter and
    /// [`DeployError::InvalidName`] for a channel name Fabric would reject.
    pub fn new(
        org: &str,
        peer: &str,
        channel: &str,
        namespace: &str,
        orderer_address: &str,
    ) -> Result<Self, DeployError> {
        Ok(Self {
            org: required(org, "org")?,
            peer: required(peer, "peer")?,
            channel: channel_name(channel)?,
            namespace: required(namespace, "namespace")?,
            orderer_address: required(orderer_address, "orderer")?,
        })
    }

    /// Host name of the peer workload, such as `peer0.org1.org`.
    #[must_use]
    pub fn peer_host(&self) -> String {
        format!("{}.{}.org", self.peer, self.org)
    }

    /// Host name of the peer's administrative CLI workload.
    #[must_use]
    pub fn cli_host(&self) -> String {
        format!("cli.{}", self.peer_host())
    }

    /// Describes the deployment as a sequence plan.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Workload`] when a workload reference cannot be
    /// built.
    pub fn plan(&self) -> Result<SequencePlan, DeployError> {
        let peer = self.workload(&self.peer_host())?;
        let cli = self.workload(&self.cli_host())?;
        let channel = &self.channel;
        let orderer = escape(Cow::from(self.orderer_address.as_str()));

        Ok(SequencePlan {
            name: format!("channel {channel}"),
            prerequisites: vec![peer],
            exec_target: cli,
            probe: Probe {
                command: RemoteCommand::shell([
                    String::from("peer channel fetch config"),
                    format!("{channel}.block"),
                    format!("-c {channel}"),
                    format!("-o {orderer}"),
                    String::from("--tls --cafile $ORDERER_CA"),
                ]),
                present_message: format!(
                    "Channel '{channel}' already created, fetched its genesis block"
                ),
            },
            create: Step {
                name: String::from("create channel"),
                command: RemoteCommand::shell([
                    String::from("peer channel create"),
                    format!("-c {channel}"),
                    format!("-f ./channel-artifacts/{channel}.tx"),
                    format!("-o {orderer}"),
                    String::from("--tls --cafile $ORDERER_CA"),
                ]),
                start_message: String::from("Creating channel"),
                success_message: format!("Channel '{channel}' successfully created"),
            },
            follow_up: Step {
                name: String::from("join channel"),
                command: RemoteCommand::shell([
                    String::from("peer channel join"),
                    format!("-b {channel}.block"),
                ]),
                start_message: format!(
                    "Joining '{}' organization to '{channel}' channel",
                    self.org
                ),
                success_message: format!(
                    "Organization '{}' successfully joined '{channel}' channel",
                    self.org
                ),
            },
        })
    }

    fn workload(&self, host: &str) -> Result<WorkloadRef, DeployError> {
        Ok(WorkloadRef::builder()
            .namespace(&self.namespace)
            .labels(format!("{APP_LABEL}={host}"))
            .build()?)
    }
}

/// Fabric channel names: a lowercase letter followed by lowercase letters,
/// digits, dots and dashes, fewer than 250 characters. They end up inside
/// `sh -c` scripts unquoted.
fn channel_name(value: &str) -> Result<String, DeployError> {
    let name = required(value, "channel")?;
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|first| first.is_ascii_lowercase())
        && chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '.' | '-'))
        && name.len() < 250;
    if !valid {
        return Err(DeployError::InvalidName {
            what: "channel",
            value: name,
        });
    }
    Ok(name)
}

fn required(value: &str, name: &'static str) -> Result<String, DeployError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DeployError::Config(name));
    }
    Ok(trimmed.to_owned())
}

/// Ensures `deployment`'s channel exists and the peer has joined it.
///
/// # Errors
///
/// Returns [`DeployError::Sequence`] when the sequence fails, or a plan
/// construction error.
pub async fn deploy_channel<Q, X>(
    sequencer: &StepSequencer<Q, X>,
    deployment: &ChannelDeployment,
    cancel: &Cancellation,
) -> Result<SequenceOutcome, DeployError>
where
    Q: WorkloadQuery,
    X: RemoteExecutor,
{
    let plan = deployment.plan()?;
    Ok(sequencer.run(&plan, cancel).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::WorkloadSelector;
    use rstest::rstest;

    fn deployment() -> ChannelDeployment {
        ChannelDeployment::new("org1", "peer0", "supply", "network", "orderer.example.com:443")
            .expect("valid deployment")
    }

    #[test]
    fn plan_targets_peer_and_cli_workloads() {
        let plan = deployment().plan().expect("plan");
        assert_eq!(
            plan.prerequisites
                .iter()
                .map(|target| target.selector().clone())
                .collect::<Vec<_>>(),
            vec![WorkloadSelector::Labels(String::from(
                "fabnetd/app=peer0.org1.org"
            ))]
        );
        assert_eq!(
            plan.exec_target.selector(),
            &WorkloadSelector::Labels(String::from("fabnetd/app=cli.peer0.org1.org"))
        );
    }

    #[test]
    fn plan_commands_run_through_the_shell() {
        let plan = deployment().plan().expect("plan");
        assert_eq!(
            plan.probe.command.to_string(),
            "peer channel fetch config supply.block -c supply \
             -o orderer.example.com:443 --tls --cafile $ORDERER_CA"
        );
        assert_eq!(
            plan.create.command.to_string(),
            "peer channel create -c supply -f ./channel-artifacts/supply.tx \
             -o orderer.example.com:443 --tls --cafile $ORDERER_CA"
        );
        assert_eq!(plan.follow_up.command.argv(), vec![
            "sh",
            "-c",
            "peer channel join -b supply.block"
        ]);
    }

    #[rstest]
    #[case("x; rm -rf /data #")]
    #[case("Supply")]
    #[case("1channel")]
    #[case("supply channel")]
    #[case("$(reboot)")]
    fn unsafe_channel_names_are_rejected(#[case] channel: &str) {
        let err = ChannelDeployment::new("org1", "peer0", channel, "network", "orderer:443")
            .expect_err("invalid channel name");
        assert!(
            matches!(&err, DeployError::InvalidName { what: "channel", value } if value == channel),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn dotted_and_dashed_channel_names_are_accepted() {
        let deployment =
            ChannelDeployment::new("org1", "peer0", "supply-chain.v2", "network", "orderer:443")
                .expect("valid channel name");
        assert_eq!(deployment.channel, "supply-chain.v2");
    }

    #[test]
    fn orderer_address_is_quoted_in_commands() {
        let deployment =
            ChannelDeployment::new("org1", "peer0", "supply", "network", "orderer:443 --evil")
                .expect("orderer address is not validated");
        let plan = deployment.plan().expect("plan");
        assert!(
            plan.create
                .command
                .argv()
                .last()
                .is_some_and(|script| script.contains("-o 'orderer:443 --evil'")),
            "unexpected command: {}",
            plan.create.command
        );
    }

    #[rstest]
    #[case("", "peer0", "supply", "org")]
    #[case("org1", " ", "supply", "peer")]
    #[case("org1", "peer0", "", "channel")]
    fn blank_parameters_are_rejected(
        #[case] org: &str,
        #[case] peer: &str,
        #[case] channel: &str,
        #[case] missing: &str,
    ) {
        let err = ChannelDeployment::new(org, peer, channel, "network", "orderer:443")
            .expect_err("blank parameter");
        assert!(matches!(err, DeployError::Config(name) if name == missing));
    }
}
