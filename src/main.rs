//! Binary entry point for the `fabnctl` CLI.

use std::io::{self, IsTerminal, Read, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;

use fabnctl::{
    AutoAnswer, Cancellation, ChannelDeployment, ConsoleBridge, DeployError, ExecError,
    ExecRequest, FabnctlConfig, HelmClient, KubectlClient, Level, OrdererDeployer,
    OrdererDeployment, ProcessCommandRunner, ProgressSink, Prompt, ReadinessPoller,
    RemoteCommand, RemoteExecutor, SequenceOutcome, SpinnerSink, StderrStream, StdinPrompt,
    StepSequencer, WorkloadQuery, WorkloadRef, WorkloadRefError, cancellation, deploy_channel,
    logging,
};

mod cli;

use cli::{ChannelCommand, Cli, Command, DeployTarget, ExecCommand, LogLevel};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Deploy(#[from] DeployError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("invalid workload: {0}")]
    Workload(#[from] WorkloadRefError),
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
}

impl CliError {
    fn stderr(&self) -> Option<&StderrStream> {
        match self {
            Self::Deploy(DeployError::Sequence(err)) => err.stderr(),
            Self::Exec(err) => Some(err.stderr()).filter(|stderr| !stderr.is_empty()),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = logging::init_logging(cli.log_level.map(LogLevel::into_level)) {
        writeln!(io::stderr(), "{err}").ok();
    }

    let (handle, cancel) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            handle.cancel();
        }
    });

    let interactive = !cli.yes && io::stdin().is_terminal();
    let exit_code = match dispatch(cli, &cancel).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err, interactive).await;
            1
        }
    };

    process::exit(exit_code);
}

impl LogLevel {
    const fn into_level(self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Trace => tracing::Level::TRACE,
        }
    }
}

async fn dispatch(cli: Cli, cancel: &Cancellation) -> Result<i32, CliError> {
    let config = FabnctlConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?
        .with_overrides(cli.namespace, cli.domain);
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let sink: Arc<dyn ProgressSink> = Arc::new(SpinnerSink::new(config.glyphs()));
    let kubectl = KubectlClient::new(config.kubectl_bin.clone(), ProcessCommandRunner)
        .with_context(config.kube_context.clone());
    let prompt: Arc<dyn Prompt> = if cli.yes {
        Arc::new(AutoAnswer(true))
    } else {
        Arc::new(StdinPrompt::new(true))
    };

    match cli.command {
        Command::Deploy(DeployTarget::Channel(args)) => {
            let poller = ReadinessPoller::new(kubectl.clone(), Arc::clone(&sink))
                .with_prompt(prompt)
                .with_poll_interval(config.poll_interval());
            let sequencer = StepSequencer::new(poller, kubectl, Arc::clone(&sink))
                .with_readiness_timeout(config.readiness_timeout());
            run_channel(&args, &config, &sequencer, sink.as_ref(), cancel).await
        }
        Command::Deploy(DeployTarget::Orderer) => {
            let helm = HelmClient::new(config.helm_bin.clone(), ProcessCommandRunner)
                .with_context(config.kube_context.clone());
            let deployer = OrdererDeployer::new(kubectl, helm, Arc::clone(&sink));
            let deployment = orderer_deployment(&config)?;
            deployer.deploy(&deployment, cancel).await?;
            sink.persist(
                Level::Success,
                &format!(
                    "Orderer service successfully deployed on {}!",
                    deployment.fqdn()
                ),
            );
            Ok(0)
        }
        Command::Exec(args) => run_exec(args, &config.namespace, &kubectl, sink, cancel).await,
    }
}

async fn run_channel<Q, X>(
    args: &ChannelCommand,
    config: &FabnctlConfig,
    sequencer: &StepSequencer<Q, X>,
    sink: &dyn ProgressSink,
    cancel: &Cancellation,
) -> Result<i32, CliError>
where
    Q: WorkloadQuery,
    X: RemoteExecutor,
{
    let domain = config
        .domain()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let deployment = ChannelDeployment::new(
        &args.org,
        &args.peer,
        &args.channel,
        &config.namespace,
        &config.orderer_address(domain),
    )?;

    match deploy_channel(sequencer, &deployment, cancel).await? {
        SequenceOutcome::Completed(report) => {
            tracing::debug!(pod = %report.pod, created = report.created(), "channel sequence finished");
            sink.persist(
                Level::Success,
                &format!("🎉 Channel '{}' successfully deployed!", deployment.channel),
            );
        }
        SequenceOutcome::Declined { target } => {
            tracing::info!(%target, "channel deployment declined");
        }
    }
    Ok(0)
}

fn orderer_deployment(config: &FabnctlConfig) -> Result<OrdererDeployment, CliError> {
    let domain = config
        .domain()
        .map_err(|err| CliError::Config(err.to_string()))?;
    Ok(OrdererDeployment {
        hostname: config.orderer_hostname.clone(),
        domain: domain.to_owned(),
        namespace: config.namespace.clone(),
        crypto_config_dir: config.crypto_config_dir(domain),
        charts_path: config.charts_path.clone().into(),
        target_arch: config.target_arch.clone(),
        install_timeout: config.install_timeout(),
    })
}

async fn run_exec<X: RemoteExecutor>(
    args: ExecCommand,
    namespace: &str,
    executor: &X,
    sink: Arc<dyn ProgressSink>,
    cancel: &Cancellation,
) -> Result<i32, CliError> {
    validate_command_args(&args.command)?;
    let request = exec_request(args, namespace)?;

    let (mut console, session) =
        ConsoleBridge::start(request.target.to_string(), sink, cancel.clone());
    let result = executor.run_attached(&request, &mut console, cancel).await;
    console.close().await;
    session.finish().await;

    exit_status(result.map(|_| ()))
}

fn exec_request(args: ExecCommand, namespace: &str) -> Result<ExecRequest, CliError> {
    let base = WorkloadRef::builder()
        .namespace(namespace)
        .container(args.container);
    let target = match (args.pod, args.selector) {
        (Some(pod), _) => base.name(pod),
        (None, Some(selector)) => base.labels(selector),
        (None, None) => base,
    }
    .build()?;
    Ok(ExecRequest::new(target, RemoteCommand::exec(args.command)))
}

/// A remote command that ran and failed passes its status through; only a
/// broken channel is an error of the CLI itself.
fn exit_status(result: Result<(), ExecError>) -> Result<i32, CliError> {
    match result {
        Ok(()) => Ok(0),
        Err(err) => match err.exit_code() {
            Some(code) => {
                io::stderr().write_all(err.stderr().text().as_bytes()).ok();
                Ok(code)
            }
            None => Err(CliError::Exec(err)),
        },
    }
}

fn validate_command_args(args: &[String]) -> Result<(), CliError> {
    for arg in args {
        if arg
            .chars()
            .any(|ch| matches!(ch, '\u{0000}'..='\u{0008}' | '\u{000B}'..='\u{001F}' | '\u{007F}'))
        {
            return Err(CliError::InvalidCommand(String::from(concat!(
                "command arguments must not contain control characters other than ",
                "tab or newline (ASCII 0x00-0x1F or 0x7F)"
            ))));
        }
    }
    Ok(())
}

async fn report_error(err: &CliError, interactive: bool) {
    write_error(io::stderr(), err);
    let Some(stderr) = err.stderr() else {
        return;
    };
    let show = !interactive
        || StdinPrompt::new(false)
            .confirm("Do you want to see the captured stderr?")
            .await;
    if show {
        write_stderr_dump(io::stderr(), stderr);
    }
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

fn write_stderr_dump(mut target: impl Write, stderr: &StderrStream) {
    let mut reader = stderr.clone();
    let mut captured = Vec::with_capacity(stderr.len());
    if reader.read_to_end(&mut captured).is_err() {
        return;
    }
    writeln!(target, "--- captured stderr ---").ok();
    target.write_all(&captured).ok();
    if !captured.ends_with(b"\n") {
        writeln!(target).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabnctl::test_support::{ScriptedExec, ScriptedExecutor};
    use fabnctl::{SequenceError, SilentSink};
    use rstest::rstest;

    fn request() -> ExecRequest {
        exec_request(
            ExecCommand {
                pod: Some(String::from("cli-0")),
                selector: None,
                container: None,
                command: vec![String::from("false")],
            },
            "network",
        )
        .expect("request should build")
    }

    #[rstest]
    #[case(&["fabnctl", "deploy", "channel", "-o", "org1", "-c", "supply"])]
    #[case(&["fabnctl", "--namespace", "fabric", "-y", "deploy", "orderer"])]
    #[case(&["fabnctl", "exec", "-l", "app=cli", "--", "peer", "channel", "list"])]
    fn accepts_documented_invocations(#[case] argv: &[&str]) {
        assert!(Cli::try_parse_from(argv).is_ok(), "argv: {argv:?}");
    }

    #[rstest]
    #[case(&["fabnctl", "deploy", "channel", "-c", "supply"])]
    #[case(&["fabnctl", "exec", "--pod", "a", "-l", "app=cli", "--", "ls"])]
    #[case(&["fabnctl", "exec", "--", "ls"])]
    fn rejects_incomplete_invocations(#[case] argv: &[&str]) {
        assert!(Cli::try_parse_from(argv).is_err(), "argv: {argv:?}");
    }

    #[test]
    fn channel_peer_defaults_to_peer0() {
        let cli = Cli::try_parse_from(["fabnctl", "deploy", "channel", "-o", "org1", "-c", "supply"])
            .expect("parse");
        let Command::Deploy(DeployTarget::Channel(args)) = cli.command else {
            panic!("expected channel deployment");
        };
        assert_eq!(args.peer, "peer0");
    }

    #[test]
    fn validate_command_args_rejects_control_characters() {
        let err = validate_command_args(&[String::from("echo\u{1b}bad")])
            .expect_err("escape should be rejected");

        assert!(
            matches!(err, CliError::InvalidCommand(ref message) if message.contains("control characters")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn validate_command_args_accepts_safe_arguments() {
        assert!(validate_command_args(&[String::from("echo"), String::from("ok")]).is_ok());
    }

    #[test]
    fn exec_request_targets_the_pod() {
        let request = request();
        assert_eq!(request.target.namespace(), "network");
        assert_eq!(request.command.argv(), vec!["false"]);
    }

    #[test]
    fn remote_failure_passes_exit_code_through() {
        let err = ExecError::remote_failure(&request(), 3, StderrStream::from(b"boom\n".to_vec()));
        assert!(matches!(exit_status(Err(err)), Ok(3)));
    }

    #[test]
    fn transport_failure_is_an_error() {
        let err = ExecError::transport(&request(), "connection refused", StderrStream::default());
        assert!(matches!(exit_status(Err(err)), Err(CliError::Exec(_))));
    }

    #[tokio::test]
    async fn run_exec_reports_remote_status() {
        let executor = ScriptedExecutor::default();
        executor.push(ScriptedExec::RemoteFailure {
            exit_code: 7,
            stderr: String::from("Error: no such channel\n"),
        });
        let args = ExecCommand {
            pod: Some(String::from("cli-0")),
            selector: None,
            container: None,
            command: vec![String::from("false")],
        };

        let code = run_exec(args, "network", &executor, Arc::new(SilentSink), &Cancellation::never())
            .await
            .expect("remote failure is not a CLI error");

        assert_eq!(code, 7);
        assert_eq!(executor.commands(), vec![String::from("false")]);
    }

    #[test]
    fn aborted_sequence_exposes_captured_stderr() {
        let source = ExecError::remote_failure(&request(), 1, StderrStream::from(b"bad tx".to_vec()));
        let err = CliError::Deploy(DeployError::Sequence(SequenceError::Aborted {
            step: String::from("create"),
            target: String::from("cli"),
            source,
        }));
        assert_eq!(err.stderr().map(StderrStream::text).as_deref(), Some("bad tx"));
    }

    #[test]
    fn write_error_writes_cli_error() {
        let mut buf = Vec::new();
        let err = CliError::Config(String::from("missing network domain"));
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).expect("utf8");
        assert!(
            rendered.contains("configuration error: missing network domain"),
            "rendered: {rendered}"
        );
    }

    #[test]
    fn stderr_dump_is_framed_and_terminated() {
        let mut buf = Vec::new();
        write_stderr_dump(&mut buf, &StderrStream::from(b"Error: bad tx".to_vec()));
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "--- captured stderr ---\nError: bad tx\n"
        );
    }
}
