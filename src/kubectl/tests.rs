//! Tests for the kubectl adapter.

use std::sync::Arc;

use rstest::{fixture, rstest};
use tokio::io::AsyncWriteExt;

use super::*;
use crate::console::ConsoleBridge;
use crate::secrets::SecretKind;
use crate::test_support::{RecordingSink, ScriptedRunner, json_pods, ready};
use crate::workload::RemoteCommand;

#[fixture]
fn runner() -> ScriptedRunner {
    ScriptedRunner::new()
}

fn client(runner: &ScriptedRunner) -> KubectlClient<ScriptedRunner> {
    KubectlClient::new("kubectl", runner.clone())
}

fn pod_request(command: RemoteCommand) -> ExecRequest {
    let target = WorkloadRef::builder()
        .namespace("network")
        .name("cli-peer0-7c9")
        .container(Some(String::from("cli")))
        .build()
        .expect("reference should build");
    ExecRequest::new(target, command)
}

fn commands(runner: &ScriptedRunner) -> Vec<String> {
    runner
        .invocations()
        .iter()
        .map(Invocation::command_string)
        .collect()
}

#[rstest]
#[tokio::test]
async fn list_uses_label_selector(runner: ScriptedRunner) {
    runner.push_output(Some(0), json_pods(&[("peer0-a", "Running", true)]), "");
    let target = WorkloadRef::builder()
        .namespace("network")
        .labels("fabnctl/app=peer0.org1.org")
        .build()
        .expect("reference should build");

    let statuses = client(&runner)
        .with_context(Some(String::from("kind-fabric")))
        .list(&target)
        .await
        .expect("listing succeeds");

    assert_eq!(statuses, vec![ready("peer0-a")]);
    assert_eq!(
        commands(&runner),
        vec![
            "kubectl --context kind-fabric get pods -n network -l fabnctl/app=peer0.org1.org -o json"
        ]
    );
}

#[rstest]
#[tokio::test]
async fn list_failure_is_a_command_failure(runner: ScriptedRunner) {
    runner.push_output(Some(1), "", "error: You must be logged in to the server\n");
    let target = WorkloadRef::builder()
        .namespace("network")
        .name("peer0")
        .build()
        .expect("reference should build");

    let err = client(&runner).list(&target).await.expect_err("listing fails");

    assert_eq!(
        err,
        QueryError::CommandFailure {
            program: String::from("kubectl"),
            status: String::from("1"),
            stderr: String::from("error: You must be logged in to the server"),
        }
    );
    assert_eq!(
        commands(&runner),
        vec!["kubectl get pods -n network --field-selector metadata.name=peer0 -o json"]
    );
}

#[rstest]
#[tokio::test]
async fn exec_success_returns_output(runner: ScriptedRunner) {
    runner.push_output(Some(0), "Blockchain info\n", "");

    let output = client(&runner)
        .run(
            &pod_request(RemoteCommand::exec(["peer", "channel", "getinfo", "-c", "ch1"])),
            &Cancellation::never(),
        )
        .await
        .expect("command succeeds");

    assert_eq!(output.stdout_text(), "Blockchain info\n");
    assert_eq!(
        commands(&runner),
        vec!["kubectl exec -n network cli-peer0-7c9 -c cli -- peer channel getinfo -c ch1"]
    );
}

#[rstest]
#[tokio::test]
async fn remote_exit_marker_means_command_failure(runner: ScriptedRunner) {
    runner.push_output(
        Some(1),
        "",
        "Error: can't read the block\ncommand terminated with exit code 1\n",
    );

    let err = client(&runner)
        .run(
            &pod_request(RemoteCommand::shell(["peer channel fetch config ch1.block -c ch1"])),
            &Cancellation::never(),
        )
        .await
        .expect_err("command fails");

    assert!(err.is_remote_failure());
    assert_eq!(err.exit_code(), Some(1));
    assert!(err.stderr().text().contains("can't read the block"));
}

#[rstest]
#[case::unreachable(
    Some(1),
    "Unable to connect to the server: dial tcp 10.0.0.1:6443: i/o timeout\n"
)]
#[case::pod_gone(Some(1), "Error from server (NotFound): pods \"cli-peer0-7c9\" not found\n")]
#[case::killed(None, "")]
#[tokio::test]
async fn failures_without_marker_are_transport(
    runner: ScriptedRunner,
    #[case] code: Option<i32>,
    #[case] stderr: &str,
) {
    runner.push_output(code, "", stderr);

    let err = client(&runner)
        .run(&pod_request(RemoteCommand::exec(["true"])), &Cancellation::never())
        .await
        .expect_err("channel fails");

    assert!(err.is_transport());
    assert_eq!(err.exit_code(), None);
}

#[rstest]
#[tokio::test]
async fn spawn_failure_is_transport(runner: ScriptedRunner) {
    let err = client(&runner)
        .run(&pod_request(RemoteCommand::exec(["true"])), &Cancellation::never())
        .await
        .expect_err("no scripted response");

    assert!(err.is_transport());
}

#[rstest]
#[tokio::test]
async fn label_target_is_resolved_to_ready_pod(runner: ScriptedRunner) {
    runner.push_output(
        Some(0),
        json_pods(&[("cli-a", "Pending", false), ("cli-b", "Running", true)]),
        "",
    );
    runner.push_success();
    let target = WorkloadRef::builder()
        .namespace("network")
        .labels("fabnctl/app=cli.peer0.org1.org")
        .build()
        .expect("reference should build");

    client(&runner)
        .run(
            &ExecRequest::new(target, RemoteCommand::exec(["ls"])),
            &Cancellation::never(),
        )
        .await
        .expect("command succeeds");

    assert_eq!(
        commands(&runner).last().map(String::as_str),
        Some("kubectl exec -n network cli-b -- ls")
    );
}

#[rstest]
#[tokio::test]
async fn label_target_without_ready_pod_is_transport(runner: ScriptedRunner) {
    runner.push_output(Some(0), json_pods(&[]), "");
    let target = WorkloadRef::builder()
        .namespace("network")
        .labels("fabnctl/app=cli.peer0.org1.org")
        .build()
        .expect("reference should build");

    let err = client(&runner)
        .run(
            &ExecRequest::new(target, RemoteCommand::exec(["ls"])),
            &Cancellation::never(),
        )
        .await
        .expect_err("no pod");

    assert!(err.is_transport());
    assert_eq!(runner.invocations().len(), 1);
}

#[rstest]
#[tokio::test]
async fn stdin_payload_enables_interactive_flag(runner: ScriptedRunner) {
    runner.push_success();
    let request = pod_request(RemoteCommand::exec(["cat"]).with_stdin(b"hello".to_vec()));

    client(&runner)
        .run(&request, &Cancellation::never())
        .await
        .expect("command succeeds");

    let invocations = runner.invocations();
    let invocation = invocations.first().expect("one invocation");
    assert_eq!(
        invocation.command_string(),
        "kubectl exec -i -n network cli-peer0-7c9 -c cli -- cat"
    );
    assert_eq!(invocation.stdin.as_deref(), Some(&b"hello"[..]));
}

#[rstest]
#[tokio::test]
async fn attached_run_streams_into_console(runner: ScriptedRunner) {
    runner.push_output(Some(0), "line one\nline two\n", "");
    let sink = Arc::new(RecordingSink::default());
    let (mut console, session) =
        ConsoleBridge::start("exec", sink.clone(), Cancellation::never());

    client(&runner)
        .run_attached(
            &pod_request(RemoteCommand::exec(["cat", "log"])),
            &mut console,
            &Cancellation::never(),
        )
        .await
        .expect("command succeeds");
    console.flush().await.expect("flush");
    console.close().await;
    session.finish().await;

    assert_eq!(sink.outputs(), vec!["line one", "line two"]);
}

#[rstest]
#[tokio::test]
async fn apply_pipes_manifest(runner: ScriptedRunner) {
    runner.push_success();
    let secret = SecretSpec {
        name: String::from("orderer.example.com-tls"),
        namespace: String::from("network"),
        kind: SecretKind::Tls,
        data: [
            (String::from("tls.crt"), b"CERT".to_vec()),
            (String::from("tls.key"), b"KEY".to_vec()),
        ]
        .into_iter()
        .collect(),
        labels: std::collections::BTreeMap::new(),
    };

    client(&runner)
        .apply(&secret, &Cancellation::never())
        .await
        .expect("apply succeeds");

    let invocations = runner.invocations();
    let invocation = invocations.first().expect("one invocation");
    assert_eq!(invocation.command_string(), "kubectl apply -f -");
    let manifest: serde_json::Value =
        serde_json::from_slice(invocation.stdin.as_deref().expect("stdin payload"))
            .expect("manifest is json");
    assert_eq!(manifest["type"], "kubernetes.io/tls");
    assert_eq!(manifest["data"]["tls.key"], "S0VZ");
}

#[test]
fn exit_marker_is_parsed_from_last_line() {
    assert_eq!(
        remote_exit_code(b"noise\ncommand terminated with exit code 127\n"),
        Some(127)
    );
    assert_eq!(remote_exit_code(b"error: unable to upgrade connection\n"), None);
}
