//! Tests for the step sequencer.

use std::sync::Arc;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::exec::{ExecError, StderrStream};
use crate::test_support::{
    RecordingSink, ScriptedExec, ScriptedExecutor, ScriptedPrompt, ScriptedQuery, pending, ready,
};
use crate::workload::WorkloadSelector;

fn workload(labels: &str) -> WorkloadRef {
    WorkloadRef::builder()
        .namespace("network")
        .labels(labels)
        .build()
        .expect("reference should build")
}

#[fixture]
fn plan() -> SequencePlan {
    SequencePlan {
        name: String::from("channel ch1"),
        prerequisites: vec![workload("app=peer")],
        exec_target: workload("app=cli"),
        probe: Probe {
            command: RemoteCommand::exec(["probe"]),
            present_message: String::from("Channel 'ch1' already exists"),
        },
        create: Step {
            name: String::from("create"),
            command: RemoteCommand::exec(["create"]),
            start_message: String::from("Creating channel"),
            success_message: String::from("Channel created"),
        },
        follow_up: Step {
            name: String::from("join"),
            command: RemoteCommand::exec(["join"]),
            start_message: String::from("Joining channel"),
            success_message: String::from("Channel joined"),
        },
    }
}

struct Harness {
    query: ScriptedQuery,
    executor: ScriptedExecutor,
    sink: Arc<RecordingSink>,
    prompt: ScriptedPrompt,
}

impl Harness {
    fn ready() -> Self {
        let harness = Self::empty();
        harness.query.push(vec![ready("peer-0")]);
        harness.query.push(vec![ready("cli-0")]);
        harness
    }

    fn empty() -> Self {
        Self {
            query: ScriptedQuery::new(),
            executor: ScriptedExecutor::new(),
            sink: Arc::new(RecordingSink::default()),
            prompt: ScriptedPrompt::default(),
        }
    }

    fn sequencer(&self) -> StepSequencer<ScriptedQuery, ScriptedExecutor> {
        let poller = ReadinessPoller::new(self.query.clone(), self.sink.clone())
            .with_prompt(Arc::new(self.prompt.clone()))
            .with_poll_interval(Duration::from_secs(1));
        StepSequencer::new(poller, self.executor.clone(), self.sink.clone())
            .with_readiness_timeout(Duration::from_secs(4))
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn absent_resource_is_created_then_joined(plan: SequencePlan) {
    let harness = Harness::ready();
    harness.executor.push(ScriptedExec::RemoteFailure {
        exit_code: 1,
        stderr: String::from("Error: channel not found"),
    });
    harness.executor.push(ScriptedExec::Success(String::new()));
    harness.executor.push(ScriptedExec::Success(String::new()));

    let outcome = harness
        .sequencer()
        .run(&plan, &Cancellation::never())
        .await
        .expect("sequence succeeds");

    let SequenceOutcome::Completed(report) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert!(report.created());
    assert_eq!(report.pod, "cli-0");
    assert_eq!(harness.executor.commands(), vec!["probe", "create", "join"]);
    for request in harness.executor.requests() {
        assert_eq!(
            request.target.selector(),
            &WorkloadSelector::Name(String::from("cli-0"))
        );
    }
    assert_eq!(
        harness.sink.persisted(),
        vec![
            (Level::Success, String::from("Channel created")),
            (Level::Success, String::from("Channel joined")),
        ]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn present_resource_skips_creation(plan: SequencePlan) {
    let harness = Harness::ready();
    harness.executor.push(ScriptedExec::Success(String::new()));
    harness.executor.push(ScriptedExec::Success(String::new()));

    let outcome = harness
        .sequencer()
        .run(&plan, &Cancellation::never())
        .await
        .expect("sequence succeeds");

    let SequenceOutcome::Completed(report) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert!(!report.created());
    assert_eq!(
        report.steps,
        vec![
            StepRecord {
                name: String::from("create"),
                status: StepStatus::Skipped,
            },
            StepRecord {
                name: String::from("join"),
                status: StepStatus::Done,
            },
        ]
    );
    assert_eq!(harness.executor.commands(), vec!["probe", "join"]);
    assert_eq!(
        harness.sink.persisted().first(),
        Some(&(Level::Info, String::from("Channel 'ch1' already exists")))
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn probe_transport_failure_aborts_before_mutation(plan: SequencePlan) {
    let harness = Harness::ready();
    harness
        .executor
        .push(ScriptedExec::Transport(String::from("connection reset")));

    let err = harness
        .sequencer()
        .run(&plan, &Cancellation::never())
        .await
        .expect_err("transport failure");

    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert!(err.exec_error().is_some_and(ExecError::is_transport));
    assert_eq!(harness.executor.commands(), vec!["probe"]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn failed_create_aborts_without_follow_up(plan: SequencePlan) {
    let harness = Harness::ready();
    harness.executor.push(ScriptedExec::RemoteFailure {
        exit_code: 1,
        stderr: String::new(),
    });
    harness.executor.push(ScriptedExec::RemoteFailure {
        exit_code: 2,
        stderr: String::from("Error: bad config update\n"),
    });

    let err = harness
        .sequencer()
        .run(&plan, &Cancellation::never())
        .await
        .expect_err("create fails");

    assert_eq!(err.kind(), ErrorKind::SequenceAborted);
    assert_eq!(harness.executor.commands(), vec!["probe", "create"]);
    assert_eq!(
        err.stderr().map(StderrStream::text).as_deref(),
        Some("Error: bad config update\n")
    );
    assert!(err.to_string().contains("bytes of stderr captured"));
    assert_eq!(
        harness.sink.persisted().last().map(|(level, _)| *level),
        Some(Level::Error)
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn declining_a_missing_workload_changes_nothing(plan: SequencePlan) {
    let harness = Harness::empty();

    let outcome = harness
        .sequencer()
        .run(&plan, &Cancellation::never())
        .await
        .expect("declining is not an error");

    assert_eq!(
        outcome,
        SequenceOutcome::Declined {
            target: workload("app=peer").to_string(),
        }
    );
    assert!(harness.executor.requests().is_empty());
    assert_eq!(harness.prompt.questions().len(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn prerequisite_timeout_is_classified(plan: SequencePlan) {
    let harness = Harness::empty();
    harness.query.push(vec![pending("peer-0")]);

    let err = harness
        .sequencer()
        .run(&plan, &Cancellation::never())
        .await
        .expect_err("peer never ready");

    assert_eq!(err.kind(), ErrorKind::ReadinessTimeout);
    assert!(harness.executor.requests().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn exec_target_is_awaited_after_prerequisites(plan: SequencePlan) {
    let harness = Harness::ready();
    harness.executor.push(ScriptedExec::Success(String::new()));
    harness.executor.push(ScriptedExec::Success(String::new()));

    harness
        .sequencer()
        .run(&plan, &Cancellation::never())
        .await
        .expect("sequence succeeds");

    assert_eq!(
        harness.query.targets(),
        vec![workload("app=peer"), workload("app=cli")]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn broken_channel_during_follow_up_is_a_transport_failure(plan: SequencePlan) {
    let harness = Harness::ready();
    harness.executor.push(ScriptedExec::Success(String::new()));
    harness
        .executor
        .push(ScriptedExec::Transport(String::from("error dialing backend: EOF")));

    let err = harness
        .sequencer()
        .run(&plan, &Cancellation::never())
        .await
        .expect_err("join cannot reach the pod");

    assert!(matches!(err, SequenceError::Aborted { ref step, .. } if step == "join"));
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    let commands = harness.executor.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands.last().map(String::as_str), Some("join"));
}
