//! Idempotent multi-step remote workflows.
//!
//! A [`SequencePlan`] is data describing one workflow: which workloads must
//! be ready first, a probe that tells whether the resource already exists,
//! a create step run only when the probe reports absence, and a follow-up
//! step that always runs. [`StepSequencer::run`] executes a plan:
//!
//! 1. wait for every prerequisite, then for the execution target;
//! 2. run the probe; success means "present", a remote command failure
//!    means "absent", a transport failure aborts;
//! 3. run the create step when absent;
//! 4. run the follow-up step.
//!
//! Running the same plan twice against the same cluster leaves it in the
//! same state: the second run skips creation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::cancel::Cancellation;
use crate::exec::RemoteExecutor;
use crate::progress::{Level, ProgressDecorator, ProgressSink};
use crate::readiness::{Readiness, ReadinessPoller, WorkloadQuery};
use crate::workload::{ExecRequest, RemoteCommand, WorkloadRef};

mod error;

pub use error::{ErrorKind, SequenceError};

/// Default bound on waiting for each workload.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(180);

/// One decorated remote step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Step {
    /// Short name used in reports and errors.
    pub name: String,
    /// Command to run.
    pub command: RemoteCommand,
    /// Shown while the step runs.
    pub start_message: String,
    /// Persisted when the step succeeds.
    pub success_message: String,
}

/// Existence check deciding whether the create step runs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Probe {
    /// Command whose success means the resource already exists.
    pub command: RemoteCommand,
    /// Persisted when the resource already exists.
    pub present_message: String,
}

/// Declarative description of a workflow.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SequencePlan {
    /// Workflow name used in logs.
    pub name: String,
    /// Workloads that must be ready before anything runs.
    pub prerequisites: Vec<WorkloadRef>,
    /// Workload the probe and steps run in.
    pub exec_target: WorkloadRef,
    /// Existence check.
    pub probe: Probe,
    /// Runs only when the probe reports absence.
    pub create: Step,
    /// Always runs last.
    pub follow_up: Step,
}

/// What happened to a step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepStatus {
    /// The step ran and succeeded.
    Done,
    /// The step was not needed.
    Skipped,
}

/// Report line for one step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StepRecord {
    /// Step name.
    pub name: String,
    /// Outcome.
    pub status: StepStatus,
}

/// Summary of a completed workflow.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SequenceReport {
    /// Pod the steps ran in.
    pub pod: String,
    /// Create and follow-up records, in order.
    pub steps: Vec<StepRecord>,
}

impl SequenceReport {
    /// Whether the create step ran.
    #[must_use]
    pub fn created(&self) -> bool {
        self.steps
            .first()
            .is_some_and(|record| record.status == StepStatus::Done)
    }
}

/// How a workflow ended when it did not fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SequenceOutcome {
    /// Every step ran or was skipped as appropriate.
    Completed(SequenceReport),
    /// The user declined to wait for a missing workload; nothing ran.
    Declined {
        /// Rendered reference of the missing workload.
        target: String,
    },
}

enum Gate {
    Open { pod: String },
    Declined { target: String },
}

/// Runs [`SequencePlan`]s.
pub struct StepSequencer<Q, X> {
    poller: ReadinessPoller<Q>,
    executor: X,
    decorator: ProgressDecorator,
    sink: Arc<dyn ProgressSink>,
    readiness_timeout: Duration,
}

impl<Q, X> std::fmt::Debug for StepSequencer<Q, X> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StepSequencer")
            .field("readiness_timeout", &self.readiness_timeout)
            .finish_non_exhaustive()
    }
}

impl<Q: WorkloadQuery, X: RemoteExecutor> StepSequencer<Q, X> {
    /// Creates a sequencer.
    #[must_use]
    pub fn new(poller: ReadinessPoller<Q>, executor: X, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            poller,
            executor,
            decorator: ProgressDecorator::new(Arc::clone(&sink)),
            sink,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }

    /// Overrides how long to wait for each workload.
    #[must_use]
    pub const fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Runs `plan`.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::Readiness`] when a workload never became
    /// ready, [`SequenceError::Transport`] when the probe could not reach
    /// its target, and [`SequenceError::Aborted`] when a step failed.
    pub async fn run(
        &self,
        plan: &SequencePlan,
        cancel: &Cancellation,
    ) -> Result<SequenceOutcome, SequenceError> {
        let pod = match self.open_gate(plan, cancel).await? {
            Gate::Open { pod } => pod,
            Gate::Declined { target } => {
                self.sink
                    .persist(Level::Warning, &format!("Stopped waiting for {target}; nothing was changed"));
                return Ok(SequenceOutcome::Declined { target });
            }
        };
        let target = plan.exec_target.pinned(&pod);

        let present = self.probe(plan, &target, cancel).await?;
        let mut steps = Vec::with_capacity(2);
        if present {
            self.sink.persist(Level::Info, &plan.probe.present_message);
            steps.push(StepRecord {
                name: plan.create.name.clone(),
                status: StepStatus::Skipped,
            });
        } else {
            self.run_step(&plan.create, &target, cancel).await?;
            steps.push(StepRecord {
                name: plan.create.name.clone(),
                status: StepStatus::Done,
            });
        }

        self.run_step(&plan.follow_up, &target, cancel).await?;
        steps.push(StepRecord {
            name: plan.follow_up.name.clone(),
            status: StepStatus::Done,
        });

        info!(plan = %plan.name, %pod, created = !present, "sequence completed");
        Ok(SequenceOutcome::Completed(SequenceReport { pod, steps }))
    }

    async fn open_gate(
        &self,
        plan: &SequencePlan,
        cancel: &Cancellation,
    ) -> Result<Gate, SequenceError> {
        for prerequisite in &plan.prerequisites {
            if let Readiness::Declined = self
                .poller
                .wait_ready(prerequisite, self.readiness_timeout, cancel)
                .await?
            {
                return Ok(Gate::Declined {
                    target: prerequisite.to_string(),
                });
            }
        }
        match self
            .poller
            .wait_ready(&plan.exec_target, self.readiness_timeout, cancel)
            .await?
        {
            Readiness::Ready { pod } => Ok(Gate::Open { pod }),
            Readiness::Declined => Ok(Gate::Declined {
                target: plan.exec_target.to_string(),
            }),
        }
    }

    async fn probe(
        &self,
        plan: &SequencePlan,
        target: &WorkloadRef,
        cancel: &Cancellation,
    ) -> Result<bool, SequenceError> {
        let request = ExecRequest::new(target.clone(), plan.probe.command.clone());
        match self.executor.run(&request, cancel).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_remote_failure() => {
                debug!(plan = %plan.name, exit_code = ?err.exit_code(), "probe reports absent");
                Ok(false)
            }
            Err(source) => Err(SequenceError::Transport {
                step: String::from("probe"),
                target: target.to_string(),
                source,
            }),
        }
    }

    async fn run_step(
        &self,
        step: &Step,
        target: &WorkloadRef,
        cancel: &Cancellation,
    ) -> Result<(), SequenceError> {
        let request = ExecRequest::new(target.clone(), step.command.clone());
        self.decorator
            .decorate(
                &step.start_message,
                &step.success_message,
                self.executor.run(&request, cancel),
            )
            .await
            .map(drop)
            .map_err(|source| SequenceError::Aborted {
                step: step.name.clone(),
                target: target.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests;
