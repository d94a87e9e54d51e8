//! Bounded polling until a workload reports ready.
//!
//! [`ReadinessPoller::wait_ready`] re-queries a [`WorkloadQuery`] at a fixed
//! interval until a matching pod is ready, the timeout elapses, or the
//! caller's [`Cancellation`] fires. The first time nothing matches the
//! selector at all, the user is asked whether to keep waiting.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::cancel::Cancellation;
use crate::progress::{Level, ProgressDecorator, ProgressSink};
use crate::prompt::{AutoAnswer, Prompt};
use crate::workload::WorkloadRef;

mod error;

pub use error::{QueryError, ReadinessError};

/// Interval between readiness checks unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Observed state of one pod matching a selector.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkloadStatus {
    /// Pod name.
    pub name: String,
    /// Whether the pod is running and passes its readiness checks.
    pub ready: bool,
}

/// Future returned by [`WorkloadQuery::list`].
pub type QueryFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<WorkloadStatus>, QueryError>> + Send + 'a>>;

/// Lists the pods a workload reference currently matches.
pub trait WorkloadQuery: Send + Sync {
    /// Returns every pod matching `target`, ready or not.
    fn list<'a>(&'a self, target: &'a WorkloadRef) -> QueryFuture<'a>;
}

/// Result of a single readiness check.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReadinessOutcome {
    /// Number of pods matching the selector.
    pub matched: usize,
    /// First ready pod, if any.
    pub ready_pod: Option<String>,
}

impl ReadinessOutcome {
    /// Summarises a pod listing.
    #[must_use]
    pub fn from_statuses(statuses: &[WorkloadStatus]) -> Self {
        Self {
            matched: statuses.len(),
            ready_pod: statuses
                .iter()
                .find(|status| status.ready)
                .map(|status| status.name.clone()),
        }
    }

    /// Whether anything matched the selector.
    #[must_use]
    pub const fn found(&self) -> bool {
        self.matched > 0
    }
}

/// How waiting ended when it did not fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Readiness {
    /// A pod is ready.
    Ready {
        /// Name of the ready pod.
        pod: String,
    },
    /// The user chose not to wait for a workload that does not exist yet.
    Declined,
}

/// Polls a [`WorkloadQuery`] until a workload is ready.
pub struct ReadinessPoller<Q> {
    query: Q,
    prompt: Arc<dyn Prompt>,
    sink: Arc<dyn ProgressSink>,
    decorator: ProgressDecorator,
    poll_interval: Duration,
}

impl<Q> std::fmt::Debug for ReadinessPoller<Q> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ReadinessPoller")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl<Q: WorkloadQuery> ReadinessPoller<Q> {
    /// Creates a poller that keeps waiting without asking.
    #[must_use]
    pub fn new(query: Q, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            query,
            prompt: Arc::new(AutoAnswer(true)),
            decorator: ProgressDecorator::new(Arc::clone(&sink)),
            sink,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Replaces the prompt consulted when nothing matches the selector.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn Prompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Overrides the interval between checks.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Waits until `target` has a ready pod.
    ///
    /// The first check happens immediately. While waiting, the sink shows
    /// the number of attempts and the elapsed time. The last check happens
    /// no later than `timeout` after the first.
    ///
    /// # Errors
    ///
    /// Returns [`ReadinessError::Timeout`] when no pod became ready in time,
    /// [`ReadinessError::Cancelled`] when `cancel` fired, and
    /// [`ReadinessError::Query`] when listing pods failed.
    pub async fn wait_ready(
        &self,
        target: &WorkloadRef,
        timeout: Duration,
        cancel: &Cancellation,
    ) -> Result<Readiness, ReadinessError> {
        let started = Instant::now();
        let first = self.check(target, cancel).await?;
        if let Some(pod) = first.ready_pod {
            debug!(%target, %pod, "workload already ready");
            return Ok(Readiness::Ready { pod });
        }

        if !first.found() {
            let question = format!("Nothing matches {target} yet. Keep waiting for it?");
            let keep_waiting = tokio::select! {
                biased;
                reason = cancel.cancelled() => {
                    return Err(ReadinessError::Cancelled { target: target.to_string(), reason });
                }
                answer = self.prompt.confirm(&question) => answer,
            };
            if !keep_waiting {
                info!(%target, "user declined to wait");
                return Ok(Readiness::Declined);
            }
        }

        let start_message = format!("Waiting for {target} to become ready");
        self.decorator
            .observe(
                &start_message,
                self.poll(target, timeout, cancel, started, first),
                |result| match result {
                    Ok(pod) => (Level::Ok, format!("{target} is ready (pod '{pod}')")),
                    Err(err) => (Level::Error, err.to_string()),
                },
            )
            .await
            .map(|pod| Readiness::Ready { pod })
    }

    async fn poll(
        &self,
        target: &WorkloadRef,
        timeout: Duration,
        cancel: &Cancellation,
        started: Instant,
        mut outcome: ReadinessOutcome,
    ) -> Result<String, ReadinessError> {
        let mut attempts: u32 = 1;
        loop {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(ReadinessError::Timeout {
                    target: target.to_string(),
                    waited: elapsed,
                    attempts,
                });
            }

            self.sink.update(&format!(
                "Waiting for {target}: {} pod(s) matched, attempt {attempts}, {}s elapsed",
                outcome.matched,
                elapsed.as_secs()
            ));

            let pause = self.poll_interval.min(timeout.saturating_sub(elapsed));
            tokio::select! {
                biased;
                reason = cancel.cancelled() => {
                    return Err(ReadinessError::Cancelled { target: target.to_string(), reason });
                }
                () = sleep(pause) => {}
            }

            attempts = attempts.saturating_add(1);
            outcome = self.check(target, cancel).await?;
            if let Some(pod) = outcome.ready_pod {
                debug!(%target, %pod, attempts, "workload ready");
                return Ok(pod);
            }
        }
    }

    async fn check(
        &self,
        target: &WorkloadRef,
        cancel: &Cancellation,
    ) -> Result<ReadinessOutcome, ReadinessError> {
        let statuses = tokio::select! {
            biased;
            reason = cancel.cancelled() => {
                return Err(ReadinessError::Cancelled { target: target.to_string(), reason });
            }
            listed = self.query.list(target) => listed.map_err(|source| ReadinessError::Query {
                target: target.to_string(),
                source,
            })?,
        };
        Ok(ReadinessOutcome::from_statuses(&statuses))
    }
}
