//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::cancel::Cancellation;
use crate::exec::{ExecError, ExecFuture, ExecOutput, RemoteExecutor, StderrStream};
use crate::process::{CommandFuture, CommandOutput, CommandRunner, Invocation, ProcessError, Tee};
use crate::progress::{Level, ProgressSink};
use crate::prompt::{Prompt, PromptFuture};
use crate::readiness::{QueryError, QueryFuture, WorkloadQuery, WorkloadStatus};
use crate::workload::{ExecRequest, WorkloadRef};

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// Scripted stdout is also written to the tee when one is supplied.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<Result<CommandOutput, ProcessError>>>>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        locked(&self.invocations).clone()
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        locked(&self.responses).push_back(Ok(CommandOutput {
            code,
            stdout: stdout.into().into_bytes(),
            stderr: stderr.into().into_bytes(),
        }));
    }

    /// Pushes an error returned instead of an output.
    pub fn push_error(&self, error: ProcessError) {
        locked(&self.responses).push_back(Err(error));
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a, 'w: 'a>(
        &'a self,
        invocation: &'a Invocation,
        tee: Tee<'w>,
        _cancel: &'a Cancellation,
    ) -> CommandFuture<'a> {
        locked(&self.invocations).push(invocation.clone());
        let response = locked(&self.responses)
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProcessError::Spawn {
                    program: invocation.program.clone(),
                    message: String::from("no scripted response available"),
                })
            });
        Box::pin(async move {
            if let (Ok(output), Some(writer)) = (&response, tee) {
                writer.write_all(&output.stdout).await.ok();
            }
            response
        })
    }
}

/// Event observed by a [`RecordingSink`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SinkEvent {
    /// [`ProgressSink::start`] was called.
    Start(String),
    /// [`ProgressSink::update`] was called.
    Update(String),
    /// [`ProgressSink::persist`] was called.
    Persist(Level, String),
    /// [`ProgressSink::output`] was called.
    Output(String),
}

/// Progress sink recording every event in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    /// Every event so far.
    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        locked(&self.events).clone()
    }

    /// Persisted lines only.
    #[must_use]
    pub fn persisted(&self) -> Vec<(Level, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Persist(level, message) => Some((level, message)),
                _ => None,
            })
            .collect()
    }

    /// Remote output lines only.
    #[must_use]
    pub fn outputs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Output(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    /// Updates only.
    #[must_use]
    pub fn updates(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Update(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn start(&self, message: &str) {
        locked(&self.events).push(SinkEvent::Start(message.to_owned()));
    }

    fn update(&self, message: &str) {
        locked(&self.events).push(SinkEvent::Update(message.to_owned()));
    }

    fn persist(&self, level: Level, message: &str) {
        locked(&self.events).push(SinkEvent::Persist(level, message.to_owned()));
    }

    fn output(&self, line: &str) {
        locked(&self.events).push(SinkEvent::Output(line.to_owned()));
    }
}

/// Builds a ready pod status.
#[must_use]
pub fn ready(name: &str) -> WorkloadStatus {
    WorkloadStatus {
        name: name.to_owned(),
        ready: true,
    }
}

/// Builds a pod status that is not ready yet.
#[must_use]
pub fn pending(name: &str) -> WorkloadStatus {
    WorkloadStatus {
        name: name.to_owned(),
        ready: false,
    }
}

#[derive(Debug, Default)]
struct QueryScript {
    responses: VecDeque<Result<Vec<WorkloadStatus>, QueryError>>,
    last: Vec<WorkloadStatus>,
    calls: u32,
    targets: Vec<WorkloadRef>,
}

/// Workload query answering from a FIFO script.
///
/// Once the script is exhausted the last successful listing repeats, so a
/// single pending response models a workload that never becomes ready.
#[derive(Clone, Debug, Default)]
pub struct ScriptedQuery {
    script: Arc<Mutex<QueryScript>>,
}

impl ScriptedQuery {
    /// Creates a query with an empty script; it reports no pods.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a listing.
    pub fn push(&self, statuses: Vec<WorkloadStatus>) {
        locked(&self.script).responses.push_back(Ok(statuses));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: QueryError) {
        locked(&self.script).responses.push_back(Err(error));
    }

    /// Number of listings served.
    #[must_use]
    pub fn calls(&self) -> u32 {
        locked(&self.script).calls
    }

    /// Targets queried, in order.
    #[must_use]
    pub fn targets(&self) -> Vec<WorkloadRef> {
        locked(&self.script).targets.clone()
    }
}

impl WorkloadQuery for ScriptedQuery {
    fn list<'a>(&'a self, target: &'a WorkloadRef) -> QueryFuture<'a> {
        let response = {
            let mut script = locked(&self.script);
            script.calls = script.calls.saturating_add(1);
            script.targets.push(target.clone());
            match script.responses.pop_front() {
                Some(Ok(statuses)) => {
                    script.last.clone_from(&statuses);
                    Ok(statuses)
                }
                Some(Err(err)) => Err(err),
                None => Ok(script.last.clone()),
            }
        };
        Box::pin(async move { response })
    }
}

/// Scripted result for [`ScriptedExecutor`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptedExec {
    /// The command succeeds with this stdout.
    Success(String),
    /// The command runs and exits non-zero.
    RemoteFailure {
        /// Exit status.
        exit_code: i32,
        /// Standard error text.
        stderr: String,
    },
    /// The execution channel fails.
    Transport(String),
}

/// Remote executor answering from a FIFO script and recording requests.
#[derive(Clone, Debug, Default)]
pub struct ScriptedExecutor {
    responses: Arc<Mutex<VecDeque<ScriptedExec>>>,
    requests: Arc<Mutex<Vec<ExecRequest>>>,
}

impl ScriptedExecutor {
    /// Creates an executor with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push(&self, response: ScriptedExec) {
        locked(&self.responses).push_back(response);
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ExecRequest> {
        locked(&self.requests).clone()
    }

    /// Rendered commands received so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| request.command.to_string())
            .collect()
    }
}

impl RemoteExecutor for ScriptedExecutor {
    fn run<'a>(&'a self, request: &'a ExecRequest, _cancel: &'a Cancellation) -> ExecFuture<'a> {
        locked(&self.requests).push(request.clone());
        let scripted = locked(&self.responses)
            .pop_front()
            .unwrap_or_else(|| ScriptedExec::Transport(String::from("no scripted response available")));
        let result = match scripted {
            ScriptedExec::Success(stdout) => Ok(ExecOutput {
                stdout: stdout.into_bytes(),
                stderr: StderrStream::default(),
            }),
            ScriptedExec::RemoteFailure { exit_code, stderr } => Err(ExecError::remote_failure(
                request,
                exit_code,
                StderrStream::new(stderr.into_bytes()),
            )),
            ScriptedExec::Transport(message) => {
                Err(ExecError::transport(request, message, StderrStream::default()))
            }
        };
        Box::pin(async move { result })
    }
}

/// Prompt answering from a FIFO script and recording questions.
///
/// Answers `false` once the script is exhausted.
#[derive(Clone, Debug, Default)]
pub struct ScriptedPrompt {
    answers: Arc<Mutex<VecDeque<bool>>>,
    questions: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompt {
    /// Creates a prompt that will give `answers` in order.
    #[must_use]
    pub fn with_answers(answers: &[bool]) -> Self {
        let prompt = Self::default();
        locked(&prompt.answers).extend(answers.iter().copied());
        prompt
    }

    /// Questions asked so far.
    #[must_use]
    pub fn questions(&self) -> Vec<String> {
        locked(&self.questions).clone()
    }
}

impl Prompt for ScriptedPrompt {
    fn confirm<'a>(&'a self, question: &'a str) -> PromptFuture<'a> {
        locked(&self.questions).push(question.to_owned());
        let answer = locked(&self.answers).pop_front().unwrap_or(false);
        Box::pin(async move { answer })
    }
}

/// Produces a minimal JSON payload matching `kubectl get pods -o json`.
///
/// Each entry is `(name, phase, ready)`.
#[must_use]
pub fn json_pods(pods: &[(&str, &str, bool)]) -> String {
    let items = pods
        .iter()
        .map(|(name, phase, ready)| {
            let status = if *ready { "True" } else { "False" };
            format!(
                "{{\"metadata\":{{\"name\":\"{name}\"}},\"status\":{{\"phase\":\"{phase}\",\
                 \"conditions\":[{{\"type\":\"Ready\",\"status\":\"{status}\"}}]}}}}"
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"apiVersion\":\"v1\",\"kind\":\"List\",\"items\":[{items}]}}")
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push((key.to_string(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
