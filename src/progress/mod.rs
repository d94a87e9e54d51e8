//! Progress reporting and the start/success/failure decoration of work.
//!
//! Components receive an explicit [`ProgressSink`] instead of reaching for a
//! process-wide logger. The [`ProgressDecorator`] drives the sink through a
//! small state machine around a unit of work:
//!
//! ```text
//! Idle -> Running -> Succeeded
//!                 \-> Failed
//! ```
//!
//! Exactly one terminal transition happens per decoration, including when the
//! wrapped future panics or is dropped part-way through.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

mod spinner;

pub use spinner::{Glyphs, SpinnerSink};

/// Severity attached to a persisted progress line.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Level {
    /// The operation completed as intended.
    Success,
    /// The operation was already satisfied.
    Ok,
    /// The operation failed.
    Error,
    /// Something needs the user's attention.
    Warning,
    /// Informational note.
    Info,
}

/// Receives progress events. Implementations decide how (or whether) to
/// render them.
pub trait ProgressSink: Send + Sync {
    /// Starts an animated indicator showing `message`.
    fn start(&self, message: &str);

    /// Replaces the text of the running indicator.
    fn update(&self, message: &str);

    /// Stops any running indicator and persists `message` with a glyph for
    /// `level`.
    fn persist(&self, level: Level, message: &str);

    /// Emits a raw line of remote output without disturbing the indicator.
    fn output(&self, line: &str);
}

/// Sink that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentSink;

impl ProgressSink for SilentSink {
    fn start(&self, _message: &str) {}

    fn update(&self, _message: &str) {}

    fn persist(&self, _level: Level, _message: &str) {}

    fn output(&self, _line: &str) {}
}

/// Observable state of a decoration.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ProgressState {
    /// No decoration has started.
    #[default]
    Idle,
    /// The wrapped work is in flight.
    Running,
    /// The wrapped work finished successfully.
    Succeeded,
    /// The wrapped work failed, panicked or was abandoned.
    Failed,
}

impl ProgressState {
    /// Returns `true` for `Succeeded` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Wraps work with a visible start/success/failure indicator.
#[derive(Clone)]
pub struct ProgressDecorator {
    sink: Arc<dyn ProgressSink>,
    state: Arc<Mutex<ProgressState>>,
}

impl std::fmt::Debug for ProgressDecorator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ProgressDecorator")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ProgressDecorator {
    /// Creates a decorator reporting to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(ProgressState::Idle)),
        }
    }

    /// State of the most recent decoration.
    #[must_use]
    pub fn state(&self) -> ProgressState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `work` behind an indicator showing `start`.
    ///
    /// On success `success` is persisted; on failure the error's message is.
    /// The result of `work` is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns whatever error `work` returns.
    pub async fn decorate<T, E, F>(&self, start: &str, success: &str, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.observe(start, work, |result| match result {
            Ok(_) => (Level::Success, success.to_owned()),
            Err(err) => (Level::Error, err.to_string()),
        })
        .await
    }

    /// Runs `work` behind an indicator showing `start`, then persists the
    /// level and message it returns. Never fails: the outcome is already
    /// encoded in the returned level.
    pub async fn decorate_with_outcome<F>(&self, start: &str, work: F)
    where
        F: Future<Output = (Level, String)>,
    {
        self.observe(start, work, |(level, message)| (*level, message.clone()))
            .await;
    }

    /// Runs `work` behind an indicator showing `start` and lets `describe`
    /// pick the persisted level and message from its output.
    ///
    /// [`Level::Error`] ends the decoration as [`ProgressState::Failed`];
    /// any other level as [`ProgressState::Succeeded`].
    pub async fn observe<T, F, D>(&self, start: &str, work: F, describe: D) -> T
    where
        F: Future<Output = T>,
        D: FnOnce(&T) -> (Level, String),
    {
        let mut indicator = Indicator::start(self, start);
        let value = work.await;
        let (level, message) = describe(&value);
        indicator.finish(level, &message);
        value
    }

    fn set_state(&self, next: ProgressState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

/// Running indicator; reaching a terminal state is guaranteed by `Drop`.
struct Indicator<'a> {
    decorator: &'a ProgressDecorator,
    start_message: String,
    finished: bool,
}

impl<'a> Indicator<'a> {
    fn start(decorator: &'a ProgressDecorator, message: &str) -> Self {
        decorator.set_state(ProgressState::Running);
        decorator.sink.start(message);
        Self {
            decorator,
            start_message: message.to_owned(),
            finished: false,
        }
    }

    fn finish(&mut self, level: Level, message: &str) {
        if self.finished {
            return;
        }
        self.finished = true;
        let state = if level == Level::Error {
            ProgressState::Failed
        } else {
            ProgressState::Succeeded
        };
        self.decorator.set_state(state);
        self.decorator.sink.persist(level, message);
    }
}

impl Drop for Indicator<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let message = format!("{}: interrupted", self.start_message);
            self.finish(Level::Error, &message);
        }
    }
}
