//! Terminal renderer for progress events built on `indicatif`.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::{Level, ProgressSink};

const TICK_INTERVAL: Duration = Duration::from_millis(120);
const TICK_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "];

/// Glyphs printed in front of persisted lines, one per [`Level`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Glyphs {
    /// Shown for [`Level::Success`].
    pub success: String,
    /// Shown for [`Level::Ok`].
    pub ok: String,
    /// Shown for [`Level::Error`].
    pub error: String,
    /// Shown for [`Level::Warning`].
    pub warning: String,
    /// Shown for [`Level::Info`].
    pub info: String,
}

impl Glyphs {
    /// Glyph for `level`.
    #[must_use]
    pub fn for_level(&self, level: Level) -> &str {
        match level {
            Level::Success => &self.success,
            Level::Ok => &self.ok,
            Level::Error => &self.error,
            Level::Warning => &self.warning,
            Level::Info => &self.info,
        }
    }
}

impl Default for Glyphs {
    fn default() -> Self {
        Self {
            success: String::from("✅"),
            ok: String::from("👌"),
            error: String::from("❌"),
            warning: String::from("⚠️"),
            info: String::from("ℹ️"),
        }
    }
}

/// Animated spinner on stderr; persisted lines go to stderr, remote output
/// to stdout.
pub struct SpinnerSink {
    glyphs: Glyphs,
    active: Mutex<Option<ProgressBar>>,
}

impl SpinnerSink {
    /// Creates a sink using `glyphs` for persisted lines.
    #[must_use]
    pub const fn new(glyphs: Glyphs) -> Self {
        Self {
            glyphs,
            active: Mutex::new(None),
        }
    }

    fn take_active(&self) -> Option<ProgressBar> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl std::fmt::Debug for SpinnerSink {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SpinnerSink")
            .field("glyphs", &self.glyphs)
            .finish_non_exhaustive()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICK_FRAMES)
}

impl ProgressSink for SpinnerSink {
    fn start(&self, message: &str) {
        if let Some(previous) = self.take_active() {
            previous.finish_and_clear();
        }
        let bar = ProgressBar::new_spinner();
        bar.set_draw_target(ProgressDrawTarget::stderr());
        bar.set_style(spinner_style());
        bar.set_message(message.to_owned());
        bar.enable_steady_tick(TICK_INTERVAL);
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(bar);
    }

    fn update(&self, message: &str) {
        let guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(bar) => bar.set_message(message.to_owned()),
            None => tracing::debug!(%message, "progress update without running indicator"),
        }
    }

    fn persist(&self, level: Level, message: &str) {
        if let Some(bar) = self.take_active() {
            bar.finish_and_clear();
        }
        writeln!(io::stderr(), "{} {message}", self.glyphs.for_level(level)).ok();
    }

    fn output(&self, line: &str) {
        let guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(bar) => bar.suspend(|| {
                writeln!(io::stdout(), "{line}").ok();
            }),
            None => {
                writeln!(io::stdout(), "{line}").ok();
            }
        }
    }
}
