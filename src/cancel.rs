//! Cancellation and deadline propagation for blocking operations.
//!
//! Every operation that may suspend (readiness polling, remote execution,
//! console draining, chart installation) accepts a [`Cancellation`]. A
//! cancellation fires either when its [`CancelHandle`] is triggered or when
//! its deadline passes, whichever happens first.

use std::fmt;
use std::future::pending;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

/// Why a [`Cancellation`] fired.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CancelReason {
    /// The owning handle requested cancellation.
    Cancelled,
    /// The deadline attached to the signal elapsed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => formatter.write_str("cancelled"),
            Self::DeadlineExceeded => formatter.write_str("deadline exceeded"),
        }
    }
}

/// Triggers every [`Cancellation`] derived from it.
///
/// Dropping the handle does not cancel anything; derived signals simply never
/// fire through the handle afterwards.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Fires the cancellation.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Cloneable cancellation signal with an optional deadline.
#[derive(Clone, Debug)]
pub struct Cancellation {
    signal: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Creates a linked handle and signal.
#[must_use]
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (sender, signal) = watch::channel(false);
    (
        CancelHandle { sender },
        Cancellation {
            signal,
            deadline: None,
        },
    )
}

impl Cancellation {
    /// Returns a signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_handle, signal) = cancellation();
        signal
    }

    /// Derives a signal that additionally fires once `timeout` has elapsed.
    ///
    /// An existing, earlier deadline is preserved.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        };
        Self {
            signal: self.signal.clone(),
            deadline: Some(deadline),
        }
    }

    /// Returns the deadline attached to this signal, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Reports whether the signal has already fired, without waiting.
    #[must_use]
    pub fn fired(&self) -> Option<CancelReason> {
        if *self.signal.borrow() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the signal fires.
    ///
    /// This future is cancel safe and may be raced in `tokio::select!`.
    pub async fn cancelled(&self) -> CancelReason {
        let mut signal = self.signal.clone();
        let flagged = async move {
            let observed = signal.wait_for(|cancelled| *cancelled).await.is_ok();
            if !observed {
                pending::<()>().await;
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = flagged => CancelReason::Cancelled,
                    () = sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            }
            None => {
                flagged.await;
                CancelReason::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn handle_fires_derived_signals() {
        let (handle, signal) = cancellation();
        let derived = signal.with_timeout(Duration::from_secs(60));
        assert_eq!(derived.fired(), None);

        handle.cancel();

        assert_eq!(signal.cancelled().await, CancelReason::Cancelled);
        assert_eq!(derived.fired(), Some(CancelReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_without_handle() {
        let signal = Cancellation::never().with_timeout(Duration::from_secs(3));
        let started = Instant::now();

        assert_eq!(signal.cancelled().await, CancelReason::DeadlineExceeded);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_deadline_is_kept() {
        let outer = Cancellation::never().with_timeout(Duration::from_secs(2));
        let inner = outer.with_timeout(Duration::from_secs(10));
        assert_eq!(inner.deadline(), outer.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_never_fires() {
        let signal = Cancellation::never();
        let outcome =
            tokio::time::timeout(Duration::from_secs(5), signal.cancelled()).await;
        assert!(outcome.is_err(), "signal without handle must stay pending");
    }
}
