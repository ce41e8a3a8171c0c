//! Cooperative cancellation, deadlines and timed computation.
//!
//! Every blocking call in the engines receives a [`Control`]: a cancel token
//! plus a wall-clock deadline. Nested computations derive child controls, so
//! cancelling an outer search reaches every evaluation it started, while a
//! timed-out inner evaluation is cancelled without touching its caller.
//! Deadlines compose by `min`: a child never outlives its parent's deadline.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on a single blocking wait before flags are re-checked.
pub const POLL_SLICE: Duration = Duration::from_millis(10);

/// A terminal cancellation flag, observable by every clone and child.
///
/// Cancelling a child does not cancel its parent.
#[derive(Debug, Clone)]
pub struct CancelToken {
    own: Arc<AtomicBool>,
    observed: Vec<Arc<AtomicBool>>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            own: Arc::new(AtomicBool::new(false)),
            observed: Vec::new(),
        }
    }

    /// Set the flag. Idempotent and irreversible.
    pub fn cancel(&self) {
        self.own.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.own.load(Ordering::SeqCst) || self.observed.iter().any(|f| f.load(Ordering::SeqCst))
    }

    /// A token canceled whenever `self` is, but cancelable on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        let mut observed = self.observed.clone();
        observed.push(Arc::clone(&self.own));
        Self {
            own: Arc::new(AtomicBool::new(false)),
            observed,
        }
    }

    /// A child of `self` that additionally observes `other`.
    #[must_use]
    pub fn joined(&self, other: &CancelToken) -> Self {
        let mut token = self.child();
        token.observed.push(Arc::clone(&other.own));
        token.observed.extend(other.observed.iter().cloned());
        token
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// An optional wall-clock deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// `timeout` from now. Durations too large to represent mean no deadline.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    /// `after(timeout)` when a timeout is configured, otherwise `none()`.
    #[must_use]
    pub fn within(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::none, Self::after)
    }

    /// The earlier of two deadlines.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Self(Some(a.min(b))),
            (Some(a), None) | (None, Some(a)) => Self(Some(a)),
            (None, None) => Self(None),
        }
    }

    #[must_use]
    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Time left, saturating at zero. `None` when no deadline is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

/// Why a controlled computation stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ControlSignal {
    #[error("computation canceled")]
    Canceled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Cancel token plus deadline, handed to every blocking computation.
#[derive(Debug, Clone, Default)]
pub struct Control {
    cancel: CancelToken,
    deadline: Deadline,
}

impl Control {
    #[must_use]
    pub fn new(cancel: CancelToken, deadline: Deadline) -> Self {
        Self { cancel, deadline }
    }

    /// Fresh token, no deadline.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    #[must_use]
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// Cancel this control and every child derived from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A child control whose deadline is the earlier of ours and `deadline`.
    #[must_use]
    pub fn child(&self, deadline: Deadline) -> Self {
        Self {
            cancel: self.cancel.child(),
            deadline: self.deadline.min(deadline),
        }
    }

    /// Like [`Control::child`], but also canceled when `other` is.
    #[must_use]
    pub fn joined(&self, other: &CancelToken) -> Self {
        Self {
            cancel: self.cancel.joined(other),
            deadline: self.deadline,
        }
    }

    /// # Errors
    ///
    /// [`ControlSignal::Canceled`] takes precedence over
    /// [`ControlSignal::DeadlineExceeded`].
    pub fn check(&self) -> Result<(), ControlSignal> {
        if self.cancel.is_canceled() {
            return Err(ControlSignal::Canceled);
        }
        if self.deadline.is_expired() {
            return Err(ControlSignal::DeadlineExceeded);
        }
        Ok(())
    }

    /// Sleep for `duration`, waking early only on cancellation.
    ///
    /// # Errors
    ///
    /// [`ControlSignal::Canceled`] if the token is set before or during the sleep.
    pub fn sleep(&self, duration: Duration) -> Result<(), ControlSignal> {
        let until = Instant::now() + duration;
        loop {
            if self.cancel.is_canceled() {
                return Err(ControlSignal::Canceled);
            }
            let left = until.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(());
            }
            thread::sleep(left.min(POLL_SLICE));
        }
    }
}

/// The time granted to one evaluation and the hard interruption point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    /// What the evaluation is told it may use.
    pub granted: Option<Duration>,
    /// When the evaluation is forcibly interrupted.
    pub interrupt_after: Option<Duration>,
}

impl TimeBudget {
    /// `granted = min(node_timeout, remaining(deadline)) - margin`,
    /// `interrupt_after = granted + slack`.
    #[must_use]
    pub fn compute(
        node_timeout: Option<Duration>,
        deadline: Deadline,
        margin: Duration,
        slack: Duration,
    ) -> Self {
        let limit = match (node_timeout, deadline.remaining()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        };
        let granted = limit.map(|l| l.saturating_sub(margin));
        Self {
            granted,
            interrupt_after: granted.map(|g| g + slack),
        }
    }
}

/// Failure modes of [`run_with_timeout`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimedRunError {
    #[error("timed computation canceled")]
    Canceled,
    #[error("timed computation exceeded {after:?}")]
    TimedOut { after: Duration },
    #[error("timed computation panicked: {detail}")]
    Panicked { detail: String },
    #[error("could not start timed computation: {detail}")]
    Spawn { detail: String },
}

/// Run `f` under a hard interruption timeout.
///
/// Without a timeout `f` runs inline. With one, it runs on a helper thread
/// while the caller waits; when the timeout passes (or the caller's control is
/// canceled) the child control handed to `f` is canceled and the caller
/// returns immediately. `f` is expected to observe its control and wind down.
/// Panics inside `f` are contained in both modes.
///
/// # Errors
///
/// See [`TimedRunError`].
pub fn run_with_timeout<R, F>(
    timeout: Option<Duration>,
    ctl: &Control,
    f: F,
) -> Result<R, TimedRunError>
where
    R: Send + 'static,
    F: FnOnce(&Control) -> R + Send + 'static,
{
    let child = ctl.child(Deadline::within(timeout));
    let Some(limit) = timeout else {
        return catch_unwind(AssertUnwindSafe(|| f(&child))).map_err(|p| {
            TimedRunError::Panicked {
                detail: panic_detail(p.as_ref()),
            }
        });
    };

    on_helper_thread(Some(limit), ctl, child, f)
}

/// Run `f` on a helper thread and return as soon as `ctl` is canceled or its
/// deadline passes, whether or not `f` ever looks at its control.
///
/// For calls into code that cannot observe a [`Control`]. An abandoned `f`
/// keeps running detached until it returns; its result is dropped.
///
/// # Errors
///
/// [`TimedRunError::Canceled`] on cancellation, [`TimedRunError::TimedOut`]
/// when the deadline of `ctl` passes, and the remaining variants as for
/// [`run_with_timeout`].
pub fn run_interruptible<R, F>(ctl: &Control, f: F) -> Result<R, TimedRunError>
where
    R: Send + 'static,
    F: FnOnce(&Control) -> R + Send + 'static,
{
    let child = ctl.child(Deadline::none());
    on_helper_thread(ctl.deadline().remaining(), ctl, child, f)
}

fn on_helper_thread<R, F>(limit: Option<Duration>, ctl: &Control, child: Control, f: F) -> Result<R, TimedRunError>
where
    R: Send + 'static,
    F: FnOnce(&Control) -> R + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let worker_ctl = child.clone();
    thread::Builder::new()
        .name("arbor-timed".into())
        .spawn(move || {
            let out = catch_unwind(AssertUnwindSafe(|| f(&worker_ctl)));
            // The receiver is gone once the caller gave up; nothing to do.
            let _ = tx.send(out);
        })
        .map_err(|e| TimedRunError::Spawn {
            detail: e.to_string(),
        })?;

    let started = Instant::now();
    loop {
        if ctl.is_canceled() {
            child.cancel();
            return Err(TimedRunError::Canceled);
        }
        let elapsed = started.elapsed();
        if let Some(limit) = limit {
            if elapsed >= limit {
                child.cancel();
                tracing::debug!(?limit, "timed computation interrupted");
                return Err(TimedRunError::TimedOut { after: limit });
            }
        }
        let slice = limit.map_or(POLL_SLICE, |limit| (limit - elapsed).min(POLL_SLICE));
        match rx.recv_timeout(slice) {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(payload)) => {
                return Err(TimedRunError::Panicked {
                    detail: panic_detail(payload.as_ref()),
                })
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(TimedRunError::Panicked {
                    detail: "timed computation exited without a result".into(),
                })
            }
        }
    }
}

/// Best-effort message extraction from a panic payload.
#[must_use]
pub fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
