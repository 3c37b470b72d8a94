//! Self-rescheduling timers for the worker loop.

use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Whether a timer keeps rescheduling itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerPolicy {
    /// Reschedule after every firing
    Persistent,
    /// Reschedule only while the predicate given to `fire` holds;
    /// otherwise lapse until re-armed
    WhileActive,
}

/// One-shot timer that decides on each firing whether to go again
#[derive(Debug)]
pub(crate) struct RearmTimer {
    interval: Duration,
    policy: TimerPolicy,
    deadline: Option<Instant>,
}

impl RearmTimer {
    /// Create a timer that is not armed yet.
    pub(crate) fn new(interval: Duration, policy: TimerPolicy) -> Self {
        Self {
            interval,
            policy,
            deadline: None,
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Fire as soon as possible, unless a deadline is already pending.
    pub(crate) fn arm_now(&mut self) {
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now());
        }
    }

    /// Resolve at the deadline; never resolves while lapsed.
    pub(crate) async fn wait(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Handle a firing.
    ///
    /// `active` is only consulted for [`TimerPolicy::WhileActive`]. Returns
    /// whether the timer's work should run; in that case the next deadline
    /// is one interval from now, otherwise the timer lapses.
    pub(crate) fn fire(&mut self, active: impl FnOnce() -> bool) -> bool {
        let run = match self.policy {
            TimerPolicy::Persistent => true,
            TimerPolicy::WhileActive => active(),
        };
        self.deadline = run.then(|| Instant::now() + self.interval);
        run
    }
}
