//! Per-unit task scheduler.
//!
//! Every control unit owns exactly one [`TimerSlot`].  Arming the slot
//! replaces whatever was pending, so a unit never has more than one
//! delayed or periodic task outstanding:
//!
//! ```text
//!   schedule_once(d, msg) ──▶ ┌───────────────┐ ── deadline ──▶ msg handled
//!                             │  TimerSlot    │    by the unit's own loop
//!   cancel()  ──────────────▶ │  (0 or 1 msg) │
//!                             └───────────────┘
//! ```
//!
//! Periodic work is not a fixed-rate timer.  A task body runs, and only
//! when it finished successfully does [`repeat`] arm the next period, so
//! two invocations can never overlap.  A body that returns
//! [`TaskError::StopRepeat`] is simply not re-armed; any other error is
//! passed back to the unit, which treats it as fatal.

use std::time::{Duration, Instant};

use log::debug;

use crate::actor::Context;
use crate::error::{TaskError, TaskResult};

// ═══════════════════════════════════════════════════════════════
//  Timer slot
// ═══════════════════════════════════════════════════════════════

#[derive(Debug)]
struct Pending<M> {
    deadline: Instant,
    message: M,
}

/// Single cancellable timer.  Holds the message to deliver on expiry.
#[derive(Debug)]
pub struct TimerSlot<M> {
    pending: Option<Pending<M>>,
}

impl<M> TimerSlot<M> {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Arm the slot to deliver `message` after `delay`.  Supersedes any
    /// task already pending.
    pub fn arm(&mut self, delay: Duration, message: M) {
        if self.pending.is_some() {
            debug!("Scheduler: pending task superseded");
        }
        self.pending = Some(Pending {
            deadline: Instant::now() + delay,
            message,
        });
    }

    /// Drop the pending task, if any.  Idempotent.  Returns whether a task
    /// was actually cancelled.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Take the message if its deadline has passed at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<M> {
        match &self.pending {
            Some(p) if p.deadline <= now => self.pending.take().map(|p| p.message),
            _ => None,
        }
    }
}

impl<M> Default for TimerSlot<M> {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Periodic helper
// ═══════════════════════════════════════════════════════════════

/// Close one invocation of a periodic task.
///
/// * `Ok`: arm `next` after `every`.
/// * `StopRepeat`: do not re-arm; reported as success.
/// * anything else: returned unchanged (fatal for the unit).
pub fn repeat<M>(
    ctx: &mut dyn Context<M>,
    every: Duration,
    next: M,
    outcome: TaskResult,
) -> TaskResult {
    match outcome {
        Ok(()) => {
            ctx.schedule_once(every, next);
            Ok(())
        }
        Err(TaskError::StopRepeat) => Ok(()),
        Err(e) => Err(e),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
