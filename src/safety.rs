//! Pump security window.
//!
//! Tracks how long an actuator has been on within the current day and
//! reports when the configured maximum is reached.  The PWM modulator
//! consults it every tick:
//!
//! 1. While the pump is on, elapsed time since the previous update is
//!    added to the accumulator.
//! 2. While the pump is off, updates only move the baseline forward.
//! 3. Once the accumulator reaches the limit, the modulator refuses to
//!    switch on and forces the pump off if it is still running.
//! 4. At every day boundary the accumulator resets and dosing may resume.
//!
//! Pausing the modulator (leaving the state that drives it) clears the
//! window completely.

use log::{error, info};

/// Accumulated on-time versus a daily maximum.  Times are seconds on the
/// caller's monotonic clock.
#[derive(Debug, Clone)]
pub struct SecurityWindow {
    limit_secs: f64,
    accumulated_secs: f64,
    /// Time of the previous update; `None` after a clear.
    last: Option<f64>,
    /// Latched so the trip is logged once.
    tripped: bool,
}

impl SecurityWindow {
    pub fn new(limit_secs: f64) -> Self {
        Self {
            limit_secs,
            accumulated_secs: 0.0,
            last: None,
            tripped: false,
        }
    }

    /// Record the passage of time up to `now`.  `running` says whether the
    /// actuator was on during the span.
    pub fn update(&mut self, now: f64, running: bool) {
        if let (Some(last), true) = (self.last, running) {
            self.accumulated_secs += (now - last).max(0.0);
        }
        self.last = Some(now);

        if self.exceeded() && !self.tripped {
            error!(
                "SECURITY WINDOW EXCEEDED: {:.0}s on (max {:.0}s)",
                self.accumulated_secs, self.limit_secs
            );
            self.tripped = true;
        }
    }

    /// True once the accumulated on-time reached the limit.
    pub fn exceeded(&self) -> bool {
        self.accumulated_secs >= self.limit_secs
    }

    pub fn accumulated_secs(&self) -> f64 {
        self.accumulated_secs
    }

    /// Day boundary: forget the accumulated time, keep the baseline.
    pub fn reset(&mut self) {
        if self.tripped {
            info!("SECURITY WINDOW CLEARED after daily reset");
        }
        self.accumulated_secs = 0.0;
        self.tripped = false;
    }

    /// Pause: forget everything, including the baseline.
    pub fn clear(&mut self) {
        self.reset();
        self.last = None;
    }
}
