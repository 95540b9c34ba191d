//! Time-proportioned (slow PWM) dosing pump driver.
//!
//! A dosing pump is a relay: it is either on or off.  The modulator turns
//! a duty fraction into on/off spans inside a fixed period, ticked about
//! once a second by the owning unit.
//!
//! ## Safety contract
//!
//! - No span shorter than `min_runtime`: small duties are raised to
//!   `min_runtime`, duties close to the full period become fully on.
//! - Fully on (`duty_on == period`) and fully off (`duty_off == period`)
//!   are sentinels and never toggle.
//! - The [`SecurityWindow`] caps the daily on-time.  Once exceeded the
//!   pump is forced off, even when commanded fully on, and stays off
//!   until the daily reset.
//! - Pausing switches the pump off.

use std::rc::Rc;
use std::time::Instant;

use anyhow::Context as _;
use heapless::String;
use log::{debug, error, info};

use crate::actor::{Actor, Address, Context, MAILBOX_DEPTH};
use crate::app::ports::{Pump, PwmPort};
use crate::error::{MailboxError, TaskResult};
use crate::safety::SecurityWindow;
use crate::scheduler::repeat;

/// Security counters reset every 24 h.
const DAY_SECS: f64 = 86_400.0;

/// Relay transition requested by the modulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

/// On/off split (seconds) for `value` over `period`, with the minimum
/// run time applied.
pub fn duty_split(value: f32, period: f32, min_runtime: f32) -> (f32, f32) {
    let mut duty_on = value * period;
    if duty_on != 0.0 && duty_on < min_runtime {
        duty_on = min_runtime;
    } else if duty_on > period - min_runtime {
        duty_on = period;
    }
    (duty_on, period - duty_on)
}

// ═══════════════════════════════════════════════════════════════
//  Modulator core (pure, clock supplied by the caller)
// ═══════════════════════════════════════════════════════════════

pub struct PwmModulator {
    name: String<16>,
    period: f32,
    value: f32,
    min_runtime: f32,
    /// Previous tick; `None` right after construction or a pause.
    last: Option<f64>,
    /// Time spent in the current on/off phase, within `[0, period]`.
    duration: f64,
    on: bool,
    security: SecurityWindow,
    security_reset_at: f64,
}

impl PwmModulator {
    /// `now` is the caller's monotonic clock in seconds; the first daily
    /// security reset happens one day later.
    pub fn new(name: &str, period: f32, min_runtime: f32, security_secs: f64, now: f64) -> Self {
        let mut short = String::new();
        for c in name.chars() {
            if short.push(c).is_err() {
                break;
            }
        }
        Self {
            name: short,
            period,
            value: 0.0,
            min_runtime,
            last: None,
            duration: 0.0,
            on: false,
            security: SecurityWindow::new(security_secs),
            security_reset_at: now + DAY_SECS,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Duty fraction; clamped into `[0, 1]`, NaN reads as 0.
    pub fn set_value(&mut self, value: f32) {
        self.value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    }

    pub fn period(&self) -> f32 {
        self.period
    }

    pub fn set_period(&mut self, period: f32) {
        self.period = period;
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn security(&self) -> &SecurityWindow {
        &self.security
    }

    /// Advance to `now`.  Returns the relay transition to apply, if any.
    pub fn step(&mut self, now: f64) -> Option<Switch> {
        let Some(last) = self.last else {
            // First tick after start or pause: baseline only.
            self.last = Some(now);
            self.roll_day(now);
            return None;
        };

        let period = f64::from(self.period);
        self.duration = (self.duration + (now - last)).clamp(0.0, period);

        let (duty_on, duty_off) = duty_split(self.value, self.period, self.min_runtime);
        if (now as i64) % 10 == 0 {
            debug!(
                "{} duty (on/off): {:.1}/{:.1} state: {} duration: {:.1}",
                self.name, duty_on, duty_off, self.on as u8, self.duration
            );
        }

        let switch = if self.on {
            self.security.update(now, true);
            if self.security.exceeded()
                || (self.duration >= f64::from(duty_on) && duty_on != self.period)
            {
                Some(Switch::Off)
            } else {
                None
            }
        } else {
            self.security.update(now, false);
            let security_ok = !self.security.exceeded();
            if self.duration >= f64::from(duty_off) && duty_off != self.period && security_ok {
                Some(Switch::On)
            } else {
                None
            }
        };

        if let Some(s) = switch {
            self.duration = 0.0;
            self.on = s == Switch::On;
        }

        self.roll_day(now);
        self.last = Some(now);
        switch
    }

    /// Leave the modulating state: forget the baseline and the security
    /// window, keep `value`.  Returns `Off` if the pump was on.
    pub fn pause(&mut self) -> Option<Switch> {
        self.security.clear();
        self.last = None;
        if self.on {
            self.on = false;
            self.duration = 0.0;
            Some(Switch::Off)
        } else {
            None
        }
    }

    fn roll_day(&mut self, now: f64) {
        if now > self.security_reset_at {
            self.security.reset();
            self.security_reset_at += DAY_SECS;
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  PWM unit
// ═══════════════════════════════════════════════════════════════

/// Messages accepted by a [`PwmUnit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PwmCommand {
    /// Start ticking (restarts if already running).
    Run,
    /// Periodic tick, re-armed by the unit itself.
    Tick,
    SetValue(f32),
    SetPeriod(f32),
    /// Stop ticking and pause the modulator.
    Cancel,
}

/// Control unit owning one modulator and its pump.
pub struct PwmUnit {
    modulator: PwmModulator,
    pump: Rc<dyn Pump>,
    tick_interval: std::time::Duration,
    epoch: Instant,
}

impl PwmUnit {
    pub fn new(
        name: &str,
        pump: Rc<dyn Pump>,
        period: f32,
        min_runtime: f32,
        security_secs: f64,
        tick_interval: std::time::Duration,
    ) -> Self {
        Self {
            modulator: PwmModulator::new(name, period, min_runtime, security_secs, 0.0),
            pump,
            tick_interval,
            epoch: Instant::now(),
        }
    }

    pub fn modulator(&self) -> &PwmModulator {
        &self.modulator
    }

    fn apply(&self, switch: Option<Switch>) -> anyhow::Result<()> {
        match switch {
            Some(Switch::On) => self
                .pump
                .on()
                .with_context(|| format!("{}: pump on failed", self.modulator.name())),
            Some(Switch::Off) => self
                .pump
                .off()
                .with_context(|| format!("{}: pump off failed", self.modulator.name())),
            None => Ok(()),
        }
    }

    fn tick(&mut self) -> TaskResult {
        let now = self.epoch.elapsed().as_secs_f64();
        let switch = self.modulator.step(now);
        self.apply(switch)?;
        Ok(())
    }
}

impl Actor for PwmUnit {
    type Message = PwmCommand;
    const BATCH: usize = MAILBOX_DEPTH;

    fn name(&self) -> &str {
        self.modulator.name()
    }

    fn handle(&mut self, message: PwmCommand, ctx: &mut dyn Context<PwmCommand>) -> TaskResult {
        match message {
            PwmCommand::Run | PwmCommand::Tick => {
                if message == PwmCommand::Run {
                    info!("{}: modulation started", self.modulator.name());
                }
                let outcome = self.tick();
                repeat(ctx, self.tick_interval, PwmCommand::Tick, outcome)
            }
            PwmCommand::SetValue(v) => {
                self.modulator.set_value(v);
                Ok(())
            }
            PwmCommand::SetPeriod(p) => {
                self.modulator.set_period(p);
                Ok(())
            }
            PwmCommand::Cancel => {
                ctx.cancel();
                let switch = self.modulator.pause();
                self.apply(switch)?;
                Ok(())
            }
        }
    }

    fn on_stop(&mut self) {
        self.modulator.pause();
        if let Err(e) = self.pump.off() {
            error!("{}: pump off on stop failed: {e:#}", self.modulator.name());
        }
    }
}

impl PwmPort for Address<PwmCommand> {
    fn set_value(&self, value: f32) -> Result<(), MailboxError> {
        self.send(PwmCommand::SetValue(value))
    }

    fn set_period(&self, period_secs: f32) -> Result<(), MailboxError> {
        self.send(PwmCommand::SetPeriod(period_secs))
    }

    fn run(&self) -> Result<(), MailboxError> {
        self.send(PwmCommand::Run)
    }

    fn cancel(&self) -> Result<(), MailboxError> {
        self.send(PwmCommand::Cancel)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
