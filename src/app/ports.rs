//! Port traits: the boundary between the dosing core and its collaborators.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Disinfection (domain)
//! ```
//!
//! Sensor acquisition, pump relays, telemetry and configuration storage
//! live outside this crate.  They implement these traits and are handed to
//! the orchestrator at construction, so the control core never touches
//! hardware directly.

use std::rc::Rc;

use crate::config::DisinfectionConfig;
use crate::error::MailboxError;

// ───────────────────────────────────────────────────────────────
// Sensors (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Latest water chemistry samples.
pub trait SensorReader {
    /// Latest pH sample.
    fn get_ph(&mut self) -> anyhow::Result<f32>;

    /// Latest ORP sample (mV).
    fn get_orp(&mut self) -> anyhow::Result<f32>;
}

/// Downstream telemetry push of raw sensor values.
pub trait SensorWriter {
    /// Start pushing sensor values periodically.
    fn do_write(&mut self);

    /// Stop pushing.
    fn do_cancel(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Actuators (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// A dosing pump relay.  Handles are shared between the PWM unit that
/// modulates it and the orchestrator, which switches it off directly on
/// halt.
pub trait Pump {
    fn on(&self) -> anyhow::Result<()>;
    fn off(&self) -> anyhow::Result<()>;
}

/// Looks pumps up by name (`"ph"`, `"cl"`).
pub trait DeviceRegistry {
    fn get_pump(&self, name: &str) -> Option<Rc<dyn Pump>>;
}

/// Commands the orchestrator sends to a PWM unit.  Every call is a
/// message; nothing is shared.
pub trait PwmPort {
    fn set_value(&self, value: f32) -> Result<(), MailboxError>;
    fn set_period(&self, period_secs: f32) -> Result<(), MailboxError>;
    /// Start (or restart) the modulation ticks.
    fn run(&self) -> Result<(), MailboxError>;
    /// Stop the modulation ticks and pause the modulator.
    fn cancel(&self) -> Result<(), MailboxError>;
}

// ───────────────────────────────────────────────────────────────
// Telemetry (driven adapter: domain → UI / logging)
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget telemetry sink.  Implementations must not block.
pub trait Encoder {
    fn disinfection_state(&mut self, name: &str);
    fn disinfection_cl_feedback(&mut self, percent: i32);
    fn disinfection_ph_feedback(&mut self, percent: i32);
    fn disinfection_orp_setpoint(&mut self, mv: i32);
}

// ───────────────────────────────────────────────────────────────
// Configuration (driven adapter: storage → domain)
// ───────────────────────────────────────────────────────────────

/// Loads the configuration once at startup.
///
/// Implementations MUST validate before returning: invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not clamped.
pub trait ConfigPort {
    fn load(&self) -> Result<DisinfectionConfig, ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No configuration found.
    NotFound,
    /// Stored configuration could not be parsed.
    Corrupted,
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// A pump named by the controller is missing from the registry.
    UnknownDevice(&'static str),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::UnknownDevice(name) => write!(f, "unknown device '{}'", name),
        }
    }
}
