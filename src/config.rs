//! Disinfection configuration parameters
//!
//! All tunable constants for the dosing controller.  Read once at
//! construction and passed by value into each component; there is no
//! hot reload.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::control::curves::ChlorineLevel;

/// Core disinfection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisinfectionConfig {
    // --- Sequencing ---
    /// Pre-soak wait before closed-loop dosing starts (milliseconds)
    pub start_delay_ms: u64,
    /// Time spent treating between two adjustments (milliseconds)
    pub waiting_delay_ms: u64,
    /// Refresh period of the constant-dose computation (milliseconds)
    pub state_refresh_interval_ms: u64,

    // --- PWM ---
    /// Modulator tick interval (milliseconds)
    pub pwm_tick_interval_ms: u64,
    /// pH pump PWM period (seconds)
    pub ph_pwm_period_secs: f32,
    /// Chlorine pump PWM period during closed-loop dosing (seconds)
    pub cl_pwm_period_secs: f32,
    /// Chlorine pump PWM period during constant dosing (seconds)
    pub cl_pwm_period_constant_secs: f32,
    /// Shortest on/off span the modulator will produce (seconds)
    pub pwm_min_runtime_secs: f32,

    // --- Safety ---
    /// Maximum accumulated pump on-time per day (hours)
    pub security_duration_hours: u32,

    // --- Controllers ---
    /// Target pH
    pub ph_setpoint: f32,
    /// pH proportional gain; stored negated ("pH minus" chemicals)
    pub ph_pterm: f32,
    /// Initial ORP setpoint (mV), replaced by the curve on first adjust
    pub orp_setpoint: f32,
    /// ORP proportional gain
    pub orp_pterm: f32,
    /// ORP error scale (mV to fraction)
    pub orp_scale: f32,
    /// Constant chlorine dose (percent of the constant period)
    pub cl_constant_percent: f32,
    /// Free-chlorine level selecting the ORP curve
    pub free_chlorine: ChlorineLevel,

    // --- Administration ---
    /// Administratively disabled: `run` is refused from `halt`
    pub disabled: bool,
}

impl Default for DisinfectionConfig {
    fn default() -> Self {
        Self {
            // Sequencing
            start_delay_ms: 60_000,     // 1 min
            waiting_delay_ms: 600_000,  // 10 min
            state_refresh_interval_ms: 10_000,

            // PWM
            pwm_tick_interval_ms: 1_000, // 1 Hz
            ph_pwm_period_secs: 120.0,
            cl_pwm_period_secs: 120.0,
            cl_pwm_period_constant_secs: 3_600.0,
            pwm_min_runtime_secs: 3.0,

            // Safety
            security_duration_hours: 2,

            // Controllers
            ph_setpoint: 7.0,
            ph_pterm: 1.0,
            orp_setpoint: 700.0,
            orp_pterm: 1.0,
            orp_scale: 0.005,
            cl_constant_percent: 0.5,
            free_chlorine: ChlorineLevel::Low,

            disabled: false,
        }
    }
}

impl DisinfectionConfig {
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn waiting_delay(&self) -> Duration {
        Duration::from_millis(self.waiting_delay_ms)
    }

    pub fn state_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.state_refresh_interval_ms)
    }

    pub fn pwm_tick_interval(&self) -> Duration {
        Duration::from_millis(self.pwm_tick_interval_ms)
    }

    /// Security window length in seconds.
    pub fn security_duration_secs(&self) -> f64 {
        f64::from(self.security_duration_hours) * 3600.0
    }

    /// Reject values that would break the modulator or the sequencing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            self.ph_pwm_period_secs,
            self.cl_pwm_period_secs,
            self.cl_pwm_period_constant_secs,
        ];
        if periods.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(ConfigError::ValidationFailed("PWM periods must be positive"));
        }
        if !(self.pwm_min_runtime_secs >= 0.0
            && periods.iter().all(|p| self.pwm_min_runtime_secs < p / 2.0))
        {
            return Err(ConfigError::ValidationFailed(
                "pwm_min_runtime_secs must be below half of every PWM period",
            ));
        }
        if self.security_duration_hours == 0 {
            return Err(ConfigError::ValidationFailed(
                "security_duration_hours must be non-zero",
            ));
        }
        if self.pwm_tick_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "pwm_tick_interval_ms must be non-zero",
            ));
        }
        if !(0.0..=100.0).contains(&self.cl_constant_percent) {
            return Err(ConfigError::ValidationFailed(
                "cl_constant_percent must be within 0-100",
            ));
        }
        Ok(())
    }
}
