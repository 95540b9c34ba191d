//! Proportional controller for dosing feedback
//!
//! Maps the error between a setpoint and the latest measurement to a
//! dosing fraction in `[0, 1]`.  No integral or derivative terms: the
//! dosing loop re-samples every treating period, so the plant (a pool)
//! integrates on its own.

/// P-only controller.  Pure function of its four fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PController {
    pub setpoint: f32,
    pub current: f32,
    /// Proportional gain.  Negative for "minus" chemicals (pH reducer).
    pub pterm: f32,
    scale: f32,
}

impl PController {
    pub fn new(pterm: f32, scale: f32) -> Self {
        Self {
            setpoint: 0.0,
            current: 0.0,
            pterm,
            scale,
        }
    }

    /// `clamp(pterm * scale * (setpoint - current), 0, 1)`
    pub fn compute(&self) -> f32 {
        let error = self.setpoint - self.current;
        let output = self.pterm * self.scale * error;
        // NaN inputs must not leak a NaN duty to the modulator.
        if output.is_nan() {
            return 0.0;
        }
        output.clamp(0.0, 1.0)
    }
}
