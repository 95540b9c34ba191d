//! Log-based telemetry adapter.
//!
//! Implements [`Encoder`] by writing each report to the `log` facade.
//! A display or MQTT adapter would implement the same trait.

use log::info;

use crate::app::ports::Encoder;

/// Adapter that logs every telemetry report.
#[derive(Debug, Default)]
pub struct LogEncoder;

impl LogEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder for LogEncoder {
    fn disinfection_state(&mut self, name: &str) {
        info!("TELEM | disinfection state={}", name);
    }

    fn disinfection_cl_feedback(&mut self, percent: i32) {
        info!("TELEM | cl feedback={}%", percent);
    }

    fn disinfection_ph_feedback(&mut self, percent: i32) {
        info!("TELEM | ph feedback={}%", percent);
    }

    fn disinfection_orp_setpoint(&mut self, mv: i32) {
        info!("TELEM | orp setpoint={}mV", mv);
    }
}
