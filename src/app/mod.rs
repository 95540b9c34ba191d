//! Application core: the disinfection orchestrator and its wiring.
//!
//! All interaction with sensors, relays, telemetry and configuration
//! storage goes through the **port traits** in [`ports`], so the
//! orchestrator is testable with recording fakes.

pub mod commands;
pub mod ports;
pub mod runtime;
pub mod service;
