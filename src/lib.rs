//! Swimming-pool disinfection controller.
//!
//! Closed-loop pH and chlorine dosing built from isolated control units:
//! two slow-PWM pump modulators and an orchestrating state machine, all
//! running on one local executor.  Sensors, relays, telemetry and
//! configuration storage are reached only through the port traits in
//! [`app::ports`].

#![deny(unused_must_use)]

pub mod actor;
pub mod adapters;
pub mod app;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod safety;
pub mod scheduler;

pub use error::{Error, TaskError, TaskResult};
