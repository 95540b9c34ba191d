//! Actuator drivers.

pub mod pwm;
