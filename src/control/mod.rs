//! Feedback computation for the dosing loops.

pub mod curves;
pub mod pcontroller;
