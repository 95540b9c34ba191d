//! Messages accepted by the disinfection orchestrator.
//!
//! Adapters (UI, MQTT bridge, scheduler) send these to the orchestrator's
//! [`Address`](crate::actor::Address); the unit's own timer and deferred
//! self-calls use the same type.

use std::rc::Rc;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use heapless::String;

use crate::fsm::{State, StateId, Trigger};

/// One-shot reply slot for [`DisinfectionMsg::Status`].
pub type StatusReply = Rc<Signal<NoopRawMutex, Status>>;

/// Commands the orchestrator interprets.
pub enum DisinfectionMsg {
    /// Fire a state machine trigger.  Invalid triggers are ignored.
    Trigger(Trigger),

    /// Periodic handler of `StateId`, re-armed by the orchestrator while
    /// that state stays active.
    Periodic(StateId),

    /// Gate pH feedback (disabled → duty 0).
    PhEnable(bool),

    /// Gate ORP/chlorine feedback (disabled → duty 0).
    OrpEnable(bool),

    PhSetpoint(f32),

    /// pH gain; stored negated ("pH minus" product lowers pH).
    PhPterm(f32),

    OrpPterm(f32),

    /// Constant chlorine dose in percent, used by `constant`.
    ClConstant(f32),

    /// Select the ORP curve by name (`low`, `mid`, `mid_high`, `high`).
    FreeChlorine(String<16>),

    /// Reply with a [`Status`] snapshot.
    Status(StatusReply),
}

impl DisinfectionMsg {
    /// `FreeChlorine` from a `&str`; names longer than the buffer are
    /// truncated (and so rejected as unknown).
    pub fn free_chlorine(name: &str) -> Self {
        let mut level = String::new();
        for c in name.chars() {
            if level.push(c).is_err() {
                break;
            }
        }
        Self::FreeChlorine(level)
    }
}

/// Snapshot of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Status {
    pub state: State,
    pub time_in_state: Duration,
    /// Last reported pH duty fraction.
    pub ph_feedback: f32,
    /// Last reported chlorine duty fraction.
    pub cl_feedback: f32,
    /// Last ORP setpoint computed in `adjusting`, if any.
    pub orp_setpoint: Option<i32>,
}
