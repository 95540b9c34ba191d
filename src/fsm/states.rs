//! State descriptors: entry hooks and periodic handlers.
//!
//! Each state is a row of plain `fn` pointers, indexed by [`StateId`].
//! A state with a `periodic` handler runs it right after entry and then
//! every `state_refresh_interval` until the state is left.
//!
//! ```text
//!  HALT       report · duty 0 · devices cancelled · pumps off · writer off
//!  WAITING    report · after start_delay ─▶ run
//!  CONSTANT   report · cl period = constant · cl run
//!               └─ periodic: cl duty = constant dose (if ORP enabled)
//!  RUNNING    ph run · cl period = normal · cl run · writer on
//!   ADJUSTING report · sample · duty from controllers ─▶ treat (deferred)
//!   TREATING  report · after waiting_delay ─▶ adjust
//! ```

use anyhow::Context as _;
use log::{debug, info};

use super::{StateId, Trigger};
use crate::actor::Context;
use crate::app::commands::DisinfectionMsg;
use crate::app::service::Disinfection;
use crate::error::TaskResult;

/// Entry hook or periodic handler.
pub type Hook = fn(&mut Disinfection, &mut dyn Context<DisinfectionMsg>) -> TaskResult;

#[derive(Clone, Copy)]
pub struct StateDescriptor {
    pub id: StateId,
    pub on_enter: Hook,
    pub periodic: Option<Hook>,
}

/// The state table, indexed by `StateId as usize`.
pub static STATE_TABLE: [StateDescriptor; StateId::COUNT] = [
    StateDescriptor {
        id: StateId::Halt,
        on_enter: halt_enter,
        periodic: None,
    },
    StateDescriptor {
        id: StateId::Waiting,
        on_enter: waiting_enter,
        periodic: None,
    },
    StateDescriptor {
        id: StateId::Constant,
        on_enter: constant_enter,
        periodic: Some(constant_refresh),
    },
    StateDescriptor {
        id: StateId::Running,
        on_enter: running_enter,
        periodic: None,
    },
    StateDescriptor {
        id: StateId::Adjusting,
        on_enter: adjusting_enter,
        periodic: None,
    },
    StateDescriptor {
        id: StateId::Treating,
        on_enter: treating_enter,
        periodic: None,
    },
];

pub fn descriptor(id: StateId) -> &'static StateDescriptor {
    &STATE_TABLE[id as usize]
}

// ═══════════════════════════════════════════════════════════════════════════
//  HALT
// ═══════════════════════════════════════════════════════════════════════════

fn halt_enter(d: &mut Disinfection, _ctx: &mut dyn Context<DisinfectionMsg>) -> TaskResult {
    info!("Entering halt state");
    d.encoder.disinfection_state("halt");
    d.ph.set_value(0.0)?;
    d.cl.set_value(0.0)?;
    d.ph.cancel()?;
    d.cl.cancel()?;
    // Straight to the relays: off now, not on the next modulator tick.
    d.ph_pump.off().context("ph pump off")?;
    d.cl_pump.off().context("cl pump off")?;
    d.report_feedback(0.0, 0.0);
    d.writer.do_cancel();
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAITING
// ═══════════════════════════════════════════════════════════════════════════

fn waiting_enter(d: &mut Disinfection, ctx: &mut dyn Context<DisinfectionMsg>) -> TaskResult {
    info!("Entering waiting state");
    d.encoder.disinfection_state("waiting");
    ctx.schedule_once(d.timing.start_delay, DisinfectionMsg::Trigger(Trigger::Run));
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONSTANT
// ═══════════════════════════════════════════════════════════════════════════

fn constant_enter(d: &mut Disinfection, _ctx: &mut dyn Context<DisinfectionMsg>) -> TaskResult {
    info!("Entering constant state");
    d.encoder.disinfection_state("constant");
    d.cl.set_period(d.timing.cl_period_constant)?;
    d.cl.run()?;
    Ok(())
}

fn constant_refresh(d: &mut Disinfection, _ctx: &mut dyn Context<DisinfectionMsg>) -> TaskResult {
    let cl_feedback = if d.orp_enabled {
        d.cl_constant / 100.0
    } else {
        0.0
    };
    d.encoder.disinfection_cl_feedback(percent(cl_feedback));
    d.last.cl_feedback = cl_feedback;
    d.cl.set_value(cl_feedback)?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
//  RUNNING (composite)
// ═══════════════════════════════════════════════════════════════════════════

fn running_enter(d: &mut Disinfection, _ctx: &mut dyn Context<DisinfectionMsg>) -> TaskResult {
    info!("Entering running state");
    d.ph.run()?;
    d.cl.set_period(d.timing.cl_period)?;
    d.cl.run()?;
    d.writer.do_write();
    Ok(())
}

fn adjusting_enter(d: &mut Disinfection, ctx: &mut dyn Context<DisinfectionMsg>) -> TaskResult {
    debug!("Entering adjusting state");
    d.encoder.disinfection_state("adjusting");

    // Sample both before reporting anything.
    let ph = d.reader.get_ph().context("reading pH")?;
    let orp = d.reader.get_orp().context("reading ORP")?;

    d.ph_controller.current = ph;
    let ph_feedback = if d.ph_enabled {
        d.ph_controller.compute()
    } else {
        0.0
    };
    debug!("pH: {:.2} feedback: {:.2}", ph, ph_feedback);

    let orp_setpoint = d.free_chlorine.orp_setpoint(ph);
    d.orp_controller.setpoint = orp_setpoint as f32;
    d.orp_controller.current = orp;
    let cl_feedback = if d.orp_enabled {
        d.orp_controller.compute()
    } else {
        0.0
    };
    debug!(
        "ORP: {:.0} setpoint: {} feedback: {:.2}",
        orp, orp_setpoint, cl_feedback
    );

    d.report_feedback(ph_feedback, cl_feedback);
    d.encoder.disinfection_orp_setpoint(orp_setpoint);
    d.last.orp_setpoint = Some(orp_setpoint);

    d.ph.set_value(ph_feedback)?;
    d.cl.set_value(cl_feedback)?;

    ctx.defer(DisinfectionMsg::Trigger(Trigger::Treat))?;
    Ok(())
}

fn treating_enter(d: &mut Disinfection, ctx: &mut dyn Context<DisinfectionMsg>) -> TaskResult {
    debug!("Entering treating state");
    d.encoder.disinfection_state("treating");
    ctx.schedule_once(d.timing.waiting_delay, DisinfectionMsg::Trigger(Trigger::Adjust));
    Ok(())
}

/// Duty fraction as a rounded percentage for telemetry.
pub(crate) fn percent(fraction: f32) -> i32 {
    (fraction * 100.0).round() as i32
}
