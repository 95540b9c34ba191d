//! Orchestrator tests: the disinfection state machine driven through a
//! manual context against recording fakes.

use std::rc::Rc;

use embassy_sync::signal::Signal;
use proptest::prelude::*;

use poolchem::actor::ManualContext;
use poolchem::app::commands::DisinfectionMsg;
use poolchem::app::ports::ConfigError;
use poolchem::app::service::Disinfection;
use poolchem::config::DisinfectionConfig;
use poolchem::control::curves::ChlorineLevel;
use poolchem::error::{Error, TaskError};
use poolchem::fsm::{Running, State, StateId, Trigger};

use crate::mock_hw::{Call, Rig};

type Ctx = ManualContext<DisinfectionMsg>;

/// Started orchestrator (halt entry done) with an empty call log.
fn make(config: DisinfectionConfig) -> (Disinfection, Ctx, Rig) {
    let rig = Rig::new();
    let mut d = Disinfection::new(&config, rig.ports(), &rig.registry()).unwrap();
    let mut ctx = Ctx::new();
    d.start(&mut ctx).unwrap();
    rig.take();
    (d, ctx, rig)
}

fn trigger(d: &mut Disinfection, ctx: &mut Ctx, t: Trigger) {
    ctx.deliver(d, DisinfectionMsg::Trigger(t)).unwrap();
}

/// Drive halt → waiting → running.adjusting → running.treating.
fn into_treating(d: &mut Disinfection, ctx: &mut Ctx) {
    trigger(d, ctx, Trigger::Run);
    assert!(ctx.fire(d).unwrap());
    assert_eq!(d.state(), State::Running(Running::Treating));
}

fn scheduled_trigger(ctx: &Ctx) -> Option<Trigger> {
    match ctx.scheduled() {
        Some((_, DisinfectionMsg::Trigger(t))) => Some(*t),
        _ => None,
    }
}

fn halt_entry() -> Vec<Call> {
    vec![
        Call::State("halt".into()),
        Call::SetValue("ph", 0.0),
        Call::SetValue("cl", 0.0),
        Call::Cancel("ph"),
        Call::Cancel("cl"),
        Call::PumpOff("ph"),
        Call::PumpOff("cl"),
        Call::ClFeedback(0),
        Call::PhFeedback(0),
        Call::WriterStop,
    ]
}

// ── Startup ───────────────────────────────────────────────────

#[test]
fn start_runs_halt_entry() {
    let rig = Rig::new();
    let mut d =
        Disinfection::new(&DisinfectionConfig::default(), rig.ports(), &rig.registry()).unwrap();
    let mut ctx = Ctx::new();
    d.start(&mut ctx).unwrap();
    assert_eq!(d.state(), State::Halt);
    assert_eq!(rig.take(), halt_entry());
    assert!(ctx.scheduled().is_none());
}

#[test]
fn missing_pump_rejected() {
    let rig = Rig::new();
    let registry = rig.registry().without_cl();
    let result = Disinfection::new(&DisinfectionConfig::default(), rig.ports(), &registry);
    assert_eq!(
        result.err(),
        Some(Error::Config(ConfigError::UnknownDevice("cl")))
    );
}

// ── Sequencing ────────────────────────────────────────────────

#[test]
fn run_from_halt_waits_then_runs() {
    let config = DisinfectionConfig::default();
    let (mut d, mut ctx, rig) = make(config.clone());

    trigger(&mut d, &mut ctx, Trigger::Run);
    assert_eq!(d.state(), State::Waiting);
    assert_eq!(
        rig.take(),
        vec![Call::Cancel("ph"), Call::Cancel("cl"), Call::State("waiting".into())]
    );
    let (delay, _) = ctx.scheduled().unwrap();
    assert_eq!(delay, config.start_delay());
    assert_eq!(scheduled_trigger(&ctx), Some(Trigger::Run));
}

#[test]
fn disabled_controller_stays_in_halt() {
    let config = DisinfectionConfig {
        disabled: true,
        ..DisinfectionConfig::default()
    };
    let (mut d, mut ctx, rig) = make(config);
    assert!(d.is_disabled());

    trigger(&mut d, &mut ctx, Trigger::Run);
    assert_eq!(d.state(), State::Halt);
    assert!(rig.take().is_empty());
    assert_eq!(ctx.cancel_count(), 0);
}

#[test]
fn closed_loop_cycle() {
    let config = DisinfectionConfig::default();
    let (mut d, mut ctx, rig) = make(config.clone());
    rig.ph.set(7.5);
    rig.orp.set(625.0);

    trigger(&mut d, &mut ctx, Trigger::Run);
    rig.take();

    // Start delay expires: running entry, adjusting, deferred treat.
    assert!(ctx.fire(&mut d).unwrap());
    assert_eq!(d.state(), State::Running(Running::Treating));

    let mut calls = rig.take();
    // Chlorine duty is 0.005 * (665 - 625); compare it separately.
    let cl_duty = calls
        .iter()
        .position(|c| matches!(c, Call::SetValue("cl", _)))
        .map(|i| calls.remove(i));
    match cl_duty {
        Some(Call::SetValue(_, v)) => assert!((v - 0.2).abs() < 1e-4, "cl duty {v}"),
        other => panic!("no chlorine duty set: {other:?}"),
    }
    assert_eq!(
        calls,
        vec![
            Call::Cancel("ph"),
            Call::Cancel("cl"),
            Call::Run("ph"),
            Call::SetPeriod("cl", 120.0),
            Call::Run("cl"),
            Call::WriterStart,
            Call::State("adjusting".into()),
            Call::ClFeedback(20),
            Call::PhFeedback(50),
            Call::OrpSetpoint(665),
            Call::SetValue("ph", 0.5),
            Call::State("treating".into()),
        ]
    );
    let (delay, _) = ctx.scheduled().unwrap();
    assert_eq!(delay, config.waiting_delay());
    assert_eq!(scheduled_trigger(&ctx), Some(Trigger::Adjust));

    let status = d.status();
    assert!((status.ph_feedback - 0.5).abs() < 1e-6);
    assert_eq!(status.orp_setpoint, Some(665));
}

#[test]
fn substate_cycle_keeps_modulators_running() {
    let (mut d, mut ctx, rig) = make(DisinfectionConfig::default());
    into_treating(&mut d, &mut ctx);
    rig.take();

    // Waiting delay expires: adjust, re-sample, treat again.
    assert!(ctx.fire(&mut d).unwrap());
    assert_eq!(d.state(), State::Running(Running::Treating));
    let calls = rig.take();
    assert!(!calls.iter().any(|c| matches!(c, Call::Cancel(_) | Call::Run(_))));
    assert!(calls.contains(&Call::State("adjusting".into())));
    assert!(calls.contains(&Call::State("treating".into())));
    assert_eq!(scheduled_trigger(&ctx), Some(Trigger::Adjust));
}

#[test]
fn disabled_feedback_reports_zero() {
    let (mut d, mut ctx, rig) = make(DisinfectionConfig::default());
    rig.ph.set(8.0);
    rig.orp.set(400.0);
    ctx.deliver(&mut d, DisinfectionMsg::PhEnable(false)).unwrap();
    ctx.deliver(&mut d, DisinfectionMsg::OrpEnable(false)).unwrap();
    into_treating(&mut d, &mut ctx);

    let calls = rig.take();
    assert!(calls.contains(&Call::PhFeedback(0)));
    assert!(calls.contains(&Call::ClFeedback(0)));
    assert!(calls.contains(&Call::SetValue("ph", 0.0)));
    assert!(calls.contains(&Call::SetValue("cl", 0.0)));
}

#[test]
fn halt_from_running_stops_everything() {
    let (mut d, mut ctx, rig) = make(DisinfectionConfig::default());
    into_treating(&mut d, &mut ctx);
    rig.take();

    trigger(&mut d, &mut ctx, Trigger::Halt);
    assert_eq!(d.state(), State::Halt);
    assert!(ctx.scheduled().is_none());
    assert_eq!(rig.pump_state("ph"), Some(false));
    assert_eq!(rig.pump_state("cl"), Some(false));
    let mut expected = vec![Call::Cancel("ph"), Call::Cancel("cl")];
    expected.extend(halt_entry());
    assert_eq!(rig.take(), expected);
}

#[test]
fn halt_is_idempotent() {
    let (mut d, mut ctx, rig) = make(DisinfectionConfig::default());
    for _ in 0..3 {
        trigger(&mut d, &mut ctx, Trigger::Halt);
        assert_eq!(d.state(), State::Halt);
        let calls = rig.take();
        assert!(calls.ends_with(&halt_entry()));
        assert!(calls.contains(&Call::PumpOff("ph")));
        assert!(calls.contains(&Call::PumpOff("cl")));
    }
}

#[test]
fn invalid_triggers_have_no_side_effects() {
    let (mut d, mut ctx, rig) = make(DisinfectionConfig::default());
    for t in [Trigger::Adjust, Trigger::Treat] {
        trigger(&mut d, &mut ctx, t);
        assert_eq!(d.state(), State::Halt);
    }
    trigger(&mut d, &mut ctx, Trigger::Run);
    rig.take();
    let cancels = ctx.cancel_count();
    for t in [Trigger::Adjust, Trigger::Treat] {
        trigger(&mut d, &mut ctx, t);
        assert_eq!(d.state(), State::Waiting);
    }
    assert!(rig.take().is_empty());
    assert_eq!(ctx.cancel_count(), cancels);
    assert_eq!(scheduled_trigger(&ctx), Some(Trigger::Run));
}

// ── Constant dosing ───────────────────────────────────────────

#[test]
fn constant_doses_fixed_fraction_periodically() {
    let config = DisinfectionConfig::default();
    let (mut d, mut ctx, rig) = make(config.clone());
    ctx.deliver(&mut d, DisinfectionMsg::ClConstant(25.0)).unwrap();
    into_treating(&mut d, &mut ctx);
    rig.take();

    trigger(&mut d, &mut ctx, Trigger::Constant);
    assert_eq!(d.state(), State::Constant);
    assert_eq!(
        rig.take(),
        vec![
            Call::Cancel("ph"),
            Call::Cancel("cl"),
            Call::State("constant".into()),
            Call::SetPeriod("cl", 3600.0),
            Call::Run("cl"),
            Call::ClFeedback(25),
            Call::SetValue("cl", 0.25),
        ]
    );
    assert!(matches!(
        ctx.scheduled(),
        Some((delay, DisinfectionMsg::Periodic(StateId::Constant)))
            if delay == config.state_refresh_interval()
    ));

    // Refresh with ORP correction off: dose drops to 0 and re-arms.
    ctx.deliver(&mut d, DisinfectionMsg::OrpEnable(false)).unwrap();
    assert!(ctx.fire(&mut d).unwrap());
    assert_eq!(
        rig.take(),
        vec![Call::ClFeedback(0), Call::SetValue("cl", 0.0)]
    );
    assert!(matches!(
        ctx.scheduled(),
        Some((_, DisinfectionMsg::Periodic(StateId::Constant)))
    ));
}

#[test]
fn leaving_constant_stops_refresh() {
    let (mut d, mut ctx, rig) = make(DisinfectionConfig::default());
    trigger(&mut d, &mut ctx, Trigger::Constant);
    trigger(&mut d, &mut ctx, Trigger::Halt);
    assert!(ctx.scheduled().is_none());
    rig.take();

    // A refresh for a state that is no longer active stops repeating.
    let r = ctx.deliver(&mut d, DisinfectionMsg::Periodic(StateId::Constant));
    assert!(matches!(r, Err(TaskError::StopRepeat)));
    assert!(ctx.scheduled().is_none());
    assert!(rig.take().is_empty());
}

#[test]
fn constant_unreachable_from_constant() {
    let (mut d, mut ctx, rig) = make(DisinfectionConfig::default());
    trigger(&mut d, &mut ctx, Trigger::Constant);
    rig.take();
    trigger(&mut d, &mut ctx, Trigger::Constant);
    trigger(&mut d, &mut ctx, Trigger::Run);
    assert_eq!(d.state(), State::Constant);
    assert!(rig.take().is_empty());
}

// ── Tuning commands ───────────────────────────────────────────

#[test]
fn tuning_commands_update_controllers() {
    let (mut d, mut ctx, _rig) = make(DisinfectionConfig::default());
    ctx.deliver(&mut d, DisinfectionMsg::PhPterm(2.0)).unwrap();
    ctx.deliver(&mut d, DisinfectionMsg::PhSetpoint(7.4)).unwrap();
    ctx.deliver(&mut d, DisinfectionMsg::OrpPterm(3.0)).unwrap();
    assert!((d.ph_controller().pterm + 2.0).abs() < f32::EPSILON);
    assert!((d.ph_controller().setpoint - 7.4).abs() < f32::EPSILON);
    assert!((d.orp_controller().pterm - 3.0).abs() < f32::EPSILON);
}

#[test]
fn free_chlorine_level_selects_curve() {
    let (mut d, mut ctx, rig) = make(DisinfectionConfig::default());
    ctx.deliver(&mut d, DisinfectionMsg::free_chlorine("mid")).unwrap();
    assert_eq!(d.free_chlorine(), ChlorineLevel::Mid);
    ctx.deliver(&mut d, DisinfectionMsg::free_chlorine("bogus")).unwrap();
    assert_eq!(d.free_chlorine(), ChlorineLevel::Mid);

    rig.ph.set(7.2);
    into_treating(&mut d, &mut ctx);
    assert!(rig.calls().contains(&Call::OrpSetpoint(705)));
}

#[test]
fn status_reply_reflects_state() {
    let (mut d, mut ctx, _rig) = make(DisinfectionConfig::default());
    trigger(&mut d, &mut ctx, Trigger::Run);
    let reply = Rc::new(Signal::new());
    ctx.deliver(&mut d, DisinfectionMsg::Status(Rc::clone(&reply)))
        .unwrap();
    let status = reply.try_take().unwrap();
    assert_eq!(status.state, State::Waiting);
    assert_eq!(status.orp_setpoint, None);
}

// ── Failures ──────────────────────────────────────────────────

#[test]
fn sensor_failure_is_fatal_and_reports_nothing() {
    let (mut d, mut ctx, rig) = make(DisinfectionConfig::default());
    trigger(&mut d, &mut ctx, Trigger::Run);
    rig.sensor_fail.set(true);
    rig.take();

    let r = ctx.fire(&mut d);
    assert!(matches!(r, Err(TaskError::Fatal(_))));
    let calls = rig.take();
    assert!(calls.contains(&Call::State("adjusting".into())));
    assert!(!calls.iter().any(|c| matches!(
        c,
        Call::PhFeedback(_) | Call::ClFeedback(_) | Call::OrpSetpoint(_)
    )));
}

proptest! {
    #[test]
    fn reported_orp_setpoint_is_multiple_of_five(
        ph in 6.0f32..8.5,
        level in prop::sample::select(ChlorineLevel::ALL.to_vec()),
    ) {
        let config = DisinfectionConfig {
            free_chlorine: level,
            ..DisinfectionConfig::default()
        };
        let (mut d, mut ctx, rig) = make(config);
        rig.ph.set(ph);
        into_treating(&mut d, &mut ctx);
        let setpoints: Vec<i32> = rig
            .calls()
            .iter()
            .filter_map(|c| match c {
                Call::OrpSetpoint(mv) => Some(*mv),
                _ => None,
            })
            .collect();
        prop_assert_eq!(setpoints.len(), 1);
        prop_assert_eq!(setpoints[0] % 5, 0);
    }
}
