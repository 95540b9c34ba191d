//! Disinfection orchestrator.
//!
//! [`Disinfection`] owns the state machine, both proportional controllers
//! and the handles to the two PWM units.  It runs as a control unit: every
//! trigger, tuning command and timer expiry arrives as a
//! [`DisinfectionMsg`] and is handled to completion before the next one.
//!
//! ```text
//!  SensorReader ──▶ ┌──────────────────────────┐ ──▶ PwmPort (ph, cl)
//!                   │       Disinfection        │ ──▶ Pump (direct off)
//!  DisinfectionMsg ▶│  Machine · PController×2  │ ──▶ Encoder
//!                   └──────────────────────────┘ ──▶ SensorWriter
//! ```
//!
//! Before every transition the orchestrator cancels its own pending task.
//! When the top-level state changes it also cancels both PWM units, so no
//! modulation tick outlives the state that started it.  Moving between
//! `adjusting` and `treating` keeps the modulators running.

use std::rc::Rc;
use std::time::Duration;

use log::{debug, error, info};

use crate::actor::{Actor, Context};
use crate::config::DisinfectionConfig;
use crate::control::curves::ChlorineLevel;
use crate::control::pcontroller::PController;
use crate::error::{Error, TaskError, TaskResult};
use crate::fsm::states::{descriptor, percent};
use crate::fsm::{Machine, State, StateId, TRANSITIONS, Trigger};
use crate::scheduler::repeat;

use super::commands::{DisinfectionMsg, Status};
use super::ports::{
    ConfigError, DeviceRegistry, Encoder, Pump, PwmPort, SensorReader, SensorWriter,
};

// ───────────────────────────────────────────────────────────────
// Construction inputs
// ───────────────────────────────────────────────────────────────

/// Collaborators handed to the orchestrator at construction.
pub struct DisinfectionPorts {
    pub ph: Box<dyn PwmPort>,
    pub cl: Box<dyn PwmPort>,
    pub reader: Box<dyn SensorReader>,
    pub writer: Box<dyn SensorWriter>,
    pub encoder: Box<dyn Encoder>,
}

/// Delays and periods taken from the configuration.
pub(crate) struct Timing {
    pub start_delay: Duration,
    pub waiting_delay: Duration,
    pub state_refresh: Duration,
    pub cl_period: f32,
    pub cl_period_constant: f32,
}

/// Last values sent as telemetry.
#[derive(Default)]
pub(crate) struct LastReport {
    pub ph_feedback: f32,
    pub cl_feedback: f32,
    pub orp_setpoint: Option<i32>,
}

// ───────────────────────────────────────────────────────────────
// Disinfection
// ───────────────────────────────────────────────────────────────

pub struct Disinfection {
    machine: Machine,
    disabled: bool,

    pub(crate) timing: Timing,
    pub(crate) ph: Box<dyn PwmPort>,
    pub(crate) cl: Box<dyn PwmPort>,
    pub(crate) ph_pump: Rc<dyn Pump>,
    pub(crate) cl_pump: Rc<dyn Pump>,
    pub(crate) reader: Box<dyn SensorReader>,
    pub(crate) writer: Box<dyn SensorWriter>,
    pub(crate) encoder: Box<dyn Encoder>,

    pub(crate) ph_controller: PController,
    pub(crate) orp_controller: PController,
    pub(crate) ph_enabled: bool,
    pub(crate) orp_enabled: bool,
    pub(crate) free_chlorine: ChlorineLevel,
    /// Constant chlorine dose, percent.
    pub(crate) cl_constant: f32,
    pub(crate) last: LastReport,
}

impl Disinfection {
    /// Build the orchestrator.  Fails if a pump is missing from `devices`
    /// or the transition table is inconsistent.
    ///
    /// Does **not** enter the initial state; [`start`](Self::start) does,
    /// run by the unit before its first message.
    pub fn new(
        config: &DisinfectionConfig,
        ports: DisinfectionPorts,
        devices: &dyn DeviceRegistry,
    ) -> Result<Self, Error> {
        let ph_pump = devices
            .get_pump("ph")
            .ok_or(ConfigError::UnknownDevice("ph"))?;
        let cl_pump = devices
            .get_pump("cl")
            .ok_or(ConfigError::UnknownDevice("cl"))?;
        let machine = Machine::new(TRANSITIONS)?;

        // "pH minus" product: dosing lowers pH, so the gain is negated.
        let mut ph_controller = PController::new(-config.ph_pterm, 1.0);
        ph_controller.setpoint = config.ph_setpoint;
        let mut orp_controller = PController::new(config.orp_pterm, config.orp_scale);
        orp_controller.setpoint = config.orp_setpoint;

        Ok(Self {
            machine,
            disabled: config.disabled,
            timing: Timing {
                start_delay: config.start_delay(),
                waiting_delay: config.waiting_delay(),
                state_refresh: config.state_refresh_interval(),
                cl_period: config.cl_pwm_period_secs,
                cl_period_constant: config.cl_pwm_period_constant_secs,
            },
            ph: ports.ph,
            cl: ports.cl,
            ph_pump,
            cl_pump,
            reader: ports.reader,
            writer: ports.writer,
            encoder: ports.encoder,
            ph_controller,
            orp_controller,
            ph_enabled: true,
            orp_enabled: true,
            free_chlorine: config.free_chlorine,
            cl_constant: config.cl_constant_percent,
            last: LastReport::default(),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Run the initial state's entry: both pumps end up commanded off.
    pub fn start(&mut self, ctx: &mut dyn Context<DisinfectionMsg>) -> TaskResult {
        info!("Disinfection starting in {}", self.machine.state());
        self.enter(self.machine.state().id(), ctx)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> State {
        self.machine.state()
    }

    pub fn time_in_state(&self) -> Duration {
        self.machine.time_in_state()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.machine.state(),
            time_in_state: self.machine.time_in_state(),
            ph_feedback: self.last.ph_feedback,
            cl_feedback: self.last.cl_feedback,
            orp_setpoint: self.last.orp_setpoint,
        }
    }

    pub fn ph_controller(&self) -> &PController {
        &self.ph_controller
    }

    pub fn orp_controller(&self) -> &PController {
        &self.orp_controller
    }

    pub fn free_chlorine(&self) -> ChlorineLevel {
        self.free_chlorine
    }

    // ── Transitions ───────────────────────────────────────────

    /// Fire `trigger`.  Triggers with no route from the current state (or
    /// blocked by the disabled guard) are ignored without side effects.
    pub fn fire(&mut self, trigger: Trigger, ctx: &mut dyn Context<DisinfectionMsg>) -> TaskResult {
        let Some(transition) = self.machine.plan(trigger, self.disabled) else {
            debug!("Ignoring trigger {} in {}", trigger, self.machine.state());
            return Ok(());
        };

        ctx.cancel();
        if transition.leaves_top_level() {
            self.ph.cancel()?;
            self.cl.cancel()?;
        }

        debug!("{}: {} -> {}", trigger, transition.from, transition.to);
        self.machine.commit(&transition);

        for &id in &transition.enter {
            self.enter(id, ctx)?;
        }
        Ok(())
    }

    fn enter(&mut self, id: StateId, ctx: &mut dyn Context<DisinfectionMsg>) -> TaskResult {
        let state = descriptor(id);
        (state.on_enter)(self, ctx)?;
        if state.periodic.is_some() {
            self.periodic(id, ctx)?;
        }
        Ok(())
    }

    /// Run the periodic handler of `id` and re-arm it.  A tick for a
    /// state that is no longer active stops repeating.
    fn periodic(&mut self, id: StateId, ctx: &mut dyn Context<DisinfectionMsg>) -> TaskResult {
        if !self.machine.state().is_within(id) {
            debug!("Dropping periodic task of {}, now in {}", id, self.machine.state());
            return Err(TaskError::StopRepeat);
        }
        let Some(handler) = descriptor(id).periodic else {
            return Err(TaskError::StopRepeat);
        };
        let outcome = handler(self, ctx);
        repeat(
            ctx,
            self.timing.state_refresh,
            DisinfectionMsg::Periodic(id),
            outcome,
        )
    }

    /// Report both feedback fractions together.
    pub(crate) fn report_feedback(&mut self, ph_feedback: f32, cl_feedback: f32) {
        self.encoder.disinfection_cl_feedback(percent(cl_feedback));
        self.encoder.disinfection_ph_feedback(percent(ph_feedback));
        self.last.ph_feedback = ph_feedback;
        self.last.cl_feedback = cl_feedback;
    }

    // ── Tuning ────────────────────────────────────────────────

    pub fn set_ph_enabled(&mut self, enabled: bool) {
        self.ph_enabled = enabled;
        info!("pH adjustment is {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn set_orp_enabled(&mut self, enabled: bool) {
        self.orp_enabled = enabled;
        info!("ORP adjustment is {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn set_ph_setpoint(&mut self, setpoint: f32) {
        self.ph_controller.setpoint = setpoint;
        info!("pH setpoint set to: {}", setpoint);
    }

    /// Takes the magnitude of the gain; it is stored negated.
    pub fn set_ph_pterm(&mut self, pterm: f32) {
        self.ph_controller.pterm = -pterm;
        info!("pH pterm set to: {}", self.ph_controller.pterm);
    }

    pub fn set_orp_pterm(&mut self, pterm: f32) {
        self.orp_controller.pterm = pterm;
        info!("ORP pterm set to: {}", pterm);
    }

    pub fn set_cl_constant(&mut self, percent: f32) {
        self.cl_constant = percent;
        info!("Chlorine constant value set to: {}", percent);
    }

    /// Select the ORP curve by name.  Unknown names are logged and ignored.
    pub fn set_free_chlorine(&mut self, name: &str) {
        match name.parse::<ChlorineLevel>() {
            Ok(level) => {
                self.free_chlorine = level;
                info!("Free chlorine level set to: {}", level);
            }
            Err(_) => error!("Unsupported free chlorine level: {}", name),
        }
    }
}

impl Actor for Disinfection {
    type Message = DisinfectionMsg;

    fn name(&self) -> &str {
        "disinfection"
    }

    fn on_start(&mut self, ctx: &mut dyn Context<DisinfectionMsg>) -> TaskResult {
        self.start(ctx)
    }

    fn handle(
        &mut self,
        message: DisinfectionMsg,
        ctx: &mut dyn Context<DisinfectionMsg>,
    ) -> TaskResult {
        match message {
            DisinfectionMsg::Trigger(trigger) => return self.fire(trigger, ctx),
            DisinfectionMsg::Periodic(id) => return self.periodic(id, ctx),
            DisinfectionMsg::PhEnable(v) => self.set_ph_enabled(v),
            DisinfectionMsg::OrpEnable(v) => self.set_orp_enabled(v),
            DisinfectionMsg::PhSetpoint(v) => self.set_ph_setpoint(v),
            DisinfectionMsg::PhPterm(v) => self.set_ph_pterm(v),
            DisinfectionMsg::OrpPterm(v) => self.set_orp_pterm(v),
            DisinfectionMsg::ClConstant(v) => self.set_cl_constant(v),
            DisinfectionMsg::FreeChlorine(name) => self.set_free_chlorine(&name),
            DisinfectionMsg::Status(reply) => reply.signal(self.status()),
        }
        Ok(())
    }
}
