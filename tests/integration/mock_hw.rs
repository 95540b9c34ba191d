//! Recording fakes for integration tests.
//!
//! Every collaborator of the orchestrator appends to one shared call log,
//! so tests can assert on the exact order of side effects across pumps,
//! PWM units, telemetry and the sensor writer.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use poolchem::app::ports::{
    DeviceRegistry, Encoder, Pump, PwmPort, SensorReader, SensorWriter,
};
use poolchem::app::runtime::Collaborators;
use poolchem::app::service::DisinfectionPorts;
use poolchem::error::MailboxError;

// ── Call record ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    PumpOn(&'static str),
    PumpOff(&'static str),
    SetValue(&'static str, f32),
    SetPeriod(&'static str, f32),
    Run(&'static str),
    Cancel(&'static str),
    State(String),
    ClFeedback(i32),
    PhFeedback(i32),
    OrpSetpoint(i32),
    WriterStart,
    WriterStop,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

// ── Pumps ─────────────────────────────────────────────────────

pub struct MockPump {
    name: &'static str,
    log: CallLog,
}

impl Pump for MockPump {
    fn on(&self) -> anyhow::Result<()> {
        self.log.borrow_mut().push(Call::PumpOn(self.name));
        Ok(())
    }

    fn off(&self) -> anyhow::Result<()> {
        self.log.borrow_mut().push(Call::PumpOff(self.name));
        Ok(())
    }
}

pub struct MockRegistry {
    ph: Option<Rc<MockPump>>,
    cl: Option<Rc<MockPump>>,
}

#[allow(dead_code)]
impl MockRegistry {
    /// Registry with only the pH pump.
    pub fn without_cl(mut self) -> Self {
        self.cl = None;
        self
    }
}

impl DeviceRegistry for MockRegistry {
    fn get_pump(&self, name: &str) -> Option<Rc<dyn Pump>> {
        let pump = match name {
            "ph" => self.ph.clone(),
            "cl" => self.cl.clone(),
            _ => None,
        }?;
        Some(pump as Rc<dyn Pump>)
    }
}

// ── PWM units ─────────────────────────────────────────────────

pub struct MockPwm {
    name: &'static str,
    log: CallLog,
}

impl PwmPort for MockPwm {
    fn set_value(&self, value: f32) -> Result<(), MailboxError> {
        self.log.borrow_mut().push(Call::SetValue(self.name, value));
        Ok(())
    }

    fn set_period(&self, period_secs: f32) -> Result<(), MailboxError> {
        self.log
            .borrow_mut()
            .push(Call::SetPeriod(self.name, period_secs));
        Ok(())
    }

    fn run(&self) -> Result<(), MailboxError> {
        self.log.borrow_mut().push(Call::Run(self.name));
        Ok(())
    }

    fn cancel(&self) -> Result<(), MailboxError> {
        self.log.borrow_mut().push(Call::Cancel(self.name));
        Ok(())
    }
}

// ── Sensors ───────────────────────────────────────────────────

pub struct MockSensors {
    ph: Rc<Cell<f32>>,
    orp: Rc<Cell<f32>>,
    fail: Rc<Cell<bool>>,
}

impl SensorReader for MockSensors {
    fn get_ph(&mut self) -> anyhow::Result<f32> {
        if self.fail.get() {
            anyhow::bail!("pH probe offline");
        }
        Ok(self.ph.get())
    }

    fn get_orp(&mut self) -> anyhow::Result<f32> {
        if self.fail.get() {
            anyhow::bail!("ORP probe offline");
        }
        Ok(self.orp.get())
    }
}

pub struct MockWriter {
    log: CallLog,
}

impl SensorWriter for MockWriter {
    fn do_write(&mut self) {
        self.log.borrow_mut().push(Call::WriterStart);
    }

    fn do_cancel(&mut self) {
        self.log.borrow_mut().push(Call::WriterStop);
    }
}

// ── Telemetry ─────────────────────────────────────────────────

pub struct MockEncoder {
    log: CallLog,
}

impl Encoder for MockEncoder {
    fn disinfection_state(&mut self, name: &str) {
        self.log.borrow_mut().push(Call::State(name.to_owned()));
    }

    fn disinfection_cl_feedback(&mut self, percent: i32) {
        self.log.borrow_mut().push(Call::ClFeedback(percent));
    }

    fn disinfection_ph_feedback(&mut self, percent: i32) {
        self.log.borrow_mut().push(Call::PhFeedback(percent));
    }

    fn disinfection_orp_setpoint(&mut self, mv: i32) {
        self.log.borrow_mut().push(Call::OrpSetpoint(mv));
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// One set of fakes sharing a call log and sensor values.
pub struct Rig {
    pub log: CallLog,
    pub ph: Rc<Cell<f32>>,
    pub orp: Rc<Cell<f32>>,
    pub sensor_fail: Rc<Cell<bool>>,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
            ph: Rc::new(Cell::new(7.2)),
            orp: Rc::new(Cell::new(700.0)),
            sensor_fail: Rc::new(Cell::new(false)),
        }
    }

    pub fn registry(&self) -> MockRegistry {
        MockRegistry {
            ph: Some(Rc::new(MockPump {
                name: "ph",
                log: Rc::clone(&self.log),
            })),
            cl: Some(Rc::new(MockPump {
                name: "cl",
                log: Rc::clone(&self.log),
            })),
        }
    }

    /// Orchestrator ports with recording PWM fakes.
    pub fn ports(&self) -> DisinfectionPorts {
        let io = self.collaborators();
        DisinfectionPorts {
            ph: Box::new(MockPwm {
                name: "ph",
                log: Rc::clone(&self.log),
            }),
            cl: Box::new(MockPwm {
                name: "cl",
                log: Rc::clone(&self.log),
            }),
            reader: io.reader,
            writer: io.writer,
            encoder: io.encoder,
        }
    }

    /// Sensor and telemetry fakes for a real runtime.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            reader: Box::new(MockSensors {
                ph: Rc::clone(&self.ph),
                orp: Rc::clone(&self.orp),
                fail: Rc::clone(&self.sensor_fail),
            }),
            writer: Box::new(MockWriter {
                log: Rc::clone(&self.log),
            }),
            encoder: Box::new(MockEncoder {
                log: Rc::clone(&self.log),
            }),
        }
    }

    /// Drain the call log.
    pub fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    /// Last relay command sent to pump `name`: `Some(true)` for on.
    pub fn pump_state(&self, name: &str) -> Option<bool> {
        self.log.borrow().iter().rev().find_map(|c| match c {
            Call::PumpOn(n) if *n == name => Some(true),
            Call::PumpOff(n) if *n == name => Some(false),
            _ => None,
        })
    }

    /// States reported to the encoder, in order.
    pub fn states(&self) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::State(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}
