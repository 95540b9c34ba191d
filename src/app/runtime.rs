//! Controller wiring: one unit per role, all on one local executor.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │  futures_lite::future::block_on                               │
//!  │  ┌────────────────────────────────────────────────────────┐  │
//!  │  │ edge_executor::LocalExecutor                           │  │
//!  │  │   ph unit (PwmUnit)   cl unit (PwmUnit)   disinfection │  │
//!  │  │        ▲                    ▲                  │       │  │
//!  │  │        └──── PwmCommand ────┴──────────────────┘       │  │
//!  │  └────────────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Units share no memory; the orchestrator drives the PWM units only
//! through their addresses.

use core::time::Duration;
use std::rc::Rc;

use edge_executor::LocalExecutor;
use embassy_sync::signal::Signal;
use log::{debug, info};

use crate::actor::{Address, unit};
use crate::config::DisinfectionConfig;
use crate::drivers::pwm::{PwmCommand, PwmUnit};
use crate::error::{Error, MailboxError};
use crate::fsm::Trigger;

use super::commands::{DisinfectionMsg, Status};
use super::ports::{
    ConfigError, ConfigPort, DeviceRegistry, Encoder, SensorReader, SensorWriter,
};
use super::service::{Disinfection, DisinfectionPorts};

/// Executor capacity used by [`run`].
pub const EXECUTOR_TASKS: usize = 8;

/// How often [`run`] checks whether the orchestrator is still alive.
const SUPERVISE_POLL: Duration = Duration::from_millis(50);

/// Sensor and telemetry collaborators.
pub struct Collaborators {
    pub reader: Box<dyn SensorReader>,
    pub writer: Box<dyn SensorWriter>,
    pub encoder: Box<dyn Encoder>,
}

/// Addresses of a spawned controller.
#[derive(Clone)]
pub struct Controller {
    pub disinfection: Address<DisinfectionMsg>,
    pub ph: Address<PwmCommand>,
    pub cl: Address<PwmCommand>,
}

impl Controller {
    pub fn trigger(&self, trigger: Trigger) -> Result<(), MailboxError> {
        self.disinfection.send(DisinfectionMsg::Trigger(trigger))
    }

    /// Ask the orchestrator for a [`Status`] snapshot.
    pub async fn status(&self) -> Result<Status, MailboxError> {
        let reply = Rc::new(Signal::new());
        self.disinfection
            .send_async(DisinfectionMsg::Status(Rc::clone(&reply)))
            .await?;
        Ok(reply.wait().await)
    }

    /// Stop every unit.  The PWM units switch their pumps off on the way
    /// out.  Units that already stopped are skipped.
    pub fn shutdown(&self) {
        for result in [
            self.disinfection.stop(),
            self.ph.stop(),
            self.cl.stop(),
        ] {
            if let Err(e) = result {
                debug!("shutdown: {e}");
            }
        }
    }
}

/// Build the three units and spawn them on `executor`.
pub fn spawn<'a, const C: usize>(
    executor: &LocalExecutor<'a, C>,
    config: &DisinfectionConfig,
    devices: &dyn DeviceRegistry,
    io: Collaborators,
) -> Result<Controller, Error> {
    config.validate()?;

    let pwm = |name: &'static str, period: f32| -> Result<PwmUnit, Error> {
        let pump = devices
            .get_pump(name)
            .ok_or(ConfigError::UnknownDevice(name))?;
        Ok(PwmUnit::new(
            name,
            pump,
            period,
            config.pwm_min_runtime_secs,
            config.security_duration_secs(),
            config.pwm_tick_interval(),
        ))
    };
    let (ph, ph_run) = unit(pwm("ph", config.ph_pwm_period_secs)?);
    let (cl, cl_run) = unit(pwm("cl", config.cl_pwm_period_secs)?);

    let disinfection = Disinfection::new(
        config,
        DisinfectionPorts {
            ph: Box::new(ph.clone()),
            cl: Box::new(cl.clone()),
            reader: io.reader,
            writer: io.writer,
            encoder: io.encoder,
        },
        devices,
    )?;
    let (orchestrator, orchestrator_run) = unit(disinfection);

    executor.spawn(ph_run).detach();
    executor.spawn(cl_run).detach();
    executor.spawn(orchestrator_run).detach();
    info!("Controller spawned (3 units)");

    Ok(Controller {
        disinfection: orchestrator,
        ph,
        cl,
    })
}

/// Load the configuration, spawn the controller and drive it on the
/// current thread until the orchestrator stops.
pub fn run(
    source: &dyn ConfigPort,
    devices: &dyn DeviceRegistry,
    io: Collaborators,
    on_ready: impl FnOnce(&Controller),
) -> Result<(), Error> {
    let config = source.load()?;
    let executor: LocalExecutor<'_, EXECUTOR_TASKS> = LocalExecutor::new();
    let controller = spawn(&executor, &config, devices, io)?;
    on_ready(&controller);

    let orchestrator = controller.disinfection.clone();
    futures_lite::future::block_on(executor.run(async {
        while orchestrator.is_alive() {
            async_io_mini::Timer::after(SUPERVISE_POLL).await;
        }
        // Orchestrator gone: stop the modulators so the pumps end off.
        controller.shutdown();
        while controller.ph.is_alive() || controller.cl.is_alive() {
            async_io_mini::Timer::after(SUPERVISE_POLL).await;
        }
    }));
    info!("Controller stopped");
    Ok(())
}
