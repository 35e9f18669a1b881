//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the FSM, the shared context, the sensor and
//! transport capabilities and the [`PowerManager`].  It exposes a clean,
//! hardware-agnostic API.  All I/O flows through port traits, making the
//! entire service testable with mock adapters.
//!
//! ```text
//!   SensorPort ──▶ ┌─────────────────────────┐ ──▶ EventSink
//!                  │       AppService         │
//! TransportPort ◀──│  FSM · Policy · Retry    │
//!                  │  PowerManager<Board,Rtc> │ ──▶ TickOutcome
//!                  └─────────────────────────┘
//! ```
//!
//! Every tick runs the same three phases:
//!
//! 1. perform the I/O the **current** state needs and store the result
//!    in [`StepInputs`](crate::fsm::context::StepInputs);
//! 2. run the pure FSM tick;
//! 3. execute the [`NodeCommands`](crate::fsm::context::NodeCommands)
//!    the handlers requested (sleep commit, diagnostics, sensor reset).

use log::{error, info, warn};

use crate::assessment::assess;
use crate::config::{SleepMode, SystemConfig};
use crate::error::{Error, SensorError, TransportError};
use crate::fsm::context::FsmContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::power::{PersistedStats, PowerManager, PowerStats, SleepCommit, WakeCause};

use super::commands::AppCommand;
use super::events::AppEvent;
use super::ports::{
    BoardPort, EventSink, MeshSensorData, Reading, RetainedStatsPort, SensorPort, TransportPort,
};

// ───────────────────────────────────────────────────────────────
// Tick outcome
// ───────────────────────────────────────────────────────────────

/// What the driver loop must do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Wait `delay_ms` and tick again.
    Continue { delay_ms: u32 },
    /// Suspend the device as described.  For [`SleepMode::Deep`] this is
    /// the end of the current execution.
    Sleep(SleepCommit),
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService<S, T, B, R>
where
    S: SensorPort,
    T: TransportPort,
    B: BoardPort,
    R: RetainedStatsPort,
{
    fsm: Fsm,
    ctx: FsmContext,
    sensor: S,
    transport: T,
    power: PowerManager<B, R>,
    /// Set once a deep-sleep commit has been handed out.
    halted: Option<SleepCommit>,
    tick_count: u64,
}

impl<S, T, B, R> AppService<S, T, B, R>
where
    S: SensorPort,
    T: TransportPort,
    B: BoardPort,
    R: RetainedStatsPort,
{
    /// Construct the service from configuration and its collaborators.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(config: SystemConfig, sensor: S, transport: T, board: B, store: R) -> Self {
        let power = PowerManager::new(board, store, &config);
        let ctx = FsmContext::new(config);
        let fsm = Fsm::new(build_state_table(), StateId::Init);

        Self {
            fsm,
            ctx,
            sensor,
            transport,
            power,
            halted: None,
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Load persisted counters, classify this boot and start the FSM in
    /// `Init`.  Returns the wake cause for the driver's own use.
    pub fn start(&mut self, sink: &mut impl EventSink) -> WakeCause {
        let cause = self.power.boot();
        sink.emit(&AppEvent::BootClassified {
            cause,
            stats: self.power.stats(),
        });

        self.ctx.now_ms = self.power.now_ms();
        self.fsm.start(&mut self.ctx);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!("AppService started in {:?}", self.fsm.current_state());
        cause
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one scheduler step: state I/O → FSM → commands.
    ///
    /// After a deep-sleep commit the service is inert and keeps returning
    /// the same commit.
    pub fn tick(&mut self, sink: &mut impl EventSink) -> TickOutcome {
        if let Some(commit) = self.halted {
            return TickOutcome::Sleep(commit);
        }

        self.tick_count += 1;
        let prev_state = self.fsm.current_state();
        self.ctx.clear_step();
        self.ctx.now_ms = self.power.now_ms();

        // 1. I/O for the current state
        match prev_state {
            StateId::Init => {
                let result = self.bring_up(sink);
                self.ctx.inputs.bring_up = Some(result);
            }
            StateId::Measure if self.ctx.now_ms >= self.ctx.retry_at_ms => {
                let result = self.measure();
                self.ctx.inputs.measurement = Some(result);
            }
            StateId::Transmit => {
                let result = self.transmit(sink);
                self.ctx.inputs.transmission = Some(result);
            }
            _ => {}
        }
        self.ctx.now_ms = self.power.now_ms();

        // 2. FSM tick (pure state logic)
        self.fsm.tick(&mut self.ctx);
        self.report_step(sink);

        // 3. Commands requested by the handlers
        let outcome = self.execute_commands(sink);

        // 4. Emit state change if the FSM moved
        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            sink.emit(&AppEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
            if prev_state == StateId::Error {
                sink.emit(&AppEvent::Recovered { to: new_state });
            }
        }

        outcome
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command (button wake, console, test harness).
    pub fn handle_command(&mut self, cmd: AppCommand, sink: &mut impl EventSink) {
        match cmd {
            AppCommand::FactoryReset => {
                self.power.factory_reset_stats();
                if let Err(e) = self.transport.factory_reset() {
                    warn!("Mesh factory reset failed: {}", e);
                }
                sink.emit(&AppEvent::FactoryReset);
            }
            AppCommand::RunSelfTest => {
                let result = if self.ctx.initialized {
                    self.sensor.self_test()
                } else {
                    Err(SensorError::NotReady)
                };
                match result {
                    Ok(()) => info!("Sensor self-test passed"),
                    Err(e) => warn!("Sensor self-test failed: {}", e),
                }
                sink.emit(&AppEvent::SelfTest(result));
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current FSM state.
    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Total scheduler ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Whether Init has completed on this boot.
    pub fn is_initialized(&self) -> bool {
        self.ctx.initialized
    }

    /// Latest accepted reading.
    pub fn last_reading(&self) -> Option<Reading> {
        self.ctx.reading
    }

    pub fn retry_count(&self) -> u8 {
        self.ctx.retry.get()
    }

    pub fn last_measurement_ms(&self) -> u64 {
        self.ctx.last_measurement_ms
    }

    pub fn last_transmission_ms(&self) -> u64 {
        self.ctx.last_transmission_ms
    }

    pub fn persisted_stats(&self) -> PersistedStats {
        self.power.stats()
    }

    pub fn power_stats(&self) -> PowerStats {
        self.power.power_stats()
    }

    pub fn config(&self) -> &SystemConfig {
        &self.ctx.config
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn power(&self) -> &PowerManager<B, R> {
        &self.power
    }

    pub fn power_mut(&mut self) -> &mut PowerManager<B, R> {
        &mut self.power
    }

    // ── State I/O ─────────────────────────────────────────────

    /// Acquire peripherals and bring both capabilities up.
    fn bring_up(&mut self, sink: &mut impl EventSink) -> Result<(), Error> {
        self.power.init_peripherals()?;
        self.ctx.config.validate()?;
        self.power.sensor_power_on()?;
        self.sensor.init()?;
        self.sensor.configure(&self.ctx.config.sensor)?;
        self.transport.init(&self.ctx.config.transport)?;

        let provisioned = self.transport.is_provisioned();
        if !provisioned {
            info!("Mesh: not provisioned, enabling provisioning bearers");
            self.transport.enable_provisioning()?;
        }

        let info = *self.sensor.info();
        info!(
            "Sensor: {} by {} | T {:.0}..{:.0}\u{00b0}C \u{00b1}{:.1} | RH {:.0}..{:.0}% \u{00b1}{:.1} | {} ms",
            info.name,
            info.manufacturer,
            info.temp_range_celsius.0,
            info.temp_range_celsius.1,
            info.temp_accuracy_celsius,
            info.hum_range_percent.0,
            info.hum_range_percent.1,
            info.hum_accuracy_percent,
            info.measurement_time_ms,
        );

        let voltage = self.power.battery_voltage();
        let battery_percent = crate::power::battery_percent(voltage);
        info!("Battery: {:.2} V ({}%)", voltage, battery_percent);

        sink.emit(&AppEvent::NodeReady {
            sensor: info.name,
            battery_percent,
            provisioned,
        });
        Ok(())
    }

    /// Power the sensor if needed, trigger, wait, read.
    fn measure(&mut self) -> Result<Reading, SensorError> {
        if !self.power.is_sensor_powered() {
            self.power.sensor_power_on().map_err(|e| {
                warn!("Sensor power gate failed: {}", e);
                SensorError::NotReady
            })?;
        }

        self.sensor.trigger_measurement()?;
        self.power.delay_ms(self.sensor.info().measurement_time_ms);
        let mut reading = self.sensor.read()?;
        reading.timestamp = (self.power.now_ms() / 1000) as u32;
        Ok(reading)
    }

    /// Publish the latest accepted reading with a live battery level.
    fn transmit(&mut self, sink: &mut impl EventSink) -> Result<(), TransportError> {
        let Some(reading) = self.ctx.reading else {
            warn!("Transmit without an accepted reading");
            return Err(TransportError::InvalidParam);
        };

        let data = MeshSensorData {
            temperature: reading.temperature,
            humidity: reading.humidity,
            battery_percent: self.power.battery_level(),
            timestamp: reading.timestamp,
        };
        self.transport.send(&data)?;
        sink.emit(&AppEvent::Published(data));
        Ok(())
    }

    // ── Reporting ─────────────────────────────────────────────

    /// Translate this tick's inputs and the FSM's verdict into events.
    fn report_step(&self, sink: &mut impl EventSink) {
        let inputs = self.ctx.inputs;
        let retry = self.ctx.retry;

        if let Some(Err(e)) = inputs.bring_up {
            sink.emit(&AppEvent::BringUpFailed(e));
        }

        match inputs.measurement {
            Some(Ok(reading)) if reading.is_valid() => {
                if let Some(decision) = self.ctx.last_decision {
                    sink.emit(&AppEvent::MeasurementAccepted {
                        reading,
                        assessment: assess(reading.temperature, reading.humidity),
                        decision,
                    });
                }
            }
            Some(Ok(reading)) => {
                sink.emit(&AppEvent::ReadingDiscarded {
                    validity_flags: reading.validity_flags,
                });
            }
            Some(Err(error)) => {
                sink.emit(&AppEvent::MeasurementFailed {
                    error,
                    attempt: retry.get(),
                    max: retry.max(),
                });
                if self.fsm.current_state() == StateId::Measure {
                    sink.emit(&AppEvent::RetryScheduled {
                        at_ms: self.ctx.retry_at_ms,
                    });
                }
            }
            None => {}
        }

        match inputs.transmission {
            Some(Err(TransportError::NotProvisioned)) => {
                sink.emit(&AppEvent::PublishSkippedNotProvisioned);
            }
            Some(Err(error)) => {
                sink.emit(&AppEvent::TransmitFailed {
                    error,
                    attempt: retry.get(),
                    max: retry.max(),
                });
            }
            Some(Ok(())) | None => {}
        }
    }

    // ── Command execution ─────────────────────────────────────

    fn execute_commands(&mut self, sink: &mut impl EventSink) -> TickOutcome {
        let cmds = self.ctx.commands;

        if cmds.log_diagnostics {
            self.log_diagnostics(sink);
        }

        if cmds.sensor_reset {
            if let Err(e) = self.sensor.reset() {
                warn!("Sensor reset during recovery failed: {}", e);
            }
        }

        if let Some(duration_ms) = cmds.sleep_for_ms {
            return self.commit_sleep(duration_ms, sink);
        }

        TickOutcome::Continue {
            delay_ms: self.ctx.config.poll_interval_ms,
        }
    }

    fn log_diagnostics(&mut self, sink: &mut impl EventSink) {
        let battery_voltage = self.power.battery_voltage();
        let stats = self.power.stats();
        warn!(
            "Diagnostics: battery={:.2} V retries={}/{} boots={} wakeups={}",
            battery_voltage,
            self.ctx.retry.get(),
            self.ctx.retry.max(),
            stats.boot_count,
            stats.total_wakeups
        );
        sink.emit(&AppEvent::ErrorEntered { battery_voltage });
    }

    /// Account the cycle, persist, and hand the sleep to the driver.
    fn commit_sleep(&mut self, duration_ms: u64, sink: &mut impl EventSink) -> TickOutcome {
        let active_ms = self.ctx.active_ms();
        let mode = self.ctx.config.sleep_mode;

        match self.power.enter_sleep(mode, duration_ms, active_ms) {
            Ok(commit) => {
                let power = self.power.power_stats();
                info!(
                    "Power: avg {:.1} \u{00b5}A, est. {:.0} days",
                    power.avg_current_ua, power.estimated_battery_life_days
                );
                sink.emit(&AppEvent::SleepCommitted {
                    mode,
                    duration_ms,
                    power,
                });
                if mode == SleepMode::Deep {
                    self.halted = Some(commit);
                }
                TickOutcome::Sleep(commit)
            }
            Err(e) => {
                error!("Sleep commit failed: {}", e);
                self.fsm.force_transition(StateId::Error, &mut self.ctx);
                self.log_diagnostics(sink);
                TickOutcome::Continue {
                    delay_ms: self.ctx.config.poll_interval_ms,
                }
            }
        }
    }
}
