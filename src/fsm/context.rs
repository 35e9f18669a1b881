//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that state handlers read from and
//! write to.  It contains the I/O results gathered for the current tick,
//! the command block the service executes after the tick, the timing
//! baselines and the retry budget.  Think of it as the "blackboard" in a
//! blackboard architecture.

use crate::app::ports::Reading;
use crate::config::SystemConfig;
use crate::error::{Error, SensorError, TransportError};
use crate::policy::{PublishDecision, PublishPolicy};

// ---------------------------------------------------------------------------
// Retry budget
// ---------------------------------------------------------------------------

/// Consecutive recoverable failures, bounded by `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    count: u8,
    max: u8,
}

impl RetryCounter {
    pub fn new(max: u8) -> Self {
        Self { count: 0, max }
    }

    /// Count one failure.  Returns `true` once the budget is exhausted.
    pub fn increment(&mut self) -> bool {
        if self.count < self.max {
            self.count += 1;
        }
        self.count >= self.max
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn get(&self) -> u8 {
        self.count
    }

    pub fn max(&self) -> u8 {
        self.max
    }
}

// ---------------------------------------------------------------------------
// Per-tick inputs (written by the service before the FSM tick)
// ---------------------------------------------------------------------------

/// Results of the I/O the service performed for the current state.
/// `None` means the operation was not attempted this tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepInputs {
    /// Outcome of the Init bring-up sequence.
    pub bring_up: Option<Result<(), Error>>,
    /// Outcome of trigger + read in Measure.
    pub measurement: Option<Result<Reading, SensorError>>,
    /// Outcome of `send` in Transmit.
    pub transmission: Option<Result<(), TransportError>>,
}

// ---------------------------------------------------------------------------
// Node commands (written by handlers; executed by the service)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCommands {
    /// Persist statistics and commit a sleep of this many milliseconds.
    pub sleep_for_ms: Option<u64>,
    /// Log battery and retry context (on Error entry).
    pub log_diagnostics: bool,
    /// Soft-reset the sensor (on Error recovery).
    pub sensor_reset: bool,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext {
    // -- Timing --
    /// Monotonic milliseconds since boot, sampled after this tick's I/O.
    pub now_ms: u64,
    /// `now_ms` at the moment the current state was entered.
    pub state_entered_ms: u64,
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,
    /// Monotonic total tick count.
    pub total_ticks: u64,

    // -- Baselines --
    pub last_measurement_ms: u64,
    pub last_transmission_ms: u64,
    /// Earliest time the next Measure attempt may run.
    pub retry_at_ms: u64,
    /// Set once Init has completed on this boot.
    pub initialized: bool,

    // -- Data --
    /// Latest accepted reading.
    pub reading: Option<Reading>,
    /// Accepted reading before `reading`, for threshold comparison.
    pub previous_reading: Option<Reading>,
    /// Publish decision taken for the latest accepted reading.
    pub last_decision: Option<PublishDecision>,
    pub retry: RetryCounter,

    // -- I/O exchange --
    pub inputs: StepInputs,
    pub commands: NodeCommands,

    // -- Configuration --
    pub config: SystemConfig,
    pub policy: PublishPolicy,
}

impl FsmContext {
    /// Create a new context with the given configuration.
    pub fn new(config: SystemConfig) -> Self {
        Self {
            now_ms: 0,
            state_entered_ms: 0,
            ticks_in_state: 0,
            total_ticks: 0,
            last_measurement_ms: 0,
            last_transmission_ms: 0,
            retry_at_ms: 0,
            initialized: false,
            reading: None,
            previous_reading: None,
            last_decision: None,
            retry: RetryCounter::new(config.max_retries),
            inputs: StepInputs::default(),
            commands: NodeCommands::default(),
            policy: PublishPolicy::from_config(&config),
            config,
        }
    }

    /// Active time charged to the cycle: elapsed since the last accepted
    /// measurement.
    pub fn active_ms(&self) -> u64 {
        self.now_ms.saturating_sub(self.last_measurement_ms)
    }

    /// Drop the previous tick's inputs and executed commands.
    pub fn clear_step(&mut self) {
        self.inputs = StepInputs::default();
        self.commands = NodeCommands::default();
    }

    /// Milliseconds spent in the current state.
    pub fn ms_in_state(&self) -> u64 {
        self.now_ms.saturating_sub(self.state_entered_ms)
    }

    /// Accept a validated reading, shifting the old one into `previous_reading`.
    pub fn store_reading(&mut self, reading: Reading) {
        self.previous_reading = self.reading.replace(reading);
    }
}
