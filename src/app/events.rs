//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, count them in a test,
//! forward them to a diagnostics characteristic, etc.

use crate::assessment::GrowthAssessment;
use crate::config::SleepMode;
use crate::error::{Error, SensorError, TransportError};
use crate::fsm::StateId;
use crate::policy::PublishDecision;
use crate::power::{PersistedStats, PowerStats, WakeCause};

use super::ports::{MeshSensorData, Reading};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The application service has started (carries initial state).
    Started(StateId),

    /// This boot was classified and counted.
    BootClassified {
        cause: WakeCause,
        stats: PersistedStats,
    },

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// Init completed; capabilities are up.
    NodeReady {
        sensor: &'static str,
        battery_percent: u8,
        provisioned: bool,
    },

    /// Init failed; the FSM is headed for Error.
    BringUpFailed(Error),

    /// A valid reading was stored.
    MeasurementAccepted {
        reading: Reading,
        assessment: GrowthAssessment,
        decision: PublishDecision,
    },

    /// A reading arrived without both validity bits.
    ReadingDiscarded { validity_flags: u8 },

    /// Trigger or read failed; `attempt` counts against `max`.
    MeasurementFailed {
        error: SensorError,
        attempt: u8,
        max: u8,
    },

    /// Another Measure attempt is scheduled for `at_ms`.
    RetryScheduled { at_ms: u64 },

    /// A sensor payload went out over the mesh.
    Published(MeshSensorData),

    /// Publish skipped because the node has no network yet.
    PublishSkippedNotProvisioned,

    /// Send failed with a fault other than `NotProvisioned`.
    TransmitFailed {
        error: TransportError,
        attempt: u8,
        max: u8,
    },

    /// Statistics were persisted and the device is about to sleep.
    SleepCommitted {
        mode: SleepMode,
        duration_ms: u64,
        power: PowerStats,
    },

    /// The Error state was entered; carries the diagnostic battery reading.
    ErrorEntered { battery_voltage: f32 },

    /// Error recovery finished.
    Recovered { to: StateId },

    /// Result of an on-demand sensor self-test.
    SelfTest(Result<(), SensorError>),

    /// Persisted statistics and mesh membership were wiped.
    FactoryReset,
}
