//! Unified error types for the GreenIoT node firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! driver loop's error handling uniform.  All variants are `Copy` so they
//! can be stored in the FSM context and carried in events without
//! allocation.

use core::fmt;

use crate::app::ports::ConfigError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The environmental sensor failed.
    Sensor(SensorError),
    /// The mesh transport failed.
    Transport(TransportError),
    /// Power gating, battery ADC or the wake timer failed.
    Power(PowerError),
    /// Peripheral acquisition failed during boot.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Power(e) => write!(f, "power: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Device did not answer during initialisation.
    Init,
    /// Bus transaction failed.
    Comm,
    /// Measurement did not complete in time.
    Timeout,
    /// Checksum over the returned data did not match.
    Crc,
    /// Reading is outside the physically plausible range.
    OutOfRange,
    /// Driver used before `init()` succeeded.
    NotReady,
    /// Configuration value rejected by the driver.
    InvalidParam,
    /// No driver is registered for the requested sensor type.
    UnknownType,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "initialisation failed"),
            Self::Comm => write!(f, "bus communication failed"),
            Self::Timeout => write!(f, "measurement timed out"),
            Self::Crc => write!(f, "CRC mismatch"),
            Self::OutOfRange => write!(f, "reading out of range"),
            Self::NotReady => write!(f, "sensor not ready"),
            Self::InvalidParam => write!(f, "invalid parameter"),
            Self::UnknownType => write!(f, "unknown sensor type"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Radio or mesh stack bring-up failed.
    Init,
    /// Provisioning bearers could not be enabled.
    Provision,
    /// The node has not been admitted to a mesh network yet.
    NotProvisioned,
    /// Publication was rejected by the stack.
    Send,
    /// Payload or configuration value rejected.
    InvalidParam,
}

impl TransportError {
    /// `NotProvisioned` is an expected precondition, not a fault.
    pub const fn is_expected(self) -> bool {
        matches!(self, Self::NotProvisioned)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "mesh init failed"),
            Self::Provision => write!(f, "provisioning enable failed"),
            Self::NotProvisioned => write!(f, "node not provisioned"),
            Self::Send => write!(f, "publish failed"),
            Self::InvalidParam => write!(f, "invalid parameter"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Power errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerError {
    /// GPIO configuration or write failed (rc from the platform).
    Gpio(i32),
    /// ADC unit or channel setup / read failed.
    Adc(i32),
    /// Wake timer could not be armed.
    WakeTimer(i32),
}

impl fmt::Display for PowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpio(rc) => write!(f, "GPIO failed (rc={rc})"),
            Self::Adc(rc) => write!(f, "ADC failed (rc={rc})"),
            Self::WakeTimer(rc) => write!(f, "wake timer failed (rc={rc})"),
        }
    }
}

impl From<PowerError> for Error {
    fn from(e: PowerError) -> Self {
        Self::Power(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
            ConfigError::NotFound => Self::Config("not found"),
            ConfigError::Corrupted => Self::Config("corrupted"),
            ConfigError::StorageFull => Self::Config("storage full"),
            ConfigError::IoError => Self::Config("I/O error"),
        }
    }
}

impl std::error::Error for Error {}
impl std::error::Error for SensorError {}
impl std::error::Error for TransportError {}
impl std::error::Error for PowerError {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_nests_subsystem_message() {
        let e: Error = SensorError::Crc.into();
        assert_eq!(e.to_string(), "sensor: CRC mismatch");

        let e: Error = PowerError::Adc(-1).into();
        assert_eq!(e.to_string(), "power: ADC failed (rc=-1)");
    }

    #[test]
    fn config_validation_message_is_kept() {
        let e: Error = ConfigError::ValidationFailed("max_retries must be 1–10").into();
        assert_eq!(e, Error::Config("max_retries must be 1–10"));
    }

    #[test]
    fn only_not_provisioned_is_expected() {
        assert!(TransportError::NotProvisioned.is_expected());
        for e in [
            TransportError::Init,
            TransportError::Provision,
            TransportError::Send,
            TransportError::InvalidParam,
        ] {
            assert!(!e.is_expected(), "{e:?}");
        }
    }
}
