//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (sensor driver, mesh transport, board power, retained
//! memory, event sinks, storage) implement these traits.  The
//! [`AppService`](super::service::AppService) consumes them via generics,
//! so the domain core never touches hardware directly.
//!
//! ## Contract notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **TransportPort::send** MUST report an unprovisioned node as
//!   [`TransportError::NotProvisioned`], never as a generic send failure.
//! - **RetainedStatsPort** implementations MUST reject a region that was
//!   never written (power-on garbage) by returning `None`.

use crate::config::{SensorConfig, SystemConfig, TransportConfig};
use crate::error::{PowerError, SensorError, TransportError};
use crate::power::{PersistedStats, PlatformWake};

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// One temperature/humidity sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// °C
    pub temperature: f32,
    /// %RH
    pub humidity: f32,
    /// Seconds since boot at which the sample was taken.
    pub timestamp: u32,
    /// Bit 7 = temperature valid, bit 6 = humidity valid.
    pub validity_flags: u8,
}

impl Reading {
    pub const TEMPERATURE_VALID: u8 = 0x80;
    pub const HUMIDITY_VALID: u8 = 0x40;
    pub const ALL_VALID: u8 = Self::TEMPERATURE_VALID | Self::HUMIDITY_VALID;

    /// A reading with both validity bits set.
    pub fn valid(temperature: f32, humidity: f32, timestamp: u32) -> Self {
        Self {
            temperature,
            humidity,
            timestamp,
            validity_flags: Self::ALL_VALID,
        }
    }

    /// Accepted only if both channels are flagged valid.
    pub fn is_valid(&self) -> bool {
        self.validity_flags & Self::ALL_VALID == Self::ALL_VALID
    }
}

/// Static description of a sensor part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorInfo {
    pub name: &'static str,
    pub manufacturer: &'static str,
    pub temp_range_celsius: (f32, f32),
    pub hum_range_percent: (f32, f32),
    pub temp_accuracy_celsius: f32,
    pub hum_accuracy_percent: f32,
    /// Worst-case conversion time after a trigger.
    pub measurement_time_ms: u32,
    pub power_active_ua: u32,
    pub power_sleep_ua: u32,
}

/// Temperature/humidity sensor capability.
pub trait SensorPort {
    /// Probe and soft-reset the part.
    fn init(&mut self) -> Result<(), SensorError>;

    /// Start a single-shot conversion.
    fn trigger_measurement(&mut self) -> Result<(), SensorError>;

    /// Fetch the result of the last conversion.
    fn read(&mut self) -> Result<Reading, SensorError>;

    /// Enter the part's low-power mode.
    fn sleep(&mut self) -> Result<(), SensorError>;

    fn wakeup(&mut self) -> Result<(), SensorError>;

    /// Built-in self check (status register, heater, etc.).
    fn self_test(&mut self) -> Result<(), SensorError>;

    /// Soft reset, used by error recovery.
    fn reset(&mut self) -> Result<(), SensorError>;

    fn configure(&mut self, config: &SensorConfig) -> Result<(), SensorError>;

    fn info(&self) -> &SensorInfo;
}

// ───────────────────────────────────────────────────────────────
// Transport port (driven adapter: domain → mesh network)
// ───────────────────────────────────────────────────────────────

/// Outbound publish payload, built fresh for every transmission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshSensorData {
    pub temperature: f32,
    pub humidity: f32,
    pub battery_percent: u8,
    /// Seconds since boot of the reading being published.
    pub timestamp: u32,
}

/// Mesh node feature bits reported in [`TransportStatus::features`].
pub mod features {
    pub const RELAY: u8 = 1 << 0;
    pub const PROXY: u8 = 1 << 1;
    pub const FRIEND: u8 = 1 << 2;
    pub const LOW_POWER: u8 = 1 << 3;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStatus {
    pub initialized: bool,
    pub provisioned: bool,
    /// Primary element unicast address (0 when unprovisioned).
    pub address: u16,
    /// Bitmask of [`features`].
    pub features: u8,
    pub uptime_s: u32,
}

/// Wireless mesh transport capability.
pub trait TransportPort {
    fn init(&mut self, config: &TransportConfig) -> Result<(), TransportError>;

    /// Start advertising as an unprovisioned device.
    fn enable_provisioning(&mut self) -> Result<(), TransportError>;

    fn is_provisioned(&self) -> bool;

    fn send(&mut self, data: &MeshSensorData) -> Result<(), TransportError>;

    fn status(&self) -> TransportStatus;

    /// Leave the network and forget keys.
    fn factory_reset(&mut self) -> Result<(), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Board port (driven adapter: power gate, battery ADC, sleep timer)
// ───────────────────────────────────────────────────────────────

/// Power-related board hardware, owned by the
/// [`PowerManager`](crate::power::PowerManager).
pub trait BoardPort {
    /// Configure the sensor power-gate GPIO and the battery ADC channel.
    fn init(&mut self) -> Result<(), PowerError>;

    fn set_sensor_power(&mut self, on: bool) -> Result<(), PowerError>;

    /// One raw 12-bit sample of the divided battery voltage.
    fn read_battery_raw(&mut self) -> Result<u16, PowerError>;

    /// What woke the chip on this boot.
    fn wake_source(&self) -> PlatformWake;

    fn arm_wake_timer(&mut self, duration_ms: u64) -> Result<(), PowerError>;

    /// Monotonic milliseconds since boot.
    fn uptime_ms(&self) -> u64;

    /// Bounded blocking delay.
    fn delay_ms(&mut self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Retained statistics port (driven adapter: RTC memory)
// ───────────────────────────────────────────────────────────────

/// Storage for [`PersistedStats`] that survives a deep-sleep reset.
pub trait RetainedStatsPort {
    /// `None` if the region holds no valid block.
    fn load(&self) -> Option<PersistedStats>;

    fn store(&mut self, stats: &PersistedStats);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST run [`SystemConfig::validate`] before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}

