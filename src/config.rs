//! System configuration parameters
//!
//! All tunable parameters for the GreenIoT sensor node.
//! Loaded once at boot through the [`ConfigPort`](crate::app::ports::ConfigPort)
//! (NVS-backed) and read-only to the core afterwards.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Maximum length of the sensor type identifier (e.g. `"SHT31"`).
pub const SENSOR_TYPE_MAX_LEN: usize = 16;

/// Sensor type identifier string.
pub type SensorType = heapless::String<SENSOR_TYPE_MAX_LEN>;

// ---------------------------------------------------------------------------
// Sub-configurations
// ---------------------------------------------------------------------------

/// How the Sleep state suspends the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SleepMode {
    /// Destructive reset with timer wake; execution restarts at `Init`.
    Deep,
    /// CPU halts with RAM retained; the scheduler resumes in `Idle`.
    Light,
}

/// Measurement repeatability / duration trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    Low,
    Medium,
    High,
}

/// Driver-level sensor settings passed to `SensorPort::configure`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub precision: Precision,
    /// Calibration offset added to every temperature sample (°C).
    pub temp_offset_celsius: f32,
    /// Calibration offset added to every humidity sample (%RH).
    pub hum_offset_percent: f32,
    /// Internal heater (condensation burn-off).
    pub enable_heater: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            precision: Precision::High,
            temp_offset_celsius: 0.0,
            hum_offset_percent: 0.0,
            enable_heater: false,
        }
    }
}

/// Bearer used while waiting for a provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningBearer {
    Adv,
    Gatt,
}

/// Mesh transport bring-up parameters passed to `TransportPort::init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Bluetooth SIG company identifier (Espressif).
    pub company_id: u16,
    pub product_id: u16,
    pub bearer: ProvisioningBearer,
    /// Run as a Low Power Node once provisioned.
    pub low_power_node: bool,
    /// Default TTL for published messages.
    pub publish_ttl: u8,
    /// LPN poll timeout towards the Friend node (ms).
    pub lpn_poll_timeout_ms: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            company_id: 0x02E5,
            product_id: 0x0001,
            bearer: ProvisioningBearer::Adv,
            low_power_node: true,
            publish_ttl: 7,
            lpn_poll_timeout_ms: 10_000,
        }
    }
}

/// Current draw model used for power statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerProfile {
    /// Average draw while awake (MCU + sensor), µA.
    pub active_current_ua: f32,
    /// Draw while in deep sleep, µA.
    pub sleep_current_ua: f32,
    /// Radio transmit burst, µA.
    pub radio_tx_current_ua: f32,
    /// Radio receive window, µA.
    pub radio_rx_current_ua: f32,
    /// Light sleep with the LPN polling its Friend, µA.
    pub lpn_sleep_current_ua: f32,
    /// Nominal cell capacity, mAh.
    pub battery_capacity_mah: f32,
}

impl Default for PowerProfile {
    fn default() -> Self {
        Self {
            active_current_ua: 5_000.0,
            sleep_current_ua: 10.0,
            radio_tx_current_ua: 12_000.0,
            radio_rx_current_ua: 11_000.0,
            lpn_sleep_current_ua: 800.0,
            battery_capacity_mah: 3_000.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SystemConfig
// ---------------------------------------------------------------------------

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Scheduling ---
    /// Time between measurements, also the deep-sleep duration (seconds)
    pub measurement_interval_sec: u32,
    /// Maximum time between publications (seconds)
    pub transmission_interval_sec: u32,
    /// Consecutive recoverable failures tolerated before `Error`
    pub max_retries: u8,

    // --- Sensor ---
    /// Factory identifier of the fitted sensor
    pub sensor_type: SensorType,
    pub sensor: SensorConfig,

    // --- Publish thresholds ---
    /// Temperature change that forces an immediate publish (°C)
    pub temp_change_threshold: f32,
    /// Humidity change that forces an immediate publish (%RH)
    pub hum_change_threshold: f32,

    // --- Power ---
    /// Go to Sleep after every measurement instead of idling
    pub auto_sleep: bool,
    pub sleep_mode: SleepMode,
    pub power: PowerProfile,

    // --- Timing ---
    /// Driver loop re-entry delay while idling (ms)
    pub poll_interval_ms: u32,
    /// Wait between measurement retries (ms)
    pub retry_backoff_ms: u32,
    /// Time spent in `Error` before recovery (ms)
    pub error_recovery_ms: u32,
    /// Sensor power-rail settle time (ms)
    pub sensor_stabilization_ms: u32,

    // --- Mesh ---
    pub transport: TransportConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut sensor_type = SensorType::new();
        // "SHT31" always fits in SENSOR_TYPE_MAX_LEN.
        let _ = sensor_type.push_str("SHT31");

        Self {
            // Scheduling
            measurement_interval_sec: 300, // 5 min
            transmission_interval_sec: 300,
            max_retries: 3,

            // Sensor
            sensor_type,
            sensor: SensorConfig::default(),

            // Publish thresholds
            temp_change_threshold: 1.0,
            hum_change_threshold: 5.0,

            // Power
            auto_sleep: true,
            sleep_mode: SleepMode::Deep,
            power: PowerProfile::default(),

            // Timing
            poll_interval_ms: 100,
            retry_backoff_ms: 1_000,
            error_recovery_ms: 5_000,
            sensor_stabilization_ms: 50,

            // Mesh
            transport: TransportConfig::default(),
        }
    }
}

impl SystemConfig {
    pub fn measurement_interval_ms(&self) -> u64 {
        u64::from(self.measurement_interval_sec) * 1000
    }

    pub fn transmission_interval_ms(&self) -> u64 {
        u64::from(self.transmission_interval_sec) * 1000
    }

    /// Range-check every field.
    ///
    /// Out-of-range values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(10..=86_400).contains(&self.measurement_interval_sec) {
            return Err(ConfigError::ValidationFailed(
                "measurement_interval_sec must be 10–86400",
            ));
        }
        if !(10..=86_400).contains(&self.transmission_interval_sec) {
            return Err(ConfigError::ValidationFailed(
                "transmission_interval_sec must be 10–86400",
            ));
        }
        if !(1..=10).contains(&self.max_retries) {
            return Err(ConfigError::ValidationFailed("max_retries must be 1–10"));
        }
        if self.sensor_type.is_empty() {
            return Err(ConfigError::ValidationFailed("sensor_type must not be empty"));
        }
        if !crate::sensors::is_supported(self.sensor_type.as_str()) {
            return Err(ConfigError::ValidationFailed("sensor_type has no driver"));
        }
        if !(0.1..=20.0).contains(&self.temp_change_threshold) {
            return Err(ConfigError::ValidationFailed(
                "temp_change_threshold must be 0.1–20.0",
            ));
        }
        if !(0.5..=50.0).contains(&self.hum_change_threshold) {
            return Err(ConfigError::ValidationFailed(
                "hum_change_threshold must be 0.5–50.0",
            ));
        }
        if !(-10.0..=10.0).contains(&self.sensor.temp_offset_celsius) {
            return Err(ConfigError::ValidationFailed(
                "sensor.temp_offset_celsius must be -10.0–10.0",
            ));
        }
        if !(-20.0..=20.0).contains(&self.sensor.hum_offset_percent) {
            return Err(ConfigError::ValidationFailed(
                "sensor.hum_offset_percent must be -20.0–20.0",
            ));
        }
        if !(10..=10_000).contains(&self.poll_interval_ms) {
            return Err(ConfigError::ValidationFailed("poll_interval_ms must be 10–10000"));
        }
        if self.retry_backoff_ms > 60_000 {
            return Err(ConfigError::ValidationFailed("retry_backoff_ms must be ≤ 60000"));
        }
        if self.error_recovery_ms > 600_000 {
            return Err(ConfigError::ValidationFailed(
                "error_recovery_ms must be ≤ 600000",
            ));
        }
        if self.sensor_stabilization_ms > 1_000 {
            return Err(ConfigError::ValidationFailed(
                "sensor_stabilization_ms must be ≤ 1000",
            ));
        }
        if self.power.battery_capacity_mah <= 0.0
            || self.power.active_current_ua <= 0.0
            || self.power.sleep_current_ua <= 0.0
        {
            return Err(ConfigError::ValidationFailed(
                "power profile currents and capacity must be positive",
            ));
        }
        if self.transport.publish_ttl == 0 || self.transport.publish_ttl > 127 {
            return Err(ConfigError::ValidationFailed("transport.publish_ttl must be 1–127"));
        }
        Ok(())
    }

    /// Flags a valid but self-defeating cadence.
    ///
    /// A deep-sleeping node reboots into `Init` every cycle and re-baselines,
    /// so the transmission interval never elapses when it exceeds the
    /// measurement interval. Only the change thresholds can then publish.
    pub fn cadence_warning(&self) -> Option<&'static str> {
        if self.sleep_mode == SleepMode::Deep
            && self.auto_sleep
            && self.transmission_interval_sec > self.measurement_interval_sec
        {
            return Some(
                "deep sleep with transmission_interval_sec > measurement_interval_sec: \
                 interval publishes never fire",
            );
        }
        None
    }
}
