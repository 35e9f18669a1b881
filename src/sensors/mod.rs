//! Sensor drivers and the factory that picks one from the configured
//! sensor type.
//!
//! [`SensorKind`] is a closed enum over the supported parts; it forwards
//! every [`SensorPort`] call to the selected driver so the application
//! service stays generic over a single concrete type.
//!
//! When no driver can be built (unknown type, bus bring-up failed) the
//! node still boots with [`SensorKind::Unavailable`], whose `init` fails
//! so the scheduler lands in its Error state.

pub mod sht31;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{error, info, warn};

use crate::app::ports::{Reading, SensorInfo, SensorPort};
use crate::config::SensorConfig;
use crate::error::SensorError;
use sht31::Sht31;

/// Sensor type names with a driver in this build.
pub const SUPPORTED_TYPES: &[&str] = &[sht31::INFO.name];

pub fn is_supported(sensor_type: &str) -> bool {
    SUPPORTED_TYPES.iter().any(|name| sensor_type.eq_ignore_ascii_case(name))
}

const NO_SENSOR: SensorInfo = SensorInfo {
    name: "none",
    manufacturer: "-",
    temp_range_celsius: (0.0, 0.0),
    hum_range_percent: (0.0, 0.0),
    temp_accuracy_celsius: 0.0,
    hum_accuracy_percent: 0.0,
    measurement_time_ms: 0,
    power_active_ua: 0,
    power_sleep_ua: 0,
};

pub enum SensorKind<I2C, D> {
    Sht31(Sht31<I2C, D>),
    /// Placeholder carrying the reason no driver could be built.
    Unavailable(SensorError),
}

impl<I2C: I2c, D: DelayNs> SensorKind<I2C, D> {
    /// Build the driver registered under `sensor_type` (case-insensitive).
    pub fn from_type(sensor_type: &str, i2c: I2C, delay: D) -> Result<Self, SensorError> {
        if sensor_type.eq_ignore_ascii_case(sht31::INFO.name) {
            info!("Sensor: selected {}", sht31::INFO.name);
            return Ok(Self::Sht31(Sht31::new(i2c, delay)));
        }
        error!("Sensor: no driver for type {:?}", sensor_type);
        Err(SensorError::UnknownType)
    }

    /// Like [`from_type`](Self::from_type), but never fails: a bus error or
    /// an unknown type yields [`SensorKind::Unavailable`].
    pub fn select<E: core::fmt::Debug>(sensor_type: &str, i2c: Result<I2C, E>, delay: D) -> Self {
        let i2c = match i2c {
            Ok(bus) => bus,
            Err(e) => {
                warn!("Sensor: I2C bus unavailable ({:?})", e);
                return Self::Unavailable(SensorError::Comm);
            }
        };
        Self::from_type(sensor_type, i2c, delay).unwrap_or_else(Self::Unavailable)
    }

    fn driver(&mut self) -> Result<&mut dyn SensorPort, SensorError> {
        match self {
            Self::Sht31(s) => Ok(s),
            Self::Unavailable(e) => Err(*e),
        }
    }
}

impl<I2C: I2c, D: DelayNs> SensorPort for SensorKind<I2C, D> {
    fn init(&mut self) -> Result<(), SensorError> {
        self.driver()?.init()
    }

    fn trigger_measurement(&mut self) -> Result<(), SensorError> {
        self.driver()?.trigger_measurement()
    }

    fn read(&mut self) -> Result<Reading, SensorError> {
        self.driver()?.read()
    }

    fn sleep(&mut self) -> Result<(), SensorError> {
        self.driver()?.sleep()
    }

    fn wakeup(&mut self) -> Result<(), SensorError> {
        self.driver()?.wakeup()
    }

    fn self_test(&mut self) -> Result<(), SensorError> {
        self.driver()?.self_test()
    }

    fn reset(&mut self) -> Result<(), SensorError> {
        self.driver()?.reset()
    }

    fn configure(&mut self, config: &SensorConfig) -> Result<(), SensorError> {
        self.driver()?.configure(config)
    }

    fn info(&self) -> &SensorInfo {
        match self {
            Self::Sht31(s) => s.info(),
            Self::Unavailable(_) => &NO_SENSOR,
        }
    }
}
