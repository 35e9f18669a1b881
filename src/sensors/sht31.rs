//! Sensirion SHT31 temperature / humidity sensor (I²C).
//!
//! Single-shot mode without clock stretching: the host sends a measurement
//! command, waits for the conversion, then reads 6 bytes
//! (`T_msb T_lsb T_crc H_msb H_lsb H_crc`).
//!
//! Generic over any `embedded_hal` 1.0 I²C bus and delay provider, so the
//! same driver runs on the ESP-IDF `I2cDriver` and on a fake bus in tests.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use log::{debug, info, warn};

use crate::app::ports::{Reading, SensorInfo, SensorPort};
use crate::config::{Precision, SensorConfig};
use crate::error::SensorError;

pub const ADDR_DEFAULT: u8 = 0x44;
/// ADDR pin tied high.
pub const ADDR_ALT: u8 = 0x45;

const CMD_MEAS_HIGH: u16 = 0x2400;
const CMD_MEAS_MED: u16 = 0x240B;
const CMD_MEAS_LOW: u16 = 0x2416;
const CMD_SOFT_RESET: u16 = 0x30A2;
const CMD_HEATER_ON: u16 = 0x306D;
const CMD_HEATER_OFF: u16 = 0x3066;
const CMD_READ_STATUS: u16 = 0xF32D;

const RESET_TIME_MS: u32 = 2;

/// Status register: bit 10 (command error) | bit 0 (write checksum error).
const STATUS_ERROR_MASK: u16 = 0x0401;

pub const INFO: SensorInfo = SensorInfo {
    name: "SHT31",
    manufacturer: "Sensirion",
    temp_range_celsius: (-40.0, 125.0),
    hum_range_percent: (0.0, 100.0),
    temp_accuracy_celsius: 0.3,
    hum_accuracy_percent: 2.0,
    measurement_time_ms: 15,
    power_active_ua: 800,
    power_sleep_ua: 2,
};

/// CRC-8, polynomial 0x31, init 0xFF (Sensirion).
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

pub fn raw_to_celsius(raw: u16) -> f32 {
    -45.0 + 175.0 * (f32::from(raw) / 65535.0)
}

pub fn raw_to_percent(raw: u16) -> f32 {
    100.0 * (f32::from(raw) / 65535.0)
}

/// Conversion time for the given repeatability setting.
pub fn measurement_time_ms(precision: Precision) -> u32 {
    match precision {
        Precision::High => 15,
        Precision::Medium => 6,
        Precision::Low => 4,
    }
}

fn measure_command(precision: Precision) -> u16 {
    match precision {
        Precision::High => CMD_MEAS_HIGH,
        Precision::Medium => CMD_MEAS_MED,
        Precision::Low => CMD_MEAS_LOW,
    }
}

fn map_bus_error(kind: ErrorKind) -> SensorError {
    match kind {
        // The part NACKs a read while the conversion is still running.
        ErrorKind::NoAcknowledge(_) => SensorError::Timeout,
        _ => SensorError::Comm,
    }
}

/// Split a `word word_crc` triple, verifying the checksum.
fn checked_word(chunk: &[u8]) -> Result<u16, SensorError> {
    if crc8(&chunk[0..2]) != chunk[2] {
        return Err(SensorError::Crc);
    }
    Ok(u16::from_be_bytes([chunk[0], chunk[1]]))
}

pub struct Sht31<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    config: SensorConfig,
    initialized: bool,
    measurement_pending: bool,
}

impl<I2C: I2c, D: DelayNs> Sht31<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self {
            i2c,
            delay,
            address: ADDR_DEFAULT,
            config: SensorConfig::default(),
            initialized: false,
            measurement_pending: false,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Release the bus and delay provider.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn command_at(&mut self, address: u8, command: u16) -> Result<(), SensorError> {
        self.i2c
            .write(address, &command.to_be_bytes())
            .map_err(|e| map_bus_error(e.kind()))
    }

    fn command(&mut self, command: u16) -> Result<(), SensorError> {
        self.command_at(self.address, command)
    }

    fn require_ready(&self) -> Result<(), SensorError> {
        if self.initialized {
            Ok(())
        } else {
            Err(SensorError::NotReady)
        }
    }
}

impl<I2C: I2c, D: DelayNs> SensorPort for Sht31<I2C, D> {
    fn init(&mut self) -> Result<(), SensorError> {
        self.initialized = false;
        let mut found = None;
        for address in [ADDR_DEFAULT, ADDR_ALT] {
            if self.command_at(address, CMD_SOFT_RESET).is_ok() {
                found = Some(address);
                break;
            }
        }
        let Some(address) = found else {
            warn!("SHT31: no answer at 0x{:02X} or 0x{:02X}", ADDR_DEFAULT, ADDR_ALT);
            return Err(SensorError::Init);
        };
        self.address = address;
        self.delay.delay_ms(RESET_TIME_MS);
        self.initialized = true;
        self.measurement_pending = false;
        info!("SHT31: ready at 0x{:02X}", address);
        Ok(())
    }

    fn trigger_measurement(&mut self) -> Result<(), SensorError> {
        self.require_ready()?;
        self.command(measure_command(self.config.precision))?;
        self.measurement_pending = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Reading, SensorError> {
        self.require_ready()?;
        if !self.measurement_pending {
            return Err(SensorError::NotReady);
        }
        let mut buf = [0u8; 6];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(|e| map_bus_error(e.kind()))?;
        self.measurement_pending = false;

        let t_raw = checked_word(&buf[0..3])?;
        let h_raw = checked_word(&buf[3..6])?;

        let temperature = raw_to_celsius(t_raw) + self.config.temp_offset_celsius;
        let humidity =
            (raw_to_percent(h_raw) + self.config.hum_offset_percent).clamp(0.0, 100.0);

        let mut validity_flags = Reading::ALL_VALID;
        let (t_min, t_max) = INFO.temp_range_celsius;
        if !(t_min..=t_max).contains(&temperature) {
            validity_flags &= !Reading::TEMPERATURE_VALID;
        }

        debug!("SHT31: {:.2}\u{00b0}C {:.1}%RH flags=0x{:02X}", temperature, humidity, validity_flags);
        Ok(Reading {
            temperature,
            humidity,
            timestamp: 0,
            validity_flags,
        })
    }

    fn sleep(&mut self) -> Result<(), SensorError> {
        // Idles at ~0.2 µA between single-shot conversions.
        self.require_ready()
    }

    fn wakeup(&mut self) -> Result<(), SensorError> {
        self.require_ready()
    }

    fn self_test(&mut self) -> Result<(), SensorError> {
        self.require_ready()?;
        self.command(CMD_READ_STATUS)?;
        let mut buf = [0u8; 3];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(|e| map_bus_error(e.kind()))?;
        let status = checked_word(&buf)?;
        if status & STATUS_ERROR_MASK != 0 {
            warn!("SHT31: self-test status 0x{:04X}", status);
            return Err(SensorError::Init);
        }
        info!("SHT31: self-test passed (status 0x{:04X})", status);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), SensorError> {
        self.command(CMD_SOFT_RESET)?;
        self.delay.delay_ms(RESET_TIME_MS);
        self.measurement_pending = false;
        Ok(())
    }

    fn configure(&mut self, config: &SensorConfig) -> Result<(), SensorError> {
        if !(-10.0..=10.0).contains(&config.temp_offset_celsius)
            || !(-20.0..=20.0).contains(&config.hum_offset_percent)
        {
            return Err(SensorError::InvalidParam);
        }
        self.config = *config;
        let heater = if config.enable_heater {
            CMD_HEATER_ON
        } else {
            CMD_HEATER_OFF
        };
        self.command(heater)
    }

    fn info(&self) -> &SensorInfo {
        &INFO
    }
}
