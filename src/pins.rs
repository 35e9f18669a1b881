//! GPIO / peripheral pin assignments for the GreenIoT sensor board
//! (ESP32-C3).
//!
//! Single source of truth: every adapter references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Sensor power gate
// ---------------------------------------------------------------------------

/// Digital output driving the sensor supply switch (HIGH = powered).
pub const SENSOR_POWER_GPIO: i32 = 10;

// ---------------------------------------------------------------------------
// Battery monitor
// ---------------------------------------------------------------------------

/// Battery divider tap on GPIO 0 = ADC1 channel 0.
pub const BATTERY_ADC_CHANNEL: u32 = 0;

// ---------------------------------------------------------------------------
// I²C bus (SHT31)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 8;
pub const I2C_SCL_GPIO: i32 = 9;
/// Standard-mode bus clock.
pub const I2C_FREQ_HZ: u32 = 100_000;

// ---------------------------------------------------------------------------
// User button (active-low, deep-sleep wake source)
// ---------------------------------------------------------------------------

/// Must be an RTC-capable pin (GPIO 0–5 on the C3) to wake from deep sleep.
pub const WAKE_BUTTON_GPIO: i32 = 3;
