//! ESP32-C3 board adapter.
//!
//! Implements [`BoardPort`]: the sensor power-gate GPIO, the battery ADC
//! (ADC1 oneshot), the platform wake cause, the sleep wake timer and the
//! monotonic clock.
//!
//! - **`target_os = "espidf"`**: raw ESP-IDF sys calls.
//! - **`not(target_os = "espidf")`**: a simulation backed by static
//!   atomics so host tools can inject battery and wake conditions.

use crate::app::ports::BoardPort;
use crate::error::PowerError;
use crate::pins;
use crate::power::PlatformWake;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

// ── Simulation state ──────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};

/// Simulated battery ADC code (~3.7 V through the divider).
#[cfg(not(target_os = "espidf"))]
static SIM_BATTERY_RAW: AtomicU16 = AtomicU16::new(2296);

#[cfg(not(target_os = "espidf"))]
static SIM_WAKE: AtomicU8 = AtomicU8::new(0);

#[cfg(not(target_os = "espidf"))]
static SIM_SENSOR_POWER: AtomicBool = AtomicBool::new(false);

/// Simulation: set the raw battery ADC code returned by the next reads.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_battery_raw(raw: u16) {
    SIM_BATTERY_RAW.store(raw, Ordering::Relaxed);
}

/// Simulation: set the wake source reported on the next boot.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_wake(wake: PlatformWake) {
    let code = match wake {
        PlatformWake::Undefined => 0,
        PlatformWake::Timer => 1,
        PlatformWake::Ext0 => 2,
        PlatformWake::Ext1 => 3,
        PlatformWake::Other => 4,
    };
    SIM_WAKE.store(code, Ordering::Relaxed);
}

/// Simulation: current level of the sensor power gate.
#[cfg(not(target_os = "espidf"))]
pub fn sim_sensor_powered() -> bool {
    SIM_SENSOR_POWER.load(Ordering::Relaxed)
}

// ── EspBoard ──────────────────────────────────────────────────

pub struct EspBoard {
    #[cfg(target_os = "espidf")]
    adc: adc_oneshot_unit_handle_t,
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for EspBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl EspBoard {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            adc: core::ptr::null_mut(),
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(target_os = "espidf")]
impl EspBoard {
    fn init_sensor_gate() -> Result<(), PowerError> {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pins::SENSOR_POWER_GPIO,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        // SAFETY: single-threaded boot path; the pin is owned by this adapter.
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(PowerError::Gpio(ret));
        }
        let ret = unsafe { gpio_set_level(pins::SENSOR_POWER_GPIO, 0) };
        if ret != ESP_OK as i32 {
            return Err(PowerError::Gpio(ret));
        }
        Ok(())
    }

    fn init_wake_button() -> Result<(), PowerError> {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pins::WAKE_BUTTON_GPIO,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(PowerError::Gpio(ret));
        }
        let ret = unsafe {
            esp_deep_sleep_enable_gpio_wakeup(
                1u64 << pins::WAKE_BUTTON_GPIO,
                esp_deepsleep_gpio_wake_up_mode_t_ESP_GPIO_WAKEUP_GPIO_LOW,
            )
        };
        if ret != ESP_OK as i32 {
            return Err(PowerError::Gpio(ret));
        }
        Ok(())
    }

    fn init_adc(&mut self) -> Result<(), PowerError> {
        if !self.adc.is_null() {
            return Ok(());
        }
        let init_cfg = adc_oneshot_unit_init_cfg_t {
            unit_id: adc_unit_t_ADC_UNIT_1,
            ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
            ..Default::default()
        };
        let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &mut self.adc) };
        if ret != ESP_OK as i32 {
            return Err(PowerError::Adc(ret));
        }

        let chan_cfg = adc_oneshot_chan_cfg_t {
            atten: adc_atten_t_ADC_ATTEN_DB_12,
            bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
        };
        let ret = unsafe { adc_oneshot_config_channel(self.adc, pins::BATTERY_ADC_CHANNEL, &chan_cfg) };
        if ret != ESP_OK as i32 {
            return Err(PowerError::Adc(ret));
        }
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
impl BoardPort for EspBoard {
    fn init(&mut self) -> Result<(), PowerError> {
        Self::init_sensor_gate()?;
        Self::init_wake_button()?;
        self.init_adc()?;
        info!(
            "Board: sensor gate GPIO{}, battery ADC1 CH{}, wake button GPIO{}",
            pins::SENSOR_POWER_GPIO,
            pins::BATTERY_ADC_CHANNEL,
            pins::WAKE_BUTTON_GPIO
        );
        Ok(())
    }

    fn set_sensor_power(&mut self, on: bool) -> Result<(), PowerError> {
        // SAFETY: pin configured as output in init(); main task only.
        let ret = unsafe { gpio_set_level(pins::SENSOR_POWER_GPIO, u32::from(on)) };
        if ret != ESP_OK as i32 {
            return Err(PowerError::Gpio(ret));
        }
        Ok(())
    }

    fn read_battery_raw(&mut self) -> Result<u16, PowerError> {
        if self.adc.is_null() {
            return Err(PowerError::Adc(ESP_ERR_INVALID_STATE as i32));
        }
        let mut raw: i32 = 0;
        // SAFETY: handle created in init_adc(); main task only.
        let ret = unsafe { adc_oneshot_read(self.adc, pins::BATTERY_ADC_CHANNEL, &mut raw) };
        if ret != ESP_OK as i32 {
            return Err(PowerError::Adc(ret));
        }
        Ok(raw.max(0) as u16)
    }

    fn wake_source(&self) -> PlatformWake {
        #[allow(non_upper_case_globals)]
        match unsafe { esp_sleep_get_wakeup_cause() } {
            esp_sleep_source_t_ESP_SLEEP_WAKEUP_UNDEFINED => PlatformWake::Undefined,
            esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => PlatformWake::Timer,
            esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT0 => PlatformWake::Ext0,
            esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT1 | esp_sleep_source_t_ESP_SLEEP_WAKEUP_GPIO => {
                PlatformWake::Ext1
            }
            _ => PlatformWake::Other,
        }
    }

    fn arm_wake_timer(&mut self, duration_ms: u64) -> Result<(), PowerError> {
        let ret = unsafe { esp_sleep_enable_timer_wakeup(duration_ms.saturating_mul(1000)) };
        if ret != ESP_OK as i32 {
            return Err(PowerError::WakeTimer(ret));
        }
        Ok(())
    }

    fn uptime_ms(&self) -> u64 {
        (unsafe { esp_timer_get_time() }) as u64 / 1000
    }

    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }
}

#[cfg(not(target_os = "espidf"))]
impl BoardPort for EspBoard {
    fn init(&mut self) -> Result<(), PowerError> {
        log::info!("Board(sim): peripherals simulated");
        Ok(())
    }

    fn set_sensor_power(&mut self, on: bool) -> Result<(), PowerError> {
        SIM_SENSOR_POWER.store(on, Ordering::Relaxed);
        Ok(())
    }

    fn read_battery_raw(&mut self) -> Result<u16, PowerError> {
        Ok(SIM_BATTERY_RAW.load(Ordering::Relaxed))
    }

    fn wake_source(&self) -> PlatformWake {
        match SIM_WAKE.load(Ordering::Relaxed) {
            0 => PlatformWake::Undefined,
            1 => PlatformWake::Timer,
            2 => PlatformWake::Ext0,
            3 => PlatformWake::Ext1,
            _ => PlatformWake::Other,
        }
    }

    fn arm_wake_timer(&mut self, duration_ms: u64) -> Result<(), PowerError> {
        log::debug!("Board(sim): wake timer armed for {} ms", duration_ms);
        Ok(())
    }

    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

// ── Sleep primitives (driver loop only) ───────────────────────

/// Power down until the armed wake source fires.  Never returns on target.
#[cfg(target_os = "espidf")]
pub fn deep_sleep_start() -> ! {
    info!("Board: entering deep sleep");
    unsafe { esp_deep_sleep_start() }
}

/// Simulation: there is nothing to reset into, so the process exits.
#[cfg(not(target_os = "espidf"))]
pub fn deep_sleep_start() -> ! {
    log::info!("Board(sim): deep sleep, exiting");
    std::process::exit(0)
}

/// Halt the CPU with RAM retained until the wake timer fires.
#[cfg(target_os = "espidf")]
pub fn light_sleep_start() -> Result<(), PowerError> {
    let ret = unsafe { esp_light_sleep_start() };
    if ret != ESP_OK as i32 {
        return Err(PowerError::WakeTimer(ret));
    }
    Ok(())
}

/// Simulation: no-op; the scheduler clock keeps running.
#[cfg(not(target_os = "espidf"))]
pub fn light_sleep_start() -> Result<(), PowerError> {
    Ok(())
}
