//! GreenIoT Sensor Node: Main Entry Point
//!
//! Hexagonal architecture with a tick-driven scheduler and deep sleep
//! between measurement cycles.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SensorKind<I2c>   MeshTransport   EspBoard     RtcStatsStore  │
//! │  (SensorPort)      (Transport)     (BoardPort)  (Retained)     │
//! │  NvsAdapter        LogEventSink    Watchdog                    │
//! │  (ConfigPort)      (EventSink)                                 │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  FSM · Publish policy · Retry · PowerManager           │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Driver loop: tick → delay | light sleep | deep sleep          │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_hal::delay::{Delay, FreeRtos};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::prelude::*;
use log::{info, warn};

use greeniot_node::adapters::board::{self, EspBoard};
use greeniot_node::adapters::device_id;
use greeniot_node::adapters::log_sink::LogEventSink;
use greeniot_node::adapters::mesh::MeshTransport;
use greeniot_node::adapters::nvs::NvsAdapter;
use greeniot_node::adapters::rtc_store::RtcStatsStore;
use greeniot_node::app::commands::AppCommand;
use greeniot_node::app::ports::ConfigPort;
use greeniot_node::app::service::{AppService, TickOutcome};
use greeniot_node::config::{SleepMode, SystemConfig};
use greeniot_node::drivers::watchdog::Watchdog;
use greeniot_node::pins;
use greeniot_node::power::WakeCause;
use greeniot_node::sensors::SensorKind;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    let node = device_id::node_name(&device_id::read_mac());
    info!("╔══════════════════════════════════════╗");
    info!("║  GreenIoT Sensor Node v{}         ║", env!("CARGO_PKG_VERSION"));
    info!("║  {}                          ║", node);
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let config = match NvsAdapter::new() {
        Ok(nvs) => match nvs.load() {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("NVS config load failed ({}), using defaults", e);
                SystemConfig::default()
            }
        },
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults", e);
            SystemConfig::default()
        }
    };
    let config = match config.validate() {
        Ok(()) => config,
        Err(e) => {
            warn!("Stored config rejected ({}), using defaults", e);
            SystemConfig::default()
        }
    };
    match serde_json::to_string(&config) {
        Ok(json) => info!("Config: {}", json),
        Err(e) => warn!("Config: not printable ({})", e),
    }
    if let Some(w) = config.cadence_warning() {
        warn!("Config: {}", w);
    }

    // ── 3. Construct adapters ─────────────────────────────────
    let peripherals = Peripherals::take()?;
    let i2c_config = I2cConfig::new().baudrate(pins::I2C_FREQ_HZ.Hz());
    // SDA = pins::I2C_SDA_GPIO, SCL = pins::I2C_SCL_GPIO
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio8,
        peripherals.pins.gpio9,
        &i2c_config,
    );
    // A missing bus or driver surfaces in Init as a bring-up failure.
    let sensor = SensorKind::select(config.sensor_type.as_str(), i2c, Delay::new_default());

    let mut sink = LogEventSink::new();
    let mut watchdog = Watchdog::default();

    // ── 4. Construct app service ──────────────────────────────
    let mut app = AppService::new(
        config,
        sensor,
        MeshTransport::new(),
        EspBoard::new(),
        RtcStatsStore::new(),
    );
    let wake = app.start(&mut sink);

    // A button wake asks for a sensor self-test once the node is up.
    let mut self_test_pending = wake == WakeCause::ExternalSignal;

    info!("System ready. Entering scheduler loop.");

    // ── 5. Scheduler loop ─────────────────────────────────────
    loop {
        watchdog.feed();

        if self_test_pending && app.is_initialized() {
            app.handle_command(AppCommand::RunSelfTest, &mut sink);
            self_test_pending = false;
        }

        match app.tick(&mut sink) {
            TickOutcome::Continue { delay_ms } => FreeRtos::delay_ms(delay_ms),
            TickOutcome::Sleep(commit) => match commit.mode {
                SleepMode::Light => {
                    watchdog.suspend();
                    if let Err(e) = board::light_sleep_start() {
                        warn!("Light sleep rejected ({}), idling instead", e);
                        FreeRtos::delay_ms(app.config().poll_interval_ms);
                    }
                    watchdog.resume();
                }
                SleepMode::Deep => {
                    watchdog.suspend();
                    board::deep_sleep_start();
                }
            },
        }
    }
}
