//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production).  Lines follow a
//! `TAG | key=value` layout so the serial capture can be grepped.

use log::{debug, error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AppEvent::BootClassified { cause, stats } => {
                info!(
                    "BOOT  | cause={:?} | boots={} wakeups={} | active={}ms sleep={}ms",
                    cause,
                    stats.boot_count,
                    stats.total_wakeups,
                    stats.total_active_time_ms,
                    stats.total_sleep_time_ms,
                );
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::NodeReady {
                sensor,
                battery_percent,
                provisioned,
            } => {
                info!(
                    "READY | sensor={} | batt={}% | mesh={}",
                    sensor,
                    battery_percent,
                    if *provisioned { "provisioned" } else { "unprovisioned" },
                );
            }
            AppEvent::BringUpFailed(e) => {
                error!("INIT  | failed: {}", e);
            }
            AppEvent::MeasurementAccepted {
                reading,
                assessment,
                decision,
            } => {
                info!(
                    "MEAS  | T={:.2}\u{00b0}C H={:.1}% | t={}s | crop={:?}/{:?} | publish={:?}",
                    reading.temperature,
                    reading.humidity,
                    reading.timestamp,
                    assessment.temperature,
                    assessment.humidity,
                    decision,
                );
            }
            AppEvent::ReadingDiscarded { validity_flags } => {
                warn!("MEAS  | discarded, flags=0b{:08b}", validity_flags);
            }
            AppEvent::MeasurementFailed {
                error: e,
                attempt,
                max,
            } => {
                warn!("MEAS  | failed: {} ({}/{})", e, attempt, max);
            }
            AppEvent::RetryScheduled { at_ms } => {
                debug!("MEAS  | retry at {}ms", at_ms);
            }
            AppEvent::Published(data) => {
                info!(
                    "TX    | T={:.1}\u{00b0}C H={:.1}% batt={}% t={}s",
                    data.temperature, data.humidity, data.battery_percent, data.timestamp,
                );
            }
            AppEvent::PublishSkippedNotProvisioned => {
                info!("TX    | skipped, node not provisioned");
            }
            AppEvent::TransmitFailed {
                error: e,
                attempt,
                max,
            } => {
                warn!("TX    | failed: {} ({}/{})", e, attempt, max);
            }
            AppEvent::SleepCommitted {
                mode,
                duration_ms,
                power,
            } => {
                info!(
                    "SLEEP | {:?} for {}ms | avg={:.1}uA | life={:.0}d",
                    mode, duration_ms, power.avg_current_ua, power.estimated_battery_life_days,
                );
            }
            AppEvent::ErrorEntered { battery_voltage } => {
                error!("ERROR | entered, battery={:.2}V", battery_voltage);
            }
            AppEvent::Recovered { to } => {
                info!("ERROR | recovered -> {:?}", to);
            }
            AppEvent::SelfTest(result) => match result {
                Ok(()) => info!("TEST  | sensor self-test passed"),
                Err(e) => warn!("TEST  | sensor self-test failed: {}", e),
            },
            AppEvent::FactoryReset => {
                warn!("RESET | statistics and mesh membership cleared");
            }
        }
    }
}
