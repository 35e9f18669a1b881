//! Power / persistence manager.
//!
//! Owns the only state that outlives a deep-sleep reset ([`PersistedStats`]),
//! the sensor power gate, battery estimation and sleep entry.
//!
//! ```text
//!  boot ──▶ persist_load ──▶ classify wake ──▶ boot_count += 1
//!                                                 │
//!   Sleep state ──▶ arm timer ──▶ update_stats ──▶ persist_store ──▶ gate off
//!                                                                    │
//!                                                         SleepCommit ▼
//!                                                       (driver powers down)
//! ```
//!
//! Deep sleep never returns on hardware, so [`PowerManager::enter_sleep`]
//! does everything up to the commit point and hands back a
//! [`SleepCommit`] for the driver loop to execute.

use log::{info, warn};

use crate::app::ports::{BoardPort, RetainedStatsPort};
use crate::config::{PowerProfile, SleepMode, SystemConfig};
use crate::error::PowerError;

// ---------------------------------------------------------------------------
// Battery model
// ---------------------------------------------------------------------------

/// Samples averaged per battery voltage estimate.
pub const BATTERY_ADC_SAMPLES: u32 = 10;
/// Spacing between battery samples (ms).
pub const BATTERY_SAMPLE_SPACING_MS: u32 = 1;
/// 12-bit ADC full-scale code.
pub const ADC_FULL_SCALE: f32 = 4095.0;
/// ADC reference at 11 dB attenuation (V).
pub const ADC_REFERENCE_V: f32 = 3.3;
/// Vbat → 100 kΩ → ADC → 100 kΩ → GND.
pub const BATTERY_DIVIDER_RATIO: f32 = 2.0;
/// Li-ion empty.
pub const BATTERY_V_MIN: f32 = 3.0;
/// Li-ion full.
pub const BATTERY_V_MAX: f32 = 4.2;
/// Sentinel returned when the ADC could not be read.
pub const INVALID_VOLTAGE: f32 = 0.0;

/// Convert an averaged ADC code to battery volts.
pub fn voltage_from_adc(raw: u16) -> f32 {
    (f32::from(raw) / ADC_FULL_SCALE) * ADC_REFERENCE_V * BATTERY_DIVIDER_RATIO
}

/// Linear state-of-charge estimate, truncated to whole percent.
///
/// `voltage <= 3.0 V` gives 0, `voltage >= 4.2 V` gives 100.  The
/// [`INVALID_VOLTAGE`] sentinel therefore reads as 0 %.
pub fn battery_percent(voltage: f32) -> u8 {
    if voltage.is_nan() || voltage <= BATTERY_V_MIN {
        return 0;
    }
    if voltage >= BATTERY_V_MAX {
        return 100;
    }
    let fraction = (voltage - BATTERY_V_MIN) / (BATTERY_V_MAX - BATTERY_V_MIN);
    (fraction * 100.0) as u8
}

// ---------------------------------------------------------------------------
// Persisted statistics
// ---------------------------------------------------------------------------

/// Counters kept in retained memory across deep-sleep resets.
///
/// Monotonically non-decreasing; only [`PowerManager::factory_reset_stats`]
/// clears them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistedStats {
    pub boot_count: u32,
    pub total_wakeups: u32,
    pub total_active_time_ms: u32,
    pub total_sleep_time_ms: u32,
}

impl PersistedStats {
    /// Size of the retained layout: four little-endian `u32`.
    pub const ENCODED_LEN: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..4].copy_from_slice(&self.boot_count.to_le_bytes());
        out[4..8].copy_from_slice(&self.total_wakeups.to_le_bytes());
        out[8..12].copy_from_slice(&self.total_active_time_ms.to_le_bytes());
        out[12..16].copy_from_slice(&self.total_sleep_time_ms.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::ENCODED_LEN]) -> Self {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self {
            boot_count: word(0),
            total_wakeups: word(4),
            total_active_time_ms: word(8),
            total_sleep_time_ms: word(12),
        }
    }

    /// Account for one boot of the given cause.
    pub fn record_boot(&mut self, cause: WakeCause) {
        self.boot_count = self.boot_count.saturating_add(1);
        if cause == WakeCause::Timer {
            self.total_wakeups = self.total_wakeups.saturating_add(1);
        }
    }

    /// Add one cycle's active and sleep time (saturating at `u32::MAX` ms).
    pub fn accumulate(&mut self, active_ms: u64, sleep_ms: u64) {
        let clamp = |ms: u64| u32::try_from(ms).unwrap_or(u32::MAX);
        self.total_active_time_ms = self.total_active_time_ms.saturating_add(clamp(active_ms));
        self.total_sleep_time_ms = self.total_sleep_time_ms.saturating_add(clamp(sleep_ms));
    }
}

// ---------------------------------------------------------------------------
// Wake cause
// ---------------------------------------------------------------------------

/// Raw wake source as reported by the platform sleep controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformWake {
    /// Not a wake from sleep (reset, brown-out, first power-up).
    Undefined,
    Timer,
    /// Single RTC GPIO (button).
    Ext0,
    /// RTC GPIO mask.
    Ext1,
    Other,
}

/// Boot classification used by the scheduler and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    PowerOn,
    Timer,
    ExternalSignal,
    Unknown,
}

/// Classify a boot.  A zero `boot_count` means the retained region was
/// empty, so this is a power-on regardless of what the platform says.
pub fn classify_wake(raw: PlatformWake, boot_count: u32) -> WakeCause {
    if boot_count == 0 {
        return WakeCause::PowerOn;
    }
    match raw {
        PlatformWake::Timer => WakeCause::Timer,
        PlatformWake::Ext0 | PlatformWake::Ext1 => WakeCause::ExternalSignal,
        PlatformWake::Undefined | PlatformWake::Other => WakeCause::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Power statistics (derived)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerStats {
    /// Duty-cycle weighted average draw, µA.
    pub avg_current_ua: f32,
    pub active_current_ua: f32,
    pub sleep_current_ua: f32,
    pub estimated_battery_life_days: f32,
}

impl PowerStats {
    /// Weighted average over the given active / sleep split.
    pub fn compute(profile: &PowerProfile, active_ms: u64, sleep_ms: u64) -> Self {
        let total_ms = active_ms.saturating_add(sleep_ms);
        let avg_current_ua = if total_ms == 0 {
            profile.sleep_current_ua
        } else {
            (profile.active_current_ua * active_ms as f32
                + profile.sleep_current_ua * sleep_ms as f32)
                / total_ms as f32
        };
        let estimated_battery_life_days = if avg_current_ua > 0.0 {
            profile.battery_capacity_mah / ((avg_current_ua / 1000.0) * 24.0)
        } else {
            0.0
        };
        Self {
            avg_current_ua,
            active_current_ua: profile.active_current_ua,
            sleep_current_ua: profile.sleep_current_ua,
            estimated_battery_life_days,
        }
    }
}

// ---------------------------------------------------------------------------
// Sleep commit
// ---------------------------------------------------------------------------

/// Everything up to the point of no return has been done; the driver
/// must now suspend the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepCommit {
    pub mode: SleepMode,
    pub duration_ms: u64,
    /// Counters as they were written to retained memory.
    pub stats: PersistedStats,
}

// ---------------------------------------------------------------------------
// PowerManager
// ---------------------------------------------------------------------------

pub struct PowerManager<B: BoardPort, R: RetainedStatsPort> {
    board: B,
    store: R,
    profile: PowerProfile,
    stabilization_ms: u32,
    stats: PersistedStats,
    power_stats: PowerStats,
    wake_cause: WakeCause,
    sensor_powered: bool,
}

impl<B: BoardPort, R: RetainedStatsPort> PowerManager<B, R> {
    pub fn new(board: B, store: R, config: &SystemConfig) -> Self {
        Self {
            board,
            store,
            profile: config.power,
            stabilization_ms: config.sensor_stabilization_ms,
            stats: PersistedStats::default(),
            power_stats: PowerStats::compute(&config.power, 0, 0),
            wake_cause: WakeCause::Unknown,
            sensor_powered: false,
        }
    }

    // ── Boot / persistence ────────────────────────────────────

    /// Load counters, classify this boot and count it.
    ///
    /// Call once per boot, before the scheduler starts.
    pub fn boot(&mut self) -> WakeCause {
        let loaded = self.persist_load();
        let cause = classify_wake(self.board.wake_source(), loaded.boot_count);
        self.stats.record_boot(cause);
        self.wake_cause = cause;
        info!(
            "Power: boot #{} cause={:?} wakeups={}",
            self.stats.boot_count, cause, self.stats.total_wakeups
        );
        cause
    }

    /// Read counters from retained memory (zeroed if the region is empty).
    pub fn persist_load(&mut self) -> PersistedStats {
        self.stats = self.store.load().unwrap_or_default();
        self.stats
    }

    /// Write the current counters to retained memory.
    pub fn persist_store(&mut self) {
        self.store.store(&self.stats);
    }

    /// Clear every counter and persist the zeroed block.
    pub fn factory_reset_stats(&mut self) {
        warn!("Power: factory reset of persisted statistics");
        self.stats = PersistedStats::default();
        self.power_stats = PowerStats::compute(&self.profile, 0, 0);
        self.persist_store();
    }

    pub fn stats(&self) -> PersistedStats {
        self.stats
    }

    pub fn power_stats(&self) -> PowerStats {
        self.power_stats
    }

    pub fn wake_cause(&self) -> WakeCause {
        self.wake_cause
    }

    /// Accumulate one cycle and recompute the derived statistics from the
    /// lifetime totals.
    pub fn update_stats(&mut self, active_ms: u64, sleep_ms: u64) -> PowerStats {
        self.stats.accumulate(active_ms, sleep_ms);
        self.power_stats = PowerStats::compute(
            &self.profile,
            u64::from(self.stats.total_active_time_ms),
            u64::from(self.stats.total_sleep_time_ms),
        );
        self.power_stats
    }

    // ── Peripherals ───────────────────────────────────────────

    /// Configure the power gate GPIO and the battery ADC channel.
    pub fn init_peripherals(&mut self) -> Result<(), PowerError> {
        self.board.init()
    }

    /// Averaged battery voltage, or [`INVALID_VOLTAGE`] if any sample fails.
    pub fn battery_voltage(&mut self) -> f32 {
        let mut sum: u32 = 0;
        for _ in 0..BATTERY_ADC_SAMPLES {
            match self.board.read_battery_raw() {
                Ok(raw) => sum += u32::from(raw),
                Err(e) => {
                    warn!("Power: battery ADC read failed ({}), reporting 0 V", e);
                    return INVALID_VOLTAGE;
                }
            }
            self.board.delay_ms(BATTERY_SAMPLE_SPACING_MS);
        }
        voltage_from_adc((sum / BATTERY_ADC_SAMPLES) as u16)
    }

    /// Current battery percentage (0 also means "ADC unavailable").
    pub fn battery_level(&mut self) -> u8 {
        battery_percent(self.battery_voltage())
    }

    /// Assert the sensor rail and wait for it to settle.
    pub fn sensor_power_on(&mut self) -> Result<(), PowerError> {
        self.board.set_sensor_power(true)?;
        self.board.delay_ms(self.stabilization_ms);
        self.sensor_powered = true;
        Ok(())
    }

    pub fn sensor_power_off(&mut self) -> Result<(), PowerError> {
        self.board.set_sensor_power(false)?;
        self.sensor_powered = false;
        Ok(())
    }

    pub fn is_sensor_powered(&self) -> bool {
        self.sensor_powered
    }

    // ── Sleep ─────────────────────────────────────────────────

    /// Arm the wake timer, then account the cycle, persist counters and
    /// cut sensor power.
    ///
    /// A timer that cannot be armed leaves the counters untouched: no
    /// sleep happens, so none is recorded.
    pub fn enter_sleep(
        &mut self,
        mode: SleepMode,
        duration_ms: u64,
        active_ms: u64,
    ) -> Result<SleepCommit, PowerError> {
        self.board.arm_wake_timer(duration_ms)?;
        self.update_stats(active_ms, duration_ms);
        self.persist_store();
        if let Err(e) = self.sensor_power_off() {
            warn!("Power: sensor gate off failed ({}), sleeping anyway", e);
        }
        info!("Power: committing {:?} sleep for {} ms", mode, duration_ms);
        Ok(SleepCommit {
            mode,
            duration_ms,
            stats: self.stats,
        })
    }

    // ── Time ──────────────────────────────────────────────────

    /// Monotonic milliseconds since boot.
    pub fn now_ms(&self) -> u64 {
        self.board.uptime_ms()
    }

    /// Bounded blocking wait.
    pub fn delay_ms(&mut self, ms: u32) {
        self.board.delay_ms(ms);
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn store(&self) -> &R {
        &self.store
    }
}
