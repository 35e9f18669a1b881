//! Retained statistics store.
//!
//! Implements [`RetainedStatsPort`] on top of RTC slow memory, the only RAM
//! that survives a deep-sleep reset on the ESP32-C3.
//!
//! Layout (24 bytes): `magic: u32 LE | checksum: u32 LE | stats: [u8; 16]`.
//! The region is zeroed by a power-on reset, so a missing magic or a
//! checksum mismatch is treated as "no data" and the counters start over.
//!
//! On the host the region is a process-wide static behind a mutex so that
//! tests can drop a store and build a new one to emulate a reboot.

use crate::app::ports::RetainedStatsPort;
use crate::power::PersistedStats;

/// Marks an initialised region ("GRNS").
pub const RTC_MAGIC: u32 = 0x4752_4E53;

const STATS_LEN: usize = PersistedStats::ENCODED_LEN;
const REGION_LEN: usize = 8 + STATS_LEN;

type Region = [u8; REGION_LEN];

/// FNV-1a over the stats bytes.
fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811C_9DC5_u32, |h, &b| {
        (h ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}

fn encode(stats: &PersistedStats) -> Region {
    let body = stats.to_bytes();
    let mut region = [0u8; REGION_LEN];
    region[0..4].copy_from_slice(&RTC_MAGIC.to_le_bytes());
    region[4..8].copy_from_slice(&checksum(&body).to_le_bytes());
    region[8..].copy_from_slice(&body);
    region
}

fn decode(region: &Region) -> Option<PersistedStats> {
    let magic = u32::from_le_bytes([region[0], region[1], region[2], region[3]]);
    if magic != RTC_MAGIC {
        return None;
    }
    let stored = u32::from_le_bytes([region[4], region[5], region[6], region[7]]);
    let mut body = [0u8; STATS_LEN];
    body.copy_from_slice(&region[8..]);
    if checksum(&body) != stored {
        log::warn!("RTC: statistics checksum mismatch, discarding");
        return None;
    }
    Some(PersistedStats::from_bytes(&body))
}

// ── Backing region ────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod region {
    use core::cell::UnsafeCell;

    use super::{Region, REGION_LEN};

    struct RtcCell(UnsafeCell<Region>);

    // Only the main task touches the region.
    unsafe impl Sync for RtcCell {}

    #[unsafe(link_section = ".rtc.data")]
    static RTC_REGION: RtcCell = RtcCell(UnsafeCell::new([0u8; REGION_LEN]));

    pub fn read() -> Region {
        unsafe { *RTC_REGION.0.get() }
    }

    pub fn write(region: &Region) {
        unsafe { *RTC_REGION.0.get() = *region }
    }
}

#[cfg(not(target_os = "espidf"))]
mod region {
    use std::sync::Mutex;

    use super::{Region, REGION_LEN};

    static SIM_REGION: Mutex<Region> = Mutex::new([0u8; REGION_LEN]);

    pub fn read() -> Region {
        match SIM_REGION.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn write(region: &Region) {
        match SIM_REGION.lock() {
            Ok(mut guard) => *guard = *region,
            Err(poisoned) => *poisoned.into_inner() = *region,
        }
    }
}

/// Simulation: wipe the retained region, as a power-on reset would.
#[cfg(not(target_os = "espidf"))]
pub fn sim_power_cycle() {
    region::write(&[0u8; REGION_LEN]);
}

/// Simulation: flip one byte of the stored counters.
#[cfg(not(target_os = "espidf"))]
pub fn sim_corrupt() {
    let mut r = region::read();
    r[REGION_LEN - 1] ^= 0xFF;
    region::write(&r);
}

// ── RtcStatsStore ─────────────────────────────────────────────

/// Handle to the single retained statistics block.
#[derive(Debug, Default)]
pub struct RtcStatsStore;

impl RtcStatsStore {
    pub fn new() -> Self {
        Self
    }
}

impl RetainedStatsPort for RtcStatsStore {
    fn load(&self) -> Option<PersistedStats> {
        decode(&region::read())
    }

    fn store(&mut self, stats: &PersistedStats) {
        region::write(&encode(stats));
    }
}
