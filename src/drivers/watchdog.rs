//! Task Watchdog Timer (TWDT) driver.
//!
//! Resets the node if the driver loop stops iterating.  The loop feeds it
//! once per scheduler tick.  Light sleep can last a full measurement
//! interval, far past the timeout, so the task is unsubscribed for the
//! duration with [`Watchdog::suspend`] and re-added with
//! [`Watchdog::resume`].

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use log::{info, warn};

/// Default timeout, matching `CONFIG_ESP_TASK_WDT_TIMEOUT_S`.
pub const WATCHDOG_TIMEOUT_MS: u32 = 10_000;

pub struct Watchdog {
    timeout_ms: u32,
    subscribed: bool,
    feeds: u32,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(WATCHDOG_TIMEOUT_MS)
    }
}

impl Watchdog {
    /// Reconfigure the TWDT and subscribe the calling task.
    pub fn new(timeout_ms: u32) -> Self {
        #[cfg(target_os = "espidf")]
        {
            let cfg = esp_task_wdt_config_t {
                timeout_ms,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            let ret = unsafe { esp_task_wdt_reconfigure(&cfg) };
            if ret != ESP_OK as i32 {
                warn!("Watchdog: reconfigure returned {} (already configured?)", ret);
            }
        }

        let mut wdt = Self {
            timeout_ms,
            subscribed: false,
            feeds: 0,
        };
        wdt.resume();
        if wdt.subscribed {
            info!("Watchdog: subscribed ({} ms timeout, panic on trigger)", timeout_ms);
        }
        wdt
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Number of feeds since construction.
    pub fn feeds(&self) -> u32 {
        self.feeds
    }

    /// Feed the watchdog.  Must be called at least once per timeout.
    pub fn feed(&mut self) {
        if !self.subscribed {
            return;
        }
        #[cfg(target_os = "espidf")]
        unsafe {
            esp_task_wdt_reset();
        }
        self.feeds = self.feeds.wrapping_add(1);
    }

    /// Unsubscribe before a long blocking wait (light sleep).
    pub fn suspend(&mut self) {
        if !self.subscribed {
            return;
        }
        #[cfg(target_os = "espidf")]
        {
            let ret = unsafe { esp_task_wdt_delete(core::ptr::null_mut()) };
            if ret != ESP_OK as i32 {
                warn!("Watchdog: unsubscribe failed ({})", ret);
                return;
            }
        }
        self.subscribed = false;
    }

    /// Re-subscribe after [`suspend`](Self::suspend).
    pub fn resume(&mut self) {
        if self.subscribed {
            return;
        }
        #[cfg(target_os = "espidf")]
        {
            let ret = unsafe { esp_task_wdt_add(core::ptr::null_mut()) };
            if ret != ESP_OK as i32 {
                warn!("Watchdog: failed to subscribe ({})", ret);
                return;
            }
        }
        self.subscribed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feeds_only_count_while_subscribed() {
        let mut wdt = Watchdog::default();
        assert!(wdt.is_subscribed());
        assert_eq!(wdt.timeout_ms(), WATCHDOG_TIMEOUT_MS);
        wdt.feed();
        wdt.suspend();
        wdt.feed();
        assert!(!wdt.is_subscribed());
        wdt.resume();
        wdt.feed();
        assert_eq!(wdt.feeds(), 2);
    }
}
