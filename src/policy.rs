//! Publish policy: decides whether a fresh reading should be transmitted.
//!
//! Two independent triggers, OR-ed:
//!
//! 1. the transmission interval has elapsed since the last publish;
//! 2. temperature or humidity moved by at least its change threshold
//!    relative to the previous accepted reading.
//!
//! The policy holds only thresholds.  The scheduler owns the previous
//! reading and the last transmission timestamp.

use crate::app::ports::Reading;
use crate::config::SystemConfig;

/// Why a publish is (or is not) due.  Interval takes precedence when
/// several triggers fire at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishDecision {
    IntervalElapsed,
    TemperatureDelta,
    HumidityDelta,
    NotDue,
}

impl PublishDecision {
    pub fn is_due(self) -> bool {
        !matches!(self, Self::NotDue)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishPolicy {
    pub transmission_interval_ms: u64,
    pub temp_change_threshold: f32,
    pub hum_change_threshold: f32,
}

impl PublishPolicy {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            transmission_interval_ms: config.transmission_interval_ms(),
            temp_change_threshold: config.temp_change_threshold,
            hum_change_threshold: config.hum_change_threshold,
        }
    }

    pub fn evaluate(
        &self,
        reading: &Reading,
        previous: Option<&Reading>,
        now_ms: u64,
        last_transmission_ms: u64,
    ) -> PublishDecision {
        if now_ms.saturating_sub(last_transmission_ms) >= self.transmission_interval_ms {
            return PublishDecision::IntervalElapsed;
        }

        let Some(prev) = previous else {
            return PublishDecision::NotDue;
        };

        if (reading.temperature - prev.temperature).abs() >= self.temp_change_threshold {
            return PublishDecision::TemperatureDelta;
        }
        if (reading.humidity - prev.humidity).abs() >= self.hum_change_threshold {
            return PublishDecision::HumidityDelta;
        }

        PublishDecision::NotDue
    }
}
