//! Crop growth-condition assessment for accepted readings.
//!
//! Bands are tuned for basil: optimal 18–25 °C and 60–70 %RH.  The result
//! is informational only and is attached to the measurement event.

/// Where a value sits relative to the optimal band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    TooLow,
    BelowOptimal,
    Optimal,
    AboveOptimal,
    TooHigh,
}

impl Band {
    pub fn is_optimal(self) -> bool {
        self == Self::Optimal
    }
}

/// Band edges: `[too_low_below, optimal_from, optimal_to, too_high_above]`.
struct Bands([f32; 4]);

impl Bands {
    fn classify(&self, value: f32) -> Band {
        let [low, opt_lo, opt_hi, high] = self.0;
        if value < low {
            Band::TooLow
        } else if value < opt_lo {
            Band::BelowOptimal
        } else if value <= opt_hi {
            Band::Optimal
        } else if value <= high {
            Band::AboveOptimal
        } else {
            Band::TooHigh
        }
    }
}

const BASIL_TEMPERATURE: Bands = Bands([15.0, 18.0, 25.0, 30.0]);
const BASIL_HUMIDITY: Bands = Bands([40.0, 60.0, 70.0, 80.0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthAssessment {
    pub temperature: Band,
    pub humidity: Band,
}

impl GrowthAssessment {
    pub fn all_optimal(&self) -> bool {
        self.temperature.is_optimal() && self.humidity.is_optimal()
    }
}

pub fn assess(temperature_c: f32, humidity_percent: f32) -> GrowthAssessment {
    GrowthAssessment {
        temperature: BASIL_TEMPERATURE.classify(temperature_c),
        humidity: BASIL_HUMIDITY.classify(humidity_percent),
    }
}
