use crate::domain::trading::Side;
use serde::{Deserialize, Serialize};

/// How the predictor output is read against `prediction_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalMode {
    /// Output is P(up): long if >= threshold, short if <= 1 - threshold
    #[default]
    Probability,
    /// Output is an expected return: long if >= threshold, short if <= -threshold
    Regression,
}

impl SignalMode {
    pub fn is_probability(&self) -> bool {
        *self == SignalMode::Probability
    }

    /// True if `value` crosses the threshold in the direction of `side`.
    pub fn signals(&self, side: Side, value: f64, threshold: f64) -> bool {
        match (self, side) {
            (SignalMode::Probability, Side::Long) => value >= threshold,
            (SignalMode::Probability, Side::Short) => value <= 1.0 - threshold,
            (SignalMode::Regression, Side::Long) => value >= threshold,
            (SignalMode::Regression, Side::Short) => value <= -threshold,
        }
    }
}
