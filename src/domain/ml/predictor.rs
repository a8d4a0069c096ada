use crate::domain::errors::PredictorError;
use crate::domain::market::FeatureWindow;

/// Point estimate with its spread across repeated stochastic inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub mean: f64,
    pub std: f64,
}

impl Prediction {
    pub fn certain(mean: f64) -> Self {
        Self { mean, std: 0.0 }
    }

    pub fn is_finite(&self) -> bool {
        self.mean.is_finite() && self.std.is_finite()
    }
}

/// Forecasting model seen by the backtest engine.
///
/// Implementations must be pure from the engine's point of view: the same
/// window always yields the same output.
pub trait Predictor: Send + Sync {
    /// Probability (0.0 to 1.0) or expected return for the next bar
    fn predict(&self, window: &FeatureWindow<'_>) -> Result<f64, PredictorError>;

    /// Mean and standard deviation over `n_samples` stochastic passes.
    /// Deterministic models report zero spread.
    fn predict_with_uncertainty(
        &self,
        window: &FeatureWindow<'_>,
        _n_samples: usize,
    ) -> Result<Prediction, PredictorError> {
        self.predict(window).map(Prediction::certain)
    }

    /// Get model name/type
    fn name(&self) -> &str;
}
