//! Deterministic predictors and synthetic bar tables for tests and dry runs.

use crate::domain::errors::PredictorError;
use crate::domain::market::{BarTable, FeatureWindow, MarketBar};
use crate::domain::ml::{Prediction, Predictor};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Always returns the same signal.
#[derive(Debug, Clone)]
pub struct ConstantPredictor {
    value: f64,
    std: f64,
}

impl ConstantPredictor {
    pub fn new(value: f64) -> Self {
        Self { value, std: 0.0 }
    }

    /// Reports `std` as the uncertainty of every prediction.
    pub fn with_std(mut self, std: f64) -> Self {
        self.std = std;
        self
    }
}

impl Predictor for ConstantPredictor {
    fn predict(&self, _window: &FeatureWindow<'_>) -> Result<f64, PredictorError> {
        Ok(self.value)
    }

    fn predict_with_uncertainty(
        &self,
        _window: &FeatureWindow<'_>,
        _n_samples: usize,
    ) -> Result<Prediction, PredictorError> {
        Ok(Prediction {
            mean: self.value,
            std: self.std,
        })
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Predictor backed by a closure over the window.
pub struct FnPredictor<F> {
    f: F,
}

impl<F> FnPredictor<F>
where
    F: Fn(&FeatureWindow<'_>) -> f64 + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(&FeatureWindow<'_>) -> f64 + Send + Sync,
{
    fn predict(&self, window: &FeatureWindow<'_>) -> Result<f64, PredictorError> {
        Ok((self.f)(window))
    }

    fn name(&self) -> &str {
        "fn"
    }
}

/// Fails on every call.
#[derive(Debug, Clone, Default)]
pub struct FailingPredictor;

impl Predictor for FailingPredictor {
    fn predict(&self, _window: &FeatureWindow<'_>) -> Result<f64, PredictorError> {
        Err(PredictorError::Inference("mock failure".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Wraps a predictor and counts how often it is invoked.
pub struct CountingPredictor<P> {
    inner: P,
    calls: AtomicUsize,
}

impl<P: Predictor> CountingPredictor<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<P: Predictor> Predictor for CountingPredictor<P> {
    fn predict(&self, window: &FeatureWindow<'_>) -> Result<f64, PredictorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.predict(window)
    }

    fn predict_with_uncertainty(
        &self,
        window: &FeatureWindow<'_>,
        n_samples: usize,
    ) -> Result<Prediction, PredictorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.predict_with_uncertainty(window, n_samples)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Hourly bars where each bar opens at the previous close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<MarketBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            MarketBar::new(
                i as i64 * 3_600_000,
                open,
                open.max(close),
                open.min(close),
                close,
                1_000.0,
            )
        })
        .collect()
}

/// Table whose single feature column is the close.
pub fn table_from_bars(bars: Vec<MarketBar>) -> BarTable {
    let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
    BarTable::new(bars)
        .and_then(|table| table.with_feature_columns(vec![("close".to_string(), closes)]))
        .unwrap_or_default()
}

pub fn table_from_closes(closes: &[f64]) -> BarTable {
    table_from_bars(bars_from_closes(closes))
}

/// `count` closes compounding by `step_pct` percent per bar.
pub fn compounding_closes(count: usize, start: f64, step_pct: f64) -> Vec<f64> {
    (0..count)
        .map(|i| start * (1.0 + step_pct / 100.0).powi(i as i32))
        .collect()
}

/// Deterministic zig-zag series with both winning and losing moves.
pub fn oscillating_closes(count: usize, start: f64, amplitude_pct: f64) -> Vec<f64> {
    (0..count)
        .map(|i| {
            let phase = i as f64 * 0.9;
            start * (1.0 + amplitude_pct / 100.0 * (phase.sin() + 0.5 * (phase * 0.37).cos()))
        })
        .collect()
}
