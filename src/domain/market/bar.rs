use crate::domain::errors::DataError;
use crate::domain::market::feature_window::FeatureWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One OHLCV candle. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl MarketBar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Immutable, time-ordered bar table with model feature columns and filter
/// indicator columns.
///
/// Features are stored row-major so that a lookback window over rows
/// `[start, end)` is one contiguous slice. Storage is reference counted:
/// cloning a table to attach extra indicator columns never copies bars or
/// features.
#[derive(Debug, Clone, Default)]
pub struct BarTable {
    bars: Arc<[MarketBar]>,
    feature_names: Arc<[String]>,
    features: Arc<[f64]>,
    indicators: BTreeMap<String, Arc<[f64]>>,
}

impl BarTable {
    /// Builds a table from raw bars, rejecting duplicate or out-of-order timestamps.
    pub fn new(bars: Vec<MarketBar>) -> Result<Self, DataError> {
        for (index, pair) in bars.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(DataError::NonMonotonicTimestamp {
                    index: index + 1,
                    timestamp: pair[1].timestamp,
                    previous: pair[0].timestamp,
                });
            }
        }

        Ok(Self {
            bars: bars.into(),
            ..Self::default()
        })
    }

    /// Replaces the model feature columns. Every column must have one value per bar.
    pub fn with_feature_columns(mut self, columns: Vec<(String, Vec<f64>)>) -> Result<Self, DataError> {
        let rows = self.bars.len();
        let width = columns.len();
        let mut names: Vec<String> = Vec::with_capacity(width);

        for (name, values) in &columns {
            if names.contains(name) {
                return Err(DataError::DuplicateColumn(name.clone()));
            }
            if values.len() != rows {
                return Err(DataError::ColumnLengthMismatch {
                    column: name.clone(),
                    expected: rows,
                    actual: values.len(),
                });
            }
            names.push(name.clone());
        }

        let mut features = Vec::with_capacity(rows * width);
        for row in 0..rows {
            for (_, values) in &columns {
                features.push(values[row]);
            }
        }

        self.feature_names = names.into();
        self.features = features.into();
        Ok(self)
    }

    /// Adds (or replaces) a named indicator column.
    pub fn with_indicator(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self, DataError> {
        let name = name.into();
        if values.len() != self.bars.len() {
            return Err(DataError::ColumnLengthMismatch {
                column: name,
                expected: self.bars.len(),
                actual: values.len(),
            });
        }
        if self.feature_names.contains(&name) {
            return Err(DataError::DuplicateColumn(name));
        }
        self.indicators.insert(name, values.into());
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[MarketBar] {
        &self.bars
    }

    pub fn bar(&self, index: usize) -> Option<&MarketBar> {
        self.bars.get(index)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn feature_width(&self) -> usize {
        self.feature_names.len()
    }

    pub fn has_indicator(&self, name: &str) -> bool {
        self.indicators.contains_key(name)
    }

    pub fn indicator_names(&self) -> impl Iterator<Item = &str> {
        self.indicators.keys().map(String::as_str)
    }

    pub fn indicator(&self, name: &str) -> Option<&[f64]> {
        self.indicators.get(name).map(|values| &values[..])
    }

    pub fn indicator_at(&self, name: &str, index: usize) -> Option<f64> {
        self.indicators.get(name).and_then(|values| values.get(index).copied())
    }

    /// Borrows the feature rows `[end - length, end)`.
    ///
    /// Returns `None` when the window would reach before the first bar or past
    /// the last one.
    pub fn window(&self, end: usize, length: usize) -> Option<FeatureWindow<'_>> {
        if length == 0 || end < length || end > self.bars.len() {
            return None;
        }
        let width = self.feature_width();
        let start = (end - length) * width;
        Some(FeatureWindow::borrowed(
            &self.features[start..end * width],
            width,
        ))
    }
}
