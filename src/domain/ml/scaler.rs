use crate::domain::errors::PredictorError;
use crate::domain::market::{BarTable, FeatureWindow};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Transforms a feature window into the space the model was trained in.
pub trait FeatureScaler: Send + Sync {
    fn transform(&self, window: &FeatureWindow<'_>) -> Result<FeatureWindow<'static>, PredictorError>;
}

/// Per-column standardization `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fits on the finite values of each feature column. Constant columns
    /// get a unit scale.
    pub fn fit(table: &BarTable) -> Self {
        let width = table.feature_width();
        let mut mean = Vec::with_capacity(width);
        let mut scale = Vec::with_capacity(width);

        let Some(all_rows) = table.window(table.len(), table.len()) else {
            return Self {
                mean: vec![0.0; width],
                scale: vec![1.0; width],
            };
        };

        for column in 0..width {
            let values: Vec<f64> = (0..all_rows.rows())
                .map(|row| all_rows.row(row)[column])
                .filter(|value| value.is_finite())
                .collect();

            if values.is_empty() {
                mean.push(0.0);
                scale.push(1.0);
                continue;
            }

            let column_mean = values.iter().mean();
            let std = values.iter().population_std_dev();
            mean.push(column_mean);
            scale.push(if std.is_finite() && std > f64::EPSILON {
                std
            } else {
                1.0
            });
        }

        Self { mean, scale }
    }
}

impl FeatureScaler for StandardScaler {
    fn transform(&self, window: &FeatureWindow<'_>) -> Result<FeatureWindow<'static>, PredictorError> {
        let width = window.width();
        if width != self.mean.len() || width != self.scale.len() {
            return Err(PredictorError::ShapeMismatch {
                expected: self.mean.len(),
                actual: width,
            });
        }

        let scaled = window
            .values()
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let column = i % width;
                (value - self.mean[column]) / self.scale[column]
            })
            .collect();

        Ok(FeatureWindow::owned(scaled, width))
    }
}
