use crate::domain::errors::PredictorError;
use crate::domain::market::FeatureWindow;
use crate::domain::ml::Predictor;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::RandomForestRegressor;
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

type ForestModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Which part of the lookback window the model consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputLayout {
    /// All rows, flattened row-major
    #[default]
    Flatten,
    /// Only the most recent row
    LastRow,
}

/// Random forest regressor trained offline and stored as smartcore JSON.
pub struct SmartCorePredictor {
    model: ForestModel,
    model_path: PathBuf,
    layout: InputLayout,
    expected_inputs: Option<usize>,
}

impl SmartCorePredictor {
    /// Loads the model; an unreadable file is fatal.
    pub fn load(model_path: impl AsRef<Path>, layout: InputLayout) -> Result<Self, PredictorError> {
        let model_path = model_path.as_ref().to_path_buf();
        let file = File::open(&model_path).map_err(|e| {
            PredictorError::NotLoaded(format!("{}: {}", model_path.display(), e))
        })?;

        let model: ForestModel = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            PredictorError::NotLoaded(format!(
                "failed to deserialize {}: {}",
                model_path.display(),
                e
            ))
        })?;

        info!("Loaded random forest model from {:?}", model_path);
        Ok(Self {
            model,
            model_path,
            layout,
            expected_inputs: None,
        })
    }

    /// Rejects windows whose model input length differs from `inputs`.
    pub fn with_expected_inputs(mut self, inputs: usize) -> Self {
        self.expected_inputs = Some(inputs);
        self
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn input_vector(&self, window: &FeatureWindow<'_>) -> Result<Vec<f64>, PredictorError> {
        let input = match self.layout {
            InputLayout::Flatten => window.values().to_vec(),
            InputLayout::LastRow => window
                .last_row()
                .map(<[f64]>::to_vec)
                .ok_or_else(|| PredictorError::Inference("empty window".to_string()))?,
        };

        if let Some(expected) = self.expected_inputs
            && expected != input.len()
        {
            return Err(PredictorError::ShapeMismatch {
                expected,
                actual: input.len(),
            });
        }

        Ok(input)
    }
}

impl Predictor for SmartCorePredictor {
    fn predict(&self, window: &FeatureWindow<'_>) -> Result<f64, PredictorError> {
        let input = self.input_vector(window)?;
        let matrix = DenseMatrix::from_2d_vec(&vec![input])
            .map_err(|e| PredictorError::Inference(format!("Matrix creation failed: {}", e)))?;

        let predictions = self
            .model
            .predict(&matrix)
            .map_err(|e| PredictorError::Inference(format!("Prediction failed: {}", e)))?;

        predictions
            .first()
            .copied()
            .ok_or_else(|| PredictorError::Inference("No prediction returned".to_string()))
    }

    fn name(&self) -> &str {
        "SmartCore Random Forest"
    }
}
