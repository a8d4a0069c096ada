// Model inference contracts
pub mod predictor;
pub mod scaler;

pub use predictor::{Prediction, Predictor};
pub use scaler::{FeatureScaler, StandardScaler};
