// Predictor implementations
pub mod monte_carlo_predictor;
pub mod smartcore_predictor;

pub use monte_carlo_predictor::MonteCarloPredictor;
pub use smartcore_predictor::{InputLayout, SmartCorePredictor};
