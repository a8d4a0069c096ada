// Indicator and model feature computation
pub mod feature_pipeline;

pub use feature_pipeline::{FeaturePipeline, MODEL_FEATURES, WilderAdx, filter_columns};
