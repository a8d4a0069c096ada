use thiserror::Error;

/// Errors raised while building or validating market data tables
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("Timestamps must be strictly increasing: bar {index} at {timestamp} follows {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        timestamp: i64,
        previous: i64,
    },

    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    ColumnLengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid value '{value}' in column '{column}' at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },
}

/// Errors raised while computing indicator and feature columns
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeatureError {
    #[error("Indicator setup failed for {indicator}: {reason}")]
    Indicator { indicator: String, reason: String },

    #[error("Malformed bar at index {index}: {reason}")]
    MalformedBar { index: usize, reason: String },

    #[error("Not enough bars for feature warm-up: need more than {warmup}, got {available}")]
    InsufficientHistory { warmup: usize, available: usize },

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Errors related to strategy configuration and search space definitions
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid strategy config: {0}")]
    Validation(String),

    #[error("Invalid search space: {0}")]
    SearchSpace(String),

    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("Parameter '{name}' has the wrong type: expected {expected}")]
    ParameterType { name: String, expected: &'static str },
}

/// Errors related to model inference
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictorError {
    #[error("Model not loaded: {0}")]
    NotLoaded(String),

    #[error("Input shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Errors that abort a single backtest run
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BacktestError {
    #[error("Backtest exceeded its time budget of {budget_ms}ms at bar {bar_index}")]
    Timeout { budget_ms: u64, bar_index: usize },

    #[error("Indicator column '{0}' required by an active filter is missing")]
    MissingIndicator(String),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors related to the parameter search loop
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OptimizationError {
    #[error(
        "No viable configuration found after {trials} trials ({invalid} invalid, {errored} errored)"
    )]
    NoViableConfiguration {
        trials: usize,
        invalid: usize,
        errored: usize,
    },

    #[error("Search space is empty")]
    EmptySearchSpace,

    #[error("Worker pool could not be created: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Verification backtest failed: {0}")]
    Verification(#[from] BacktestError),
}
