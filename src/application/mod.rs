// Bar-by-bar backtesting
pub mod backtest;

// Indicator and model feature construction
pub mod features;

// Model-backed predictors
pub mod ml;

// Parameter search, scoring and result selection
pub mod optimization;
