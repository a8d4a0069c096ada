// Bars, feature tables and lookback windows
pub mod market;

// Positions, fills and the trade ledger
pub mod trading;

// Equity curve and backtest metrics
pub mod performance;

// Predictor and scaler contracts
pub mod ml;

// Strategy configuration and entry gates
pub mod strategy;

// Search space, trials and scoring constraints
pub mod optimization;

// Domain-specific error types
pub mod errors;
