// Performance tracking domain
pub mod equity_curve;
pub mod metrics;

pub use equity_curve::EquityCurve;
pub use metrics::BacktestMetrics;
