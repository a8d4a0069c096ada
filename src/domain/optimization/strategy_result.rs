use crate::domain::optimization::search_space::ParameterSet;
use crate::domain::performance::BacktestMetrics;
use crate::domain::strategy::MarketConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Best trial of a study, as exported to the results artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyResult {
    pub symbol: String,
    pub timeframe: String,
    pub fitness_score: f64,
    pub params: ParameterSet,
    pub metrics: BacktestMetrics,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl StrategyResult {
    pub fn new(
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        fitness_score: f64,
        params: ParameterSet,
        metrics: BacktestMetrics,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            fitness_score,
            params,
            metrics,
            timestamp: Utc::now(),
        }
    }

    pub fn market(&self) -> MarketConfig {
        MarketConfig {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
        }
    }
}

/// Markets cleared for live trading, in ranking order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovedStrategies {
    pub approved_strategies: Vec<MarketConfig>,
}
