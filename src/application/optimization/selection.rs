//! Picks the markets cleared for live trading from exported study results.

use crate::domain::optimization::{ApprovedStrategies, StrategyResult};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub max_drawdown_pct: f64,
    pub min_win_rate_pct: f64,
    pub min_pnl_pct: f64,
    pub top_n: usize,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            max_drawdown_pct: 30.0,
            min_win_rate_pct: 55.0,
            min_pnl_pct: 0.0,
            top_n: 10,
        }
    }
}

impl SelectionCriteria {
    pub fn accepts(&self, result: &StrategyResult) -> bool {
        let metrics = &result.metrics;
        metrics.max_drawdown_pct <= self.max_drawdown_pct
            && metrics.win_rate_pct >= self.min_win_rate_pct
            && metrics.total_pnl_pct >= self.min_pnl_pct
            && result.fitness_score.is_finite()
    }
}

/// Keeps results that pass `criteria`, best score first, at most one entry
/// per market, truncated to `top_n`.
pub fn select_top(results: &[StrategyResult], criteria: &SelectionCriteria) -> Vec<StrategyResult> {
    let mut passing: Vec<&StrategyResult> = results.iter().filter(|r| criteria.accepts(r)).collect();
    passing.sort_by(|a, b| b.fitness_score.total_cmp(&a.fitness_score));

    let mut selected: Vec<StrategyResult> = Vec::new();
    for result in passing {
        if selected.len() >= criteria.top_n {
            break;
        }
        if selected
            .iter()
            .any(|s| s.symbol == result.symbol && s.timeframe == result.timeframe)
        {
            continue;
        }
        selected.push(result.clone());
    }

    info!(
        "Selection: {} of {} results approved (dd <= {}%, win rate >= {}%, pnl >= {}%)",
        selected.len(),
        results.len(),
        criteria.max_drawdown_pct,
        criteria.min_win_rate_pct,
        criteria.min_pnl_pct
    );

    selected
}

impl From<&[StrategyResult]> for ApprovedStrategies {
    fn from(results: &[StrategyResult]) -> Self {
        Self {
            approved_strategies: results.iter().map(StrategyResult::market).collect(),
        }
    }
}
