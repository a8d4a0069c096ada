use crate::domain::performance::BacktestMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fitness reported for any trial that must never be selected.
pub const INVALID_SCORE: f64 = -999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMode {
    /// Drawdown, trade count, win rate and pnl floors all apply
    #[default]
    Strict,
    /// Only drawdown and trade count apply
    BestProfit,
}

impl FromStr for OptimizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(OptimizationMode::Strict),
            "best_profit" | "best-profit" => Ok(OptimizationMode::BestProfit),
            other => Err(format!("Unknown optimization mode: {}", other)),
        }
    }
}

impl fmt::Display for OptimizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationMode::Strict => write!(f, "strict"),
            OptimizationMode::BestProfit => write!(f, "best_profit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstraintViolation {
    #[error("Maximum drawdown exceeded: {actual:.2}% > {limit:.2}%")]
    Drawdown { actual: f64, limit: f64 },

    #[error("Too few trades: {actual} < {min}")]
    TooFewTrades { actual: usize, min: usize },

    #[error("Win rate below floor: {actual:.2}% < {min:.2}%")]
    WinRate { actual: f64, min: f64 },

    #[error("PnL below floor: {actual:.2}% < {min:.2}%")]
    Pnl { actual: f64, min: f64 },

    #[error("Metrics are not finite")]
    NonFinite,
}

/// Hard risk constraints applied before any fitness is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConstraints {
    pub max_drawdown_pct: f64,
    pub min_trades: usize,
    pub min_win_rate_pct: f64,
    pub min_pnl_pct: f64,
    pub mode: OptimizationMode,
    /// Trade count at which the confidence factor saturates
    pub target_trades: Option<usize>,
}

impl Default for ScoringConstraints {
    fn default() -> Self {
        Self {
            max_drawdown_pct: 30.0,
            min_trades: 50,
            min_win_rate_pct: 55.0,
            min_pnl_pct: 0.0,
            mode: OptimizationMode::Strict,
            target_trades: None,
        }
    }
}

impl ScoringConstraints {
    pub fn check(&self, metrics: &BacktestMetrics) -> Result<(), ConstraintViolation> {
        if metrics.is_degenerate() {
            return Err(ConstraintViolation::NonFinite);
        }

        if metrics.max_drawdown_pct > self.max_drawdown_pct {
            return Err(ConstraintViolation::Drawdown {
                actual: metrics.max_drawdown_pct,
                limit: self.max_drawdown_pct,
            });
        }

        if metrics.num_trades < self.min_trades {
            return Err(ConstraintViolation::TooFewTrades {
                actual: metrics.num_trades,
                min: self.min_trades,
            });
        }

        if self.mode == OptimizationMode::Strict {
            if metrics.win_rate_pct < self.min_win_rate_pct {
                return Err(ConstraintViolation::WinRate {
                    actual: metrics.win_rate_pct,
                    min: self.min_win_rate_pct,
                });
            }
            if metrics.total_pnl_pct < self.min_pnl_pct {
                return Err(ConstraintViolation::Pnl {
                    actual: metrics.total_pnl_pct,
                    min: self.min_pnl_pct,
                });
            }
        }

        Ok(())
    }
}
