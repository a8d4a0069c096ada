use crate::domain::performance::equity_curve::max_drawdown_pct;
use crate::domain::trading::TradeRecord;
use serde::{Deserialize, Serialize};

/// Summary statistics of one backtest run.
///
/// Serialized field names match the trial artifacts consumed by the result
/// selector (`win_rate`, `max_drawdown_pct`, `total_pnl_pct`, `num_trades`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_pnl_pct: f64,
    #[serde(rename = "win_rate")]
    pub win_rate_pct: f64,
    pub max_drawdown_pct: f64,
    pub num_trades: usize,

    // Supplemental, informational only
    #[serde(default)]
    pub end_capital: f64,
    /// Gross wins over gross losses; `None` without losing trades
    #[serde(default)]
    pub profit_factor: Option<f64>,
    #[serde(default)]
    pub max_consecutive_losses: usize,
    #[serde(default)]
    pub total_fees: f64,
}

impl BacktestMetrics {
    /// Metrics of a run that never traded.
    pub fn zero(start_capital: f64) -> Self {
        Self {
            total_pnl_pct: 0.0,
            win_rate_pct: 0.0,
            max_drawdown_pct: 0.0,
            num_trades: 0,
            end_capital: start_capital,
            profit_factor: None,
            max_consecutive_losses: 0,
            total_fees: 0.0,
        }
    }

    /// Computes metrics from the closed-trade ledger and the curve used for
    /// drawdown (realized, or sampled mark-to-market).
    pub fn calculate(
        start_capital: f64,
        end_capital: f64,
        trades: &[TradeRecord],
        drawdown_curve: &[f64],
    ) -> Self {
        if trades.is_empty() {
            let mut metrics = Self::zero(start_capital);
            metrics.max_drawdown_pct = max_drawdown_pct(drawdown_curve);
            return metrics;
        }

        let total_pnl_pct = if start_capital > 0.0 {
            (end_capital / start_capital - 1.0) * 100.0
        } else {
            0.0
        };

        let wins = trades.iter().filter(|t| t.is_win()).count();
        let win_rate_pct = wins as f64 / trades.len() as f64 * 100.0;

        Self {
            total_pnl_pct,
            win_rate_pct,
            max_drawdown_pct: max_drawdown_pct(drawdown_curve),
            num_trades: trades.len(),
            end_capital,
            profit_factor: Self::calculate_profit_factor(trades),
            max_consecutive_losses: Self::calculate_max_consecutive_losses(trades),
            total_fees: trades.iter().map(|t| t.fees_paid).sum(),
        }
    }

    fn calculate_profit_factor(trades: &[TradeRecord]) -> Option<f64> {
        let gross_profit: f64 = trades
            .iter()
            .filter(|t| t.is_win())
            .map(|t| t.equity_delta)
            .sum();
        let gross_loss: f64 = trades
            .iter()
            .filter(|t| t.is_loss())
            .map(|t| t.equity_delta.abs())
            .sum();

        if gross_loss > 0.0 {
            Some(gross_profit / gross_loss)
        } else {
            None
        }
    }

    fn calculate_max_consecutive_losses(trades: &[TradeRecord]) -> usize {
        let mut max_losses = 0;
        let mut current_losses = 0;

        for trade in trades {
            if trade.is_loss() {
                current_losses += 1;
                max_losses = max_losses.max(current_losses);
            } else if trade.is_win() {
                current_losses = 0;
            }
        }

        max_losses
    }

    /// True when any headline figure is NaN or infinite.
    pub fn is_degenerate(&self) -> bool {
        !(self.total_pnl_pct.is_finite()
            && self.win_rate_pct.is_finite()
            && self.max_drawdown_pct.is_finite())
    }
}
