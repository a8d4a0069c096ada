use serde::{Deserialize, Serialize};

/// Account equity sampled at the start and after every closed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityCurve {
    points: Vec<f64>,
}

impl EquityCurve {
    pub fn new(start_capital: f64) -> Self {
        Self {
            points: vec![start_capital],
        }
    }

    pub fn push(&mut self, equity: f64) {
        self.points.push(equity);
    }

    pub fn start(&self) -> f64 {
        self.points.first().copied().unwrap_or(0.0)
    }

    pub fn last(&self) -> f64 {
        self.points.last().copied().unwrap_or(0.0)
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_drawdown_pct(&self) -> f64 {
        max_drawdown_pct(&self.points)
    }
}

/// Largest peak-to-trough decline, as a non-negative percentage of the peak.
pub fn max_drawdown_pct(equity: &[f64]) -> f64 {
    let mut max_dd: f64 = 0.0;
    let mut peak = f64::MIN;

    for &value in equity {
        if value > peak {
            peak = value;
        }

        if peak > 0.0 {
            // Equity is clamped at zero on liquidation, so the cap is 100%
            let drawdown = ((peak - value) / peak * 100.0).min(100.0);
            if drawdown > max_dd {
                max_dd = drawdown;
            }
        }
    }

    max_dd
}
