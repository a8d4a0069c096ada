use crate::domain::market::MarketBar;
use crate::domain::trading::types::{ExitReason, PositionStatus, Side};
use serde::{Deserialize, Serialize};

/// A single leveraged position replayed by the backtest engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedPosition {
    pub side: Side,
    pub entry_index: usize,
    /// Post-slippage entry price
    pub entry_price: f64,
    /// Adverse price move (fraction) that triggers the stop
    pub stop_loss_pct: f64,
    /// Favorable price move (fraction) that triggers the target
    pub take_profit_pct: f64,
    pub status: PositionStatus,
    pub exit_index: Option<usize>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
}

impl SimulatedPosition {
    pub fn open(
        side: Side,
        entry_index: usize,
        entry_price: f64,
        stop_loss_pct: f64,
        take_profit_pct: f64,
    ) -> Self {
        Self {
            side,
            entry_index,
            entry_price,
            stop_loss_pct,
            take_profit_pct,
            status: PositionStatus::Open,
            exit_index: None,
            exit_price: None,
            exit_reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn stop_price(&self) -> f64 {
        match self.side {
            Side::Long => self.entry_price * (1.0 - self.stop_loss_pct),
            Side::Short => self.entry_price * (1.0 + self.stop_loss_pct),
        }
    }

    pub fn target_price(&self) -> f64 {
        match self.side {
            Side::Long => self.entry_price * (1.0 + self.take_profit_pct),
            Side::Short => self.entry_price * (1.0 - self.take_profit_pct),
        }
    }

    /// Signed price move from entry, as a fraction, in the position's favor.
    pub fn price_move_pct(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) / self.entry_price
    }

    /// Exit check using only the bar close.
    pub fn exit_on_close(&self, close: f64) -> Option<(ExitReason, f64)> {
        let moved = self.price_move_pct(close);
        if moved <= -self.stop_loss_pct {
            Some((ExitReason::StopLoss, close))
        } else if moved >= self.take_profit_pct {
            Some((ExitReason::TakeProfit, close))
        } else {
            None
        }
    }

    /// Exit check against the bar's high/low range.
    ///
    /// When both levels are touched inside one bar the stop wins. A bar that
    /// opens beyond a level fills at the open.
    pub fn exit_intrabar(&self, bar: &MarketBar) -> Option<(ExitReason, f64)> {
        let stop = self.stop_price();
        let target = self.target_price();

        match self.side {
            Side::Long => {
                if bar.low <= stop {
                    Some((ExitReason::StopLoss, stop.min(bar.open)))
                } else if bar.high >= target {
                    Some((ExitReason::TakeProfit, target.max(bar.open)))
                } else {
                    None
                }
            }
            Side::Short => {
                if bar.high >= stop {
                    Some((ExitReason::StopLoss, stop.max(bar.open)))
                } else if bar.low <= target {
                    Some((ExitReason::TakeProfit, target.min(bar.open)))
                } else {
                    None
                }
            }
        }
    }

    pub fn close(&mut self, exit_index: usize, exit_price: f64, reason: ExitReason) {
        self.status = PositionStatus::Closed;
        self.exit_index = Some(exit_index);
        self.exit_price = Some(exit_price);
        self.exit_reason = Some(reason);
    }
}
