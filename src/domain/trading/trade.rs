use crate::domain::trading::position::SimulatedPosition;
use crate::domain::trading::types::{ExitReason, Side};
use serde::{Deserialize, Serialize};

/// A closed position with its realized accounting. Entries in the trade
/// ledger are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: Side,
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_price: f64,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    /// Net pnl as a percentage of the capital committed at entry
    pub pnl_pct: f64,
    pub gross_pnl: f64,
    pub fees_paid: f64,
    /// Net change in account equity
    pub equity_delta: f64,
    pub equity_after: f64,
}

impl TradeRecord {
    /// Builds the ledger entry from a position that has just been closed.
    pub fn from_closed(
        position: &SimulatedPosition,
        capital_before: f64,
        gross_pnl: f64,
        fees_paid: f64,
        equity_after: f64,
    ) -> Option<Self> {
        let exit_index = position.exit_index?;
        let exit_price = position.exit_price?;
        let exit_reason = position.exit_reason?;
        let equity_delta = equity_after - capital_before;

        Some(Self {
            side: position.side,
            entry_index: position.entry_index,
            exit_index,
            entry_price: position.entry_price,
            exit_price,
            exit_reason,
            pnl_pct: if capital_before > 0.0 {
                equity_delta / capital_before * 100.0
            } else {
                0.0
            },
            gross_pnl,
            fees_paid,
            equity_delta,
            equity_after,
        })
    }

    pub fn is_win(&self) -> bool {
        self.equity_delta > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.equity_delta < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_open_position_is_none() {
        let position = SimulatedPosition::open(Side::Long, 0, 100.0, 0.01, 0.02);
        assert!(TradeRecord::from_closed(&position, 1000.0, 0.0, 0.0, 1000.0).is_none());
    }

    #[test]
    fn test_from_closed_position() {
        let mut position = SimulatedPosition::open(Side::Long, 2, 100.0, 0.01, 0.02);
        position.close(4, 102.0, ExitReason::TakeProfit);

        let trade = TradeRecord::from_closed(&position, 1000.0, 200.0, 10.0, 1190.0).unwrap();
        assert_eq!(trade.exit_index, 4);
        assert!((trade.pnl_pct - 19.0).abs() < 1e-9);
        assert!((trade.equity_delta - 190.0).abs() < 1e-9);
        assert!(trade.is_win());
    }
}
