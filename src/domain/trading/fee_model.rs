use crate::domain::trading::types::Side;

/// Percentage fee and slippage schedule for a leveraged perpetual swap.
///
/// Fees are charged on leveraged notional, once at entry and once at exit.
/// Slippage moves every fill against the trader by a fixed fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradingCosts {
    pub fee_rate: f64,
    pub slippage_rate: f64,
}

impl TradingCosts {
    pub fn new(fee_rate: f64, slippage_rate: f64) -> Self {
        Self {
            fee_rate,
            slippage_rate,
        }
    }

    /// Fill price when opening: longs buy higher, shorts sell lower.
    pub fn entry_fill(&self, price: f64, side: Side) -> f64 {
        match side {
            Side::Long => price * (1.0 + self.slippage_rate),
            Side::Short => price * (1.0 - self.slippage_rate),
        }
    }

    /// Fill price when closing: longs sell lower, shorts buy back higher.
    pub fn exit_fill(&self, price: f64, side: Side) -> f64 {
        match side {
            Side::Long => price * (1.0 - self.slippage_rate),
            Side::Short => price * (1.0 + self.slippage_rate),
        }
    }

    pub fn entry_fee(&self, margin: f64, leverage: f64) -> f64 {
        margin * leverage * self.fee_rate
    }

    /// The exit leg is charged on the position value at close.
    pub fn exit_fee(&self, margin: f64, gross_pnl: f64, leverage: f64) -> f64 {
        ((margin + gross_pnl) * leverage * self.fee_rate).max(0.0)
    }

    pub fn description(&self) -> String {
        format!(
            "Percentage costs (fee: {:.3}%, slippage: {:.3}%)",
            self.fee_rate * 100.0,
            self.slippage_rate * 100.0
        )
    }
}

impl Default for TradingCosts {
    fn default() -> Self {
        Self::new(0.0005, 0.0005)
    }
}
