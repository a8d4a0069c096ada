// Simulated positions, fills and the trade ledger
pub mod fee_model;
pub mod position;
pub mod trade;
pub mod types;

pub use fee_model::TradingCosts;
pub use position::SimulatedPosition;
pub use trade::TradeRecord;
pub use types::{ExitReason, PositionStatus, Side};
