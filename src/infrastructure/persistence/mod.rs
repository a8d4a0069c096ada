// File-backed inputs and artifacts
pub mod csv_bars;
pub mod strategy_store;

pub use csv_bars::{BarData, load_bars, read_bars};
pub use strategy_store::{APPROVED_STRATEGIES_FILE, StrategyStore};
