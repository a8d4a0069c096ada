pub mod mock;
pub mod persistence;

pub use persistence::{StrategyStore, load_bars};
