// Bar-by-bar strategy replay
pub mod context;
pub mod engine;

pub use context::{EngineSettings, ExitPriceMode, SimulationContext};
pub use engine::{BacktestEngine, BacktestReport, run_backtest};
