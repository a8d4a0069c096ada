// Strategy configuration and entry gating
pub mod gates;
pub mod signal;
pub mod strategy_config;

pub use gates::{BlockReason, EntryGate, GateContext, GateDecision, GatePipeline};
pub use signal::SignalMode;
pub use strategy_config::{
    BehaviorParams, FilterParams, KNOWN_PARAMETERS, MarketConfig, RiskParams, StrategyConfig,
    StrategyParams,
};
