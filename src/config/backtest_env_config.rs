//! Simulation settings parsed from environment variables.
//!
//! Covers transaction costs, starting capital, the model lookback and how
//! exits and drawdown are evaluated.

use crate::application::backtest::{EngineSettings, ExitPriceMode};
use crate::config::{Lookup, parse_bool, parse_optional, parse_var};
use anyhow::{Result, ensure};
use std::time::Duration;

/// Backtest environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestEnvConfig {
    // Transaction Costs
    pub fee_rate: f64,
    pub slippage_rate: f64,

    // Account
    pub start_capital: f64,

    // Model Input
    pub sequence_length: usize,
    pub uncertainty_samples: usize,

    // Exit & Drawdown Evaluation
    pub exit_mode: ExitPriceMode,
    pub mark_to_market: bool,

    pub trial_timeout: Option<Duration>,
}

impl BacktestEnvConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let config = Self {
            fee_rate: parse_var(lookup, "FEE_RATE", 0.0005)?,
            slippage_rate: parse_var(lookup, "SLIPPAGE_RATE", 0.0005)?,
            start_capital: parse_var(lookup, "START_CAPITAL", 1000.0)?,
            sequence_length: parse_var(lookup, "SEQUENCE_LENGTH", 24)?,
            uncertainty_samples: parse_var(lookup, "UNCERTAINTY_SAMPLES", 30)?,
            exit_mode: parse_var(lookup, "EXIT_PRICE_MODE", ExitPriceMode::Intrabar)?,
            mark_to_market: parse_bool(lookup, "MARK_TO_MARKET", false),
            trial_timeout: parse_optional::<u64>(lookup, "TRIAL_TIMEOUT_SECS")?
                .map(Duration::from_secs),
        };

        ensure!(
            config.fee_rate >= 0.0 && config.slippage_rate >= 0.0,
            "FEE_RATE and SLIPPAGE_RATE must be non-negative"
        );
        ensure!(config.start_capital > 0.0, "START_CAPITAL must be positive");

        Ok(config)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            fee_rate: self.fee_rate,
            slippage_rate: self.slippage_rate,
            sequence_length: self.sequence_length,
            start_capital: self.start_capital,
            exit_mode: self.exit_mode,
            mark_to_market: self.mark_to_market,
            uncertainty_samples: self.uncertainty_samples,
            trial_timeout: self.trial_timeout,
        }
    }
}
