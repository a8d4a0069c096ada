//! Search and scoring settings parsed from environment variables.

use crate::application::optimization::{OptimizerSettings, SelectionCriteria, TpeSettings};
use crate::config::{BacktestEnvConfig, Lookup, parse_optional, parse_var};
use crate::domain::optimization::{OptimizationMode, ScoringConstraints};
use anyhow::{Context, Result, ensure};
use std::env;

/// Optimizer environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerEnvConfig {
    pub backtest: BacktestEnvConfig,

    // Study
    pub n_trials: usize,
    pub n_jobs: usize,
    pub seed: u64,
    pub n_startup_trials: usize,

    // Hard Constraints
    pub max_drawdown_pct: f64,
    pub min_win_rate_pct: f64,
    pub min_pnl_pct: f64,
    pub min_trades: usize,
    pub target_trades: Option<usize>,
    pub mode: OptimizationMode,

    // Selection
    pub top_n: usize,
}

impl OptimizerEnvConfig {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let backtest =
            BacktestEnvConfig::from_lookup(lookup).context("Failed to load backtest config")?;

        let default_jobs = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let defaults = ScoringConstraints::default();
        let tpe = TpeSettings::default();

        let config = Self {
            backtest,
            n_trials: parse_var(lookup, "OPTIM_TRIALS", 200)?,
            n_jobs: parse_var(lookup, "OPTIM_JOBS", default_jobs)?,
            seed: parse_var(lookup, "OPTIM_SEED", tpe.seed)?,
            n_startup_trials: parse_var(lookup, "OPTIM_STARTUP_TRIALS", tpe.n_startup_trials)?,
            max_drawdown_pct: parse_var(lookup, "MAX_DRAWDOWN_PCT", defaults.max_drawdown_pct)?,
            min_win_rate_pct: parse_var(lookup, "MIN_WIN_RATE_PCT", defaults.min_win_rate_pct)?,
            min_pnl_pct: parse_var(lookup, "MIN_PNL_PCT", defaults.min_pnl_pct)?,
            min_trades: parse_var(lookup, "MIN_TRADES", defaults.min_trades)?,
            target_trades: parse_optional(lookup, "TARGET_TRADES")?,
            mode: parse_var(lookup, "OPTIM_MODE", defaults.mode)?,
            top_n: parse_var(lookup, "TOP_N", 10)?,
        };

        ensure!(config.n_trials > 0, "OPTIM_TRIALS must be at least 1");
        ensure!(config.n_jobs > 0, "OPTIM_JOBS must be at least 1");

        Ok(config)
    }

    pub fn constraints(&self) -> ScoringConstraints {
        ScoringConstraints {
            max_drawdown_pct: self.max_drawdown_pct,
            min_trades: self.min_trades,
            min_win_rate_pct: self.min_win_rate_pct,
            min_pnl_pct: self.min_pnl_pct,
            mode: self.mode,
            target_trades: self.target_trades,
        }
    }

    pub fn optimizer_settings(&self) -> OptimizerSettings {
        OptimizerSettings {
            n_trials: self.n_trials,
            n_workers: self.n_jobs,
            tpe: TpeSettings {
                n_startup_trials: self.n_startup_trials,
                seed: self.seed,
                ..TpeSettings::default()
            },
        }
    }

    pub fn selection_criteria(&self) -> SelectionCriteria {
        SelectionCriteria {
            max_drawdown_pct: self.max_drawdown_pct,
            min_win_rate_pct: self.min_win_rate_pct,
            min_pnl_pct: self.min_pnl_pct,
            top_n: self.top_n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_optimizer_config_defaults() {
        let config = OptimizerEnvConfig::from_lookup(&lookup(&[])).expect("Should parse with defaults");
        assert_eq!(config.n_trials, 200);
        assert!(config.n_jobs >= 1);
        assert_eq!(config.constraints(), ScoringConstraints::default());
        assert_eq!(config.optimizer_settings().tpe, TpeSettings::default());
    }

    #[test]
    fn test_optimizer_config_overrides() {
        let config = OptimizerEnvConfig::from_lookup(&lookup(&[
            ("OPTIM_TRIALS", "50"),
            ("OPTIM_JOBS", "4"),
            ("OPTIM_MODE", "best_profit"),
            ("MAX_DRAWDOWN_PCT", "20"),
            ("TARGET_TRADES", "120"),
            ("OPTIM_SEED", "7"),
        ]))
        .unwrap();
        let constraints = config.constraints();
        assert_eq!(constraints.mode, OptimizationMode::BestProfit);
        assert_eq!(constraints.max_drawdown_pct, 20.0);
        assert_eq!(constraints.target_trades, Some(120));

        let settings = config.optimizer_settings();
        assert_eq!(settings.n_trials, 50);
        assert_eq!(settings.n_workers, 4);
        assert_eq!(settings.tpe.seed, 7);
    }

    #[test]
    fn test_optimizer_config_rejects_unknown_mode() {
        let err = OptimizerEnvConfig::from_lookup(&lookup(&[("OPTIM_MODE", "yolo")])).unwrap_err();
        assert!(err.to_string().contains("OPTIM_MODE"));
        assert!(OptimizerEnvConfig::from_lookup(&lookup(&[("OPTIM_TRIALS", "0")])).is_err());
    }
}
