//! Optimization engine for strategy parameter search.
//!
//! Wires a shared simulation context, the scoring constraints and the study
//! optimizer together, then re-runs the winning configuration once more to
//! produce the full report that gets persisted.

use crate::application::backtest::{BacktestEngine, BacktestReport, SimulationContext};
use crate::application::optimization::objective::StrategyObjective;
use crate::application::optimization::optimizer::{
    CancellationToken, OptimizerSettings, StudyOptimizer,
};
use crate::domain::errors::OptimizationError;
use crate::domain::optimization::{ScoringConstraints, SearchSpace, StrategyResult, TrialResult};
use crate::domain::strategy::{KNOWN_PARAMETERS, MarketConfig, StrategyConfig};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a finished study hands back to the caller.
#[derive(Debug, Clone)]
pub struct OptimizationRun {
    pub best_config: StrategyConfig,
    pub best_trial: TrialResult,
    pub verification: BacktestReport,
    pub trials: Vec<TrialResult>,
    pub cancelled: bool,
}

impl OptimizationRun {
    /// Exported artifact entry for the winning trial.
    pub fn strategy_result(&self) -> StrategyResult {
        StrategyResult::new(
            self.best_config.market.symbol.clone(),
            self.best_config.market.timeframe.clone(),
            self.best_trial.fitness_score(),
            self.best_trial.params.clone(),
            self.verification.metrics.clone(),
        )
    }
}

/// High-level optimization engine for one market.
pub struct OptimizeEngine {
    context: Arc<SimulationContext>,
    constraints: ScoringConstraints,
    settings: OptimizerSettings,
    cancel: CancellationToken,
}

impl OptimizeEngine {
    pub fn new(
        context: Arc<SimulationContext>,
        constraints: ScoringConstraints,
        settings: OptimizerSettings,
    ) -> Self {
        Self {
            context,
            constraints,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Baseline configuration for `market`; filters whose thresholds are
    /// searched get switched on.
    pub fn base_config(market: &MarketConfig, space: &SearchSpace) -> StrategyConfig {
        let mut config = StrategyConfig::new(market.symbol.clone(), market.timeframe.clone());
        let searches = |name: &str| space.parameters.iter().any(|def| def.name == name);

        if searches("min_natr") || searches("max_natr") {
            config.behavior.use_volatility_filter = true;
        }
        if searches("ema_period") {
            config.behavior.use_trend_filter = true;
        }
        config
    }

    /// Runs the full study for `market` starting from `base`.
    pub fn run(
        &self,
        base: StrategyConfig,
        space: &SearchSpace,
    ) -> Result<OptimizationRun, OptimizationError> {
        space.validate(Some(KNOWN_PARAMETERS))?;

        info!(
            "Optimizing {} {} over {} bars",
            base.market.symbol,
            base.market.timeframe,
            self.context.table.len()
        );

        let objective =
            StrategyObjective::new(Arc::clone(&self.context), base.clone(), self.constraints.clone());
        let outcome = StudyOptimizer::new(space.clone(), self.settings.clone())
            .with_cancellation(self.cancel.clone())
            .optimize(&objective)?;

        let best_config = base.with_parameters(&outcome.best.params)?;
        best_config.validate()?;

        let engine = BacktestEngine::new(self.context.settings.clone());
        let verification = engine.run_in_context(&self.context, &best_config)?;

        if outcome.best.metrics.as_ref() != Some(&verification.metrics) {
            warn!(
                "Verification backtest differs from trial #{}: pnl {:.2}% vs {:?}",
                outcome.best.number,
                verification.metrics.total_pnl_pct,
                outcome.best.metrics.as_ref().map(|m| m.total_pnl_pct)
            );
        }

        info!(
            "Best configuration: pnl {:.2}%, win rate {:.1}%, drawdown {:.2}%, {} trades",
            verification.metrics.total_pnl_pct,
            verification.metrics.win_rate_pct,
            verification.metrics.max_drawdown_pct,
            verification.metrics.num_trades
        );

        Ok(OptimizationRun {
            best_config,
            best_trial: outcome.best,
            verification,
            trials: outcome.trials,
            cancelled: outcome.cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backtest::EngineSettings;
    use crate::domain::errors::ConfigError;
    use crate::domain::optimization::{OptimizationMode, ParameterDef};
    use crate::infrastructure::mock::{ConstantPredictor, oscillating_closes, table_from_closes};

    fn context() -> Arc<SimulationContext> {
        Arc::new(SimulationContext::new(
            table_from_closes(&oscillating_closes(400, 100.0, 3.0)),
            Arc::new(ConstantPredictor::new(0.9)),
            EngineSettings {
                sequence_length: 5,
                ..EngineSettings::default()
            },
        ))
    }

    fn relaxed() -> ScoringConstraints {
        ScoringConstraints {
            max_drawdown_pct: 100.0,
            min_trades: 1,
            mode: OptimizationMode::BestProfit,
            ..ScoringConstraints::default()
        }
    }

    fn settings() -> OptimizerSettings {
        OptimizerSettings {
            n_trials: 12,
            n_workers: 3,
            ..OptimizerSettings::default()
        }
    }

    #[test]
    fn test_base_config_enables_searched_filters() {
        let market = MarketConfig {
            symbol: "BTC/USDT:USDT".to_string(),
            timeframe: "1h".to_string(),
        };
        let config = OptimizeEngine::base_config(&market, &SearchSpace::default());
        assert!(config.behavior.use_volatility_filter);
        assert!(config.behavior.use_trend_filter);

        let plain = SearchSpace::new(vec![ParameterDef::float("risk_reward_ratio", 1.0, 3.0)]);
        let config = OptimizeEngine::base_config(&market, &plain);
        assert!(!config.behavior.use_volatility_filter);
        assert!(!config.behavior.use_trend_filter);
    }

    #[test]
    fn test_unknown_parameter_is_fatal() {
        let engine = OptimizeEngine::new(context(), relaxed(), settings());
        let space = SearchSpace::new(vec![ParameterDef::float("lunar_phase", 0.0, 1.0)]);
        let err = engine
            .run(StrategyConfig::new("BTC/USDT:USDT", "1h"), &space)
            .unwrap_err();
        assert!(matches!(
            err,
            OptimizationError::Config(ConfigError::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_run_verifies_best_trial() {
        let engine = OptimizeEngine::new(context(), relaxed(), settings());
        let space = SearchSpace::new(vec![
            ParameterDef::float("risk_reward_ratio", 1.0, 3.0),
            ParameterDef::int("leverage", 2, 10),
        ]);
        let run = engine
            .run(StrategyConfig::new("BTC/USDT:USDT", "1h"), &space)
            .unwrap();

        assert_eq!(run.trials.len(), 12);
        assert_eq!(run.best_trial.metrics.as_ref(), Some(&run.verification.metrics));
        assert_eq!(
            run.best_config.risk.leverage as i64,
            run.best_trial
                .params
                .get("leverage")
                .and_then(|v| v.as_i64())
                .unwrap()
        );
        let result = run.strategy_result();
        assert_eq!(result.symbol, "BTC/USDT:USDT");
        assert_eq!(result.fitness_score, run.best_trial.fitness_score());
    }
}
