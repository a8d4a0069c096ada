//! Scoring of backtest metrics and the trial objective used by the search loop.

use crate::application::backtest::{BacktestEngine, SimulationContext};
use crate::domain::optimization::{INVALID_SCORE, ParameterSet, ScoringConstraints, TrialOutcome};
use crate::domain::performance::BacktestMetrics;
use crate::domain::strategy::StrategyConfig;
use std::sync::Arc;
use tracing::debug;

/// Scalar fitness of a backtest, or [`INVALID_SCORE`] when any hard
/// constraint is violated or the result is not a finite number.
pub fn score(metrics: &BacktestMetrics, constraints: &ScoringConstraints) -> f64 {
    if constraints.check(metrics).is_err() {
        return INVALID_SCORE;
    }
    fitness(metrics, constraints)
}

fn fitness(metrics: &BacktestMetrics, constraints: &ScoringConstraints) -> f64 {
    let mut fitness = metrics.total_pnl_pct * (metrics.win_rate_pct / 100.0)
        / (metrics.max_drawdown_pct + 1.0);

    if let Some(target) = constraints.target_trades
        && target > 0
    {
        fitness *= (metrics.num_trades as f64 / target as f64).min(1.0);
    }

    if fitness.is_finite() {
        fitness
    } else {
        INVALID_SCORE
    }
}

/// What one evaluation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialEvaluation {
    pub outcome: TrialOutcome,
    pub metrics: Option<BacktestMetrics>,
}

impl TrialEvaluation {
    pub fn completed(score: f64, metrics: BacktestMetrics) -> Self {
        Self {
            outcome: TrialOutcome::Completed { score },
            metrics: Some(metrics),
        }
    }

    pub fn invalid(reason: impl Into<String>, metrics: Option<BacktestMetrics>) -> Self {
        Self {
            outcome: TrialOutcome::Invalid {
                reason: reason.into(),
            },
            metrics,
        }
    }

    pub fn errored(cause: impl Into<String>) -> Self {
        Self {
            outcome: TrialOutcome::Errored {
                cause: cause.into(),
            },
            metrics: None,
        }
    }
}

/// Maps a parameter set to a scored outcome. Must be safe to call from
/// several worker threads at once.
pub trait Objective: Send + Sync {
    fn evaluate(&self, params: &ParameterSet) -> TrialEvaluation;
}

impl<F> Objective for F
where
    F: Fn(&ParameterSet) -> TrialEvaluation + Send + Sync,
{
    fn evaluate(&self, params: &ParameterSet) -> TrialEvaluation {
        self(params)
    }
}

/// Objective that applies the parameters to a base strategy configuration
/// and backtests it against a shared simulation context.
pub struct StrategyObjective {
    context: Arc<SimulationContext>,
    base: StrategyConfig,
    constraints: ScoringConstraints,
    engine: BacktestEngine,
}

impl StrategyObjective {
    pub fn new(
        context: Arc<SimulationContext>,
        base: StrategyConfig,
        constraints: ScoringConstraints,
    ) -> Self {
        let engine = BacktestEngine::new(context.settings.clone());
        Self {
            context,
            base,
            constraints,
            engine,
        }
    }

    pub fn base(&self) -> &StrategyConfig {
        &self.base
    }

    pub fn constraints(&self) -> &ScoringConstraints {
        &self.constraints
    }
}

impl Objective for StrategyObjective {
    fn evaluate(&self, params: &ParameterSet) -> TrialEvaluation {
        // Rejected combinations never reach the engine
        let config = match self
            .base
            .with_parameters(params)
            .and_then(|config| config.validate().map(|_| config))
        {
            Ok(config) => config,
            Err(e) => {
                debug!("Rejected parameters {}: {}", params, e);
                return TrialEvaluation::invalid(e.to_string(), None);
            }
        };

        let report = match self.engine.run_in_context(&self.context, &config) {
            Ok(report) => report,
            Err(e) => return TrialEvaluation::errored(e.to_string()),
        };

        let metrics = report.metrics;
        if let Err(violation) = self.constraints.check(&metrics) {
            return TrialEvaluation::invalid(violation.to_string(), Some(metrics));
        }

        let score = fitness(&metrics, &self.constraints);
        if score == INVALID_SCORE {
            return TrialEvaluation::invalid("fitness is not finite", Some(metrics));
        }

        TrialEvaluation::completed(score, metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backtest::EngineSettings;
    use crate::domain::optimization::{OptimizationMode, ParamValue};
    use crate::infrastructure::mock::{ConstantPredictor, CountingPredictor, table_from_closes};

    fn metrics(pnl: f64, win_rate: f64, dd: f64, trades: usize) -> BacktestMetrics {
        BacktestMetrics {
            total_pnl_pct: pnl,
            win_rate_pct: win_rate,
            max_drawdown_pct: dd,
            num_trades: trades,
            ..BacktestMetrics::zero(1000.0)
        }
    }

    #[test]
    fn test_fitness_formula() {
        let constraints = ScoringConstraints::default();
        let score = score(&metrics(20.0, 60.0, 9.0, 80), &constraints);
        assert!((score - 20.0 * 0.6 / 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_violations_score_sentinel() {
        let constraints = ScoringConstraints::default();
        assert_eq!(score(&metrics(20.0, 60.0, 35.0, 80), &constraints), INVALID_SCORE);
        assert_eq!(score(&metrics(20.0, 60.0, 9.0, 10), &constraints), INVALID_SCORE);
        assert_eq!(score(&metrics(20.0, 50.0, 9.0, 80), &constraints), INVALID_SCORE);
        assert_eq!(score(&metrics(-1.0, 60.0, 9.0, 80), &constraints), INVALID_SCORE);
        assert_eq!(
            score(&metrics(f64::INFINITY, 60.0, 9.0, 80), &constraints),
            INVALID_SCORE
        );
    }

    #[test]
    fn test_best_profit_allows_losing_runs() {
        let constraints = ScoringConstraints {
            mode: OptimizationMode::BestProfit,
            ..ScoringConstraints::default()
        };
        let score = score(&metrics(-4.0, 40.0, 3.0, 80), &constraints);
        assert!((score - (-4.0 * 0.4 / 4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_trade_confidence_factor() {
        let constraints = ScoringConstraints {
            min_trades: 1,
            target_trades: Some(100),
            ..ScoringConstraints::default()
        };
        let half = score(&metrics(10.0, 60.0, 0.0, 50), &constraints);
        let full = score(&metrics(10.0, 60.0, 0.0, 200), &constraints);
        assert!((half - 3.0).abs() < 1e-12);
        assert!((full - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverted_natr_band_skips_engine() {
        let predictor = Arc::new(CountingPredictor::new(ConstantPredictor::new(0.9)));
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.1).collect();
        let context = Arc::new(SimulationContext::new(
            table_from_closes(&closes),
            predictor.clone(),
            EngineSettings {
                sequence_length: 5,
                ..EngineSettings::default()
            },
        ));
        let objective = StrategyObjective::new(
            context,
            StrategyConfig::new("BTC/USDT:USDT", "1h"),
            ScoringConstraints::default(),
        );

        let params: ParameterSet = [
            ("min_natr".to_string(), ParamValue::Float(2.0)),
            ("max_natr".to_string(), ParamValue::Float(1.0)),
        ]
        .into_iter()
        .collect();

        let evaluation = objective.evaluate(&params);
        assert!(matches!(evaluation.outcome, TrialOutcome::Invalid { .. }));
        assert!(evaluation.metrics.is_none());
        assert_eq!(predictor.calls(), 0);
    }

    #[test]
    fn test_closure_objective() {
        let objective = |params: &ParameterSet| {
            let x = params.get_f64("x").unwrap_or_default();
            TrialEvaluation::completed(-x * x, BacktestMetrics::zero(1000.0))
        };
        let params: ParameterSet = [("x".to_string(), ParamValue::Float(2.0))]
            .into_iter()
            .collect();
        assert_eq!(objective.evaluate(&params).outcome.score(), Some(-4.0));
    }
}
