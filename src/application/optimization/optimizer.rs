//! Parallel study loop: proposes trials with the TPE sampler, evaluates
//! each batch on a rayon pool and merges the results into the trial ledger.

use crate::application::optimization::objective::{Objective, TrialEvaluation};
use crate::application::optimization::progress::ProgressTracker;
use crate::application::optimization::sampler::{Observation, TpeSampler, TpeSettings};
use crate::domain::errors::OptimizationError;
use crate::domain::optimization::{INVALID_SCORE, ParameterSet, SearchSpace, TrialOutcome, TrialResult};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Cooperative stop signal, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerSettings {
    pub n_trials: usize,
    pub n_workers: usize,
    pub tpe: TpeSettings,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            n_trials: 200,
            n_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            tpe: TpeSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub best: TrialResult,
    /// Every finished trial in proposal order
    pub trials: Vec<TrialResult>,
    pub cancelled: bool,
}

pub struct StudyOptimizer {
    space: SearchSpace,
    settings: OptimizerSettings,
    cancel: CancellationToken,
}

impl StudyOptimizer {
    pub fn new(space: SearchSpace, settings: OptimizerSettings) -> Self {
        Self {
            space,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Runs the study and returns the highest-scoring completed trial.
    pub fn optimize<O>(&self, objective: &O) -> Result<OptimizationOutcome, OptimizationError>
    where
        O: Objective + ?Sized,
    {
        if self.space.is_empty() {
            return Err(OptimizationError::EmptySearchSpace);
        }
        self.space.validate(None)?;

        let n_trials = self.settings.n_trials;
        let n_workers = self.settings.n_workers.max(1);

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .thread_name(|i| format!("trial-worker-{}", i))
            .build()
            .map_err(|e| OptimizationError::WorkerPool(e.to_string()))?;

        info!(
            "Study: {} trials over {} parameters with {} workers (seed {})",
            n_trials,
            self.space.len(),
            n_workers,
            self.settings.tpe.seed
        );

        let mut sampler = TpeSampler::new(self.space.clone(), self.settings.tpe.clone());
        let progress = ProgressTracker::new(n_trials);
        let mut trials: Vec<TrialResult> = Vec::with_capacity(n_trials);
        let mut cancelled = false;

        while trials.len() < n_trials {
            if self.cancel.is_cancelled() {
                info!("Study: cancelled after {} trials", trials.len());
                cancelled = true;
                break;
            }

            let batch_size = n_workers.min(n_trials - trials.len());
            let history = observations(&trials);
            let proposals: Vec<(usize, ParameterSet)> = (0..batch_size)
                .map(|k| (trials.len() + k, sampler.sample(&history)))
                .collect();

            let batch: Vec<TrialResult> = pool.install(|| {
                proposals
                    .into_par_iter()
                    .map(|(number, params)| run_trial(objective, number, params))
                    .collect()
            });

            for trial in &batch {
                if let TrialOutcome::Errored { cause } = &trial.outcome {
                    warn!("Study: trial {} errored: {}", trial.number, cause);
                }
            }
            trials.extend(batch);

            info!("Study: {}", progress.record(&trials));
        }

        let best = best_trial(&trials).cloned().ok_or_else(|| {
            let errored = trials
                .iter()
                .filter(|t| matches!(t.outcome, TrialOutcome::Errored { .. }))
                .count();
            OptimizationError::NoViableConfiguration {
                trials: trials.len(),
                invalid: trials.len() - errored,
                errored,
            }
        })?;

        info!(
            "Study: best trial #{} scored {:.4} with {}",
            best.number,
            best.fitness_score(),
            best.params
        );

        Ok(OptimizationOutcome {
            best,
            trials,
            cancelled,
        })
    }
}

/// Convenience wrapper around [`StudyOptimizer`] with default TPE settings.
pub fn optimize<O>(
    objective: &O,
    space: &SearchSpace,
    n_trials: usize,
    n_workers: usize,
) -> Result<(ParameterSet, Vec<TrialResult>), OptimizationError>
where
    O: Objective + ?Sized,
{
    let settings = OptimizerSettings {
        n_trials,
        n_workers,
        tpe: TpeSettings::default(),
    };
    let outcome = StudyOptimizer::new(space.clone(), settings).optimize(objective)?;
    Ok((outcome.best.params, outcome.trials))
}

/// Highest completed score; ties go to the earliest trial.
pub fn best_trial(trials: &[TrialResult]) -> Option<&TrialResult> {
    trials
        .iter()
        .filter(|t| t.outcome.is_completed())
        .max_by(|a, b| {
            a.fitness_score()
                .total_cmp(&b.fitness_score())
                .then(b.number.cmp(&a.number))
        })
}

/// Invalid trials are fed to the sampler at the sentinel so their region is
/// modelled as bad; errored trials say nothing about the region.
fn observations(trials: &[TrialResult]) -> Vec<Observation<'_>> {
    trials
        .iter()
        .filter_map(|trial| match &trial.outcome {
            TrialOutcome::Completed { score } => Some(Observation {
                params: &trial.params,
                value: *score,
            }),
            TrialOutcome::Invalid { .. } => Some(Observation {
                params: &trial.params,
                value: INVALID_SCORE,
            }),
            TrialOutcome::Errored { .. } => None,
        })
        .collect()
}

fn run_trial<O>(objective: &O, number: usize, params: ParameterSet) -> TrialResult
where
    O: Objective + ?Sized,
{
    let started = Instant::now();
    let evaluation = panic::catch_unwind(AssertUnwindSafe(|| objective.evaluate(&params)))
        .unwrap_or_else(|payload| TrialEvaluation::errored(panic_message(payload.as_ref())));

    TrialResult {
        number,
        params,
        metrics: evaluation.metrics,
        outcome: evaluation.outcome,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::optimization::{ParamValue, ParameterDef};
    use crate::domain::performance::BacktestMetrics;

    fn space() -> SearchSpace {
        SearchSpace::new(vec![
            ParameterDef::float("x", -5.0, 5.0),
            ParameterDef::int("n", 1, 10),
        ])
    }

    fn settings(n_trials: usize, n_workers: usize) -> OptimizerSettings {
        OptimizerSettings {
            n_trials,
            n_workers,
            tpe: TpeSettings {
                n_startup_trials: 5,
                ..TpeSettings::default()
            },
        }
    }

    fn quadratic(params: &ParameterSet) -> TrialEvaluation {
        let x = params.get_f64("x").unwrap_or_default();
        TrialEvaluation::completed(-(x - 1.0).powi(2), BacktestMetrics::zero(1000.0))
    }

    #[test]
    fn test_finds_region_near_optimum() {
        let outcome = StudyOptimizer::new(space(), settings(60, 4))
            .optimize(&quadratic)
            .unwrap();
        assert_eq!(outcome.trials.len(), 60);
        let x = outcome.best.params.get_f64("x").unwrap();
        assert!((x - 1.0).abs() < 1.0, "best x = {x}");
    }

    #[test]
    fn test_trial_numbers_are_sequential() {
        let outcome = StudyOptimizer::new(space(), settings(13, 4))
            .optimize(&quadratic)
            .unwrap();
        let numbers: Vec<usize> = outcome.trials.iter().map(|t| t.number).collect();
        assert_eq!(numbers, (0..13).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_trial_is_recorded_as_errored() {
        let objective = |params: &ParameterSet| {
            if params.get("n").and_then(ParamValue::as_i64) == Some(3) {
                panic!("boom");
            }
            quadratic(params)
        };
        let outcome = StudyOptimizer::new(space(), settings(40, 2))
            .optimize(&objective)
            .unwrap();
        assert_eq!(outcome.trials.len(), 40);
        for trial in &outcome.trials {
            if trial.params.get("n").and_then(ParamValue::as_i64) == Some(3) {
                assert!(matches!(trial.outcome, TrialOutcome::Errored { .. }));
            }
        }
    }

    #[test]
    fn test_all_invalid_reports_no_viable_configuration() {
        let objective = |_: &ParameterSet| TrialEvaluation::invalid("dd", None);
        let err = StudyOptimizer::new(space(), settings(10, 3))
            .optimize(&objective)
            .unwrap_err();
        assert_eq!(
            err,
            OptimizationError::NoViableConfiguration {
                trials: 10,
                invalid: 10,
                errored: 0
            }
        );
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let result = StudyOptimizer::new(space(), settings(10, 2))
            .with_cancellation(token)
            .optimize(&quadratic);
        assert!(matches!(
            result,
            Err(OptimizationError::NoViableConfiguration { trials: 0, .. })
        ));
    }

    #[test]
    fn test_cancel_mid_study_keeps_finished_batches() {
        let token = CancellationToken::new();
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let objective = |params: &ParameterSet| {
            // Third evaluation lands in the second batch of two
            if calls.fetch_add(1, Ordering::SeqCst) == 2 {
                token.cancel();
            }
            quadratic(params)
        };

        let outcome = StudyOptimizer::new(space(), settings(20, 2))
            .with_cancellation(token.clone())
            .optimize(&objective)
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.trials.len(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let numbers: Vec<usize> = outcome.trials.iter().map(|t| t.number).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
        assert!(outcome.trials.iter().all(|t| t.outcome.is_completed()));
    }

    #[test]
    fn test_empty_space() {
        let result = StudyOptimizer::new(SearchSpace::new(vec![]), settings(5, 1)).optimize(&quadratic);
        assert_eq!(result.unwrap_err(), OptimizationError::EmptySearchSpace);
    }

    #[test]
    fn test_best_trial_tie_goes_to_earliest() {
        let make = |number, score| TrialResult {
            number,
            params: ParameterSet::new(),
            metrics: None,
            outcome: TrialOutcome::Completed { score },
            duration_ms: 0,
        };
        let trials = vec![make(0, 1.0), make(1, 3.0), make(2, 3.0)];
        assert_eq!(best_trial(&trials).unwrap().number, 1);
    }
}
