// Strategy optimization modules
pub mod engine;
pub mod objective;
pub mod optimizer;
pub mod progress;
pub mod reporting;
pub mod sampler;
pub mod selection;

pub use engine::{OptimizationRun, OptimizeEngine};
pub use objective::{Objective, StrategyObjective, TrialEvaluation, score};
pub use optimizer::{
    CancellationToken, OptimizationOutcome, OptimizerSettings, StudyOptimizer, best_trial, optimize,
};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use reporting::{OptimizeReporter, rank_trials};
pub use sampler::{TpeSampler, TpeSettings};
pub use selection::{SelectionCriteria, select_top};
