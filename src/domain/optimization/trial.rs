use crate::domain::optimization::constraints::INVALID_SCORE;
use crate::domain::optimization::search_space::ParameterSet;
use crate::domain::performance::BacktestMetrics;
use serde::{Deserialize, Serialize};

/// Terminal state of one trial. Trials move `proposed -> running -> outcome`
/// and never go back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialOutcome {
    Completed { score: f64 },
    /// Rejected parameters or violated constraints
    Invalid { reason: String },
    /// The trial failed or panicked
    Errored { cause: String },
}

/// Coarse status used in reports: anything not completed is pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Completed,
    Pruned,
}

impl TrialOutcome {
    pub fn score(&self) -> Option<f64> {
        match self {
            TrialOutcome::Completed { score } => Some(*score),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TrialOutcome::Completed { .. })
    }

    pub fn status(&self) -> TrialStatus {
        if self.is_completed() {
            TrialStatus::Completed
        } else {
            TrialStatus::Pruned
        }
    }
}

/// Immutable record of one evaluated parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub number: usize,
    pub params: ParameterSet,
    pub metrics: Option<BacktestMetrics>,
    pub outcome: TrialOutcome,
    pub duration_ms: u64,
}

impl TrialResult {
    /// Score for ranking; every non-completed trial ranks at the sentinel.
    pub fn fitness_score(&self) -> f64 {
        self.outcome.score().unwrap_or(INVALID_SCORE)
    }

    pub fn status(&self) -> TrialStatus {
        self.outcome.status()
    }
}
