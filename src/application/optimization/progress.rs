use crate::domain::optimization::TrialResult;
use std::fmt;
use std::time::{Duration, Instant};

/// Advisory progress of a study, recomputed after every batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub done: usize,
    pub total: usize,
    pub completed: usize,
    pub best_score: Option<f64>,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} trials ({} completed)", self.done, self.total, self.completed)?;
        match self.best_score {
            Some(best) => write!(f, ", best {:.4}", best)?,
            None => write!(f, ", no valid trial yet")?,
        }
        if let Some(eta) = self.eta {
            write!(f, ", ETA {}s", eta.as_secs())?;
        }
        Ok(())
    }
}

pub struct ProgressTracker {
    total: usize,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            started: Instant::now(),
        }
    }

    pub fn record(&self, trials: &[TrialResult]) -> ProgressSnapshot {
        let done = trials.len();
        let elapsed = self.started.elapsed();

        let best_score = trials
            .iter()
            .filter_map(|trial| trial.outcome.score())
            .max_by(f64::total_cmp);

        let eta = (done > 0 && done < self.total).then(|| {
            let per_trial = elapsed.as_secs_f64() / done as f64;
            Duration::from_secs_f64(per_trial * (self.total - done) as f64)
        });

        ProgressSnapshot {
            done,
            total: self.total,
            completed: trials.iter().filter(|t| t.outcome.is_completed()).count(),
            best_score,
            elapsed,
            eta,
        }
    }
}
