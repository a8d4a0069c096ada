// Parameter search domain
pub mod constraints;
pub mod search_space;
pub mod strategy_result;
pub mod trial;

pub use constraints::{ConstraintViolation, INVALID_SCORE, OptimizationMode, ScoringConstraints};
pub use search_space::{ParamSpec, ParamValue, ParameterDef, ParameterSet, SearchSpace};
pub use strategy_result::{ApprovedStrategies, StrategyResult};
pub use trial::{TrialOutcome, TrialResult, TrialStatus};
