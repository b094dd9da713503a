use thiserror::Error;

pub type Result<T> = std::result::Result<T, OptimizeError>;

/// Reasons an optimization produced no plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no cutting pattern fits the stock length")]
    InfeasiblePatternSet,

    #[error("more than {limit} cutting patterns; use a heuristic strategy")]
    PatternLimit { limit: usize },

    #[error("solver failure: {0}")]
    SolverFailure(String),

    #[error("no MIP backend is available in this build")]
    SolverUnavailable,
}

impl OptimizeError {
    /// True when the request itself was at fault rather than the optimizer.
    pub fn is_input_error(&self) -> bool {
        matches!(self, OptimizeError::InvalidInput(_))
    }
}
