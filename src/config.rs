use serde::{Deserialize, Serialize};

pub const DEFAULT_KERF: f64 = 0.125;

/// Which algorithm produces the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Exact search for small lists, MIP for larger ones, greedy without a backend.
    #[default]
    Auto,
    Mip,
    Greedy,
    BranchAndBound,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Strategy::Auto),
            "mip" => Ok(Strategy::Mip),
            "greedy" => Ok(Strategy::Greedy),
            "branch-and-bound" | "bnb" => Ok(Strategy::BranchAndBound),
            _ => Err(format!(
                "invalid strategy '{}', expected: auto, mip, greedy, or branch-and-bound",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub strategy: Strategy,
    /// Cut lists at or below this size get the multi-start greedy and, under
    /// `Auto`, the exact search.
    pub greedy_threshold: usize,
    /// Accepted relative MIP gap, clamped to 0..=0.01.
    pub mip_rel_gap: f64,
    pub max_patterns: usize,
    pub time_limit_ms: Option<u64>,
    /// Upper bound on a single MIP solve, applied even without `time_limit_ms`.
    pub mip_time_limit_ms: u64,
    pub improvement_rounds: usize,
    /// Run the greedy packer when the MIP backend fails.
    pub fallback_to_greedy: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Auto,
            greedy_threshold: 15,
            mip_rel_gap: 0.0,
            max_patterns: 20_000,
            time_limit_ms: None,
            mip_time_limit_ms: 10_000,
            improvement_rounds: 3,
            fallback_to_greedy: false,
        }
    }
}

impl OptimizerConfig {
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_time_limit_ms(mut self, ms: u64) -> Self {
        self.time_limit_ms = Some(ms);
        self
    }

    pub fn with_mip_rel_gap(mut self, gap: f64) -> Self {
        self.mip_rel_gap = gap;
        self
    }

    pub fn effective_gap(&self) -> f64 {
        if self.mip_rel_gap.is_finite() {
            self.mip_rel_gap.clamp(0.0, 0.01)
        } else {
            0.0
        }
    }
}

/// Kerf as supplied by a caller: missing, negative or non-finite values fall
/// back to 1/8". Zero is a legitimate kerf (e.g. shear cuts).
pub fn kerf_or_default(kerf: Option<f64>) -> f64 {
    match kerf {
        Some(k) if k.is_finite() && k >= 0.0 => k,
        Some(k) => {
            tracing::warn!(kerf = k, default = DEFAULT_KERF, "invalid kerf, using default");
            DEFAULT_KERF
        }
        None => DEFAULT_KERF,
    }
}
