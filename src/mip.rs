use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::branch_bound::theoretical_minimum;
use crate::error::{OptimizeError, Result};
use crate::patterns::Pattern;
use crate::stick::StickBin;
use crate::types::{Piece, SolutionStatus, Stock, to_inches};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Minimize,
}

/// Column-wise sparse linear model in the layout MIP solvers consume.
///
/// Columns are patterns (how many sticks are cut that way), rows are the
/// distinct required lengths. Rows are equalities: the plan produces exactly
/// the ordered quantities, never extras.
#[derive(Debug, Clone)]
pub struct CuttingStockModel {
    pub num_cols: usize,
    pub num_rows: usize,
    pub col_cost: Vec<f64>,
    pub col_lower: Vec<f64>,
    pub col_upper: Vec<f64>,
    pub integrality: Vec<bool>,
    pub row_lower: Vec<f64>,
    pub row_upper: Vec<f64>,
    /// Entries of column `c` live in `col_start[c]..col_start[c + 1]`.
    pub col_start: Vec<usize>,
    pub row_index: Vec<usize>,
    pub value: Vec<f64>,
    pub sense: Sense,
    pub rel_gap: f64,
    pub time_limit: Option<Duration>,
    /// No plan uses fewer sticks than this.
    pub lower_bound: f64,
    /// Known feasible column values to start from.
    pub initial: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolverStatus {
    Optimal,
    /// Integer-feasible with the given relative gap to the best bound.
    Feasible { gap: f64 },
    /// Time ran out; `values` hold the best plan found so far.
    TimeLimit { gap: f64 },
    Infeasible,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct SolverOutput {
    pub status: SolverStatus,
    pub values: Vec<f64>,
}

pub trait MipBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn solve(&self, model: &CuttingStockModel) -> SolverOutput;
}

/// Relative distance of an objective value from the model's lower bound.
pub fn bound_gap(objective: f64, lower_bound: f64) -> f64 {
    if objective <= 0.0 {
        return 0.0;
    }
    ((objective - lower_bound) / objective).max(0.0)
}

/// A model together with what its rows and columns stand for.
#[derive(Debug, Clone)]
pub struct PatternProgram {
    pub model: CuttingStockModel,
    pub patterns: Vec<Pattern>,
    /// Length (units) of each row, ascending.
    pub rows: Vec<i64>,
    pub demand: Vec<u32>,
}

impl PatternProgram {
    /// Seeds the model with an existing packing. Sticks whose pattern is
    /// not a column leave the model unseeded.
    pub fn warm_start(&mut self, bins: &[StickBin]) {
        let index: HashMap<&[i64], usize> = self
            .patterns
            .iter()
            .enumerate()
            .map(|(c, p)| (p.lengths.as_slice(), c))
            .collect();

        let mut counts = vec![0.0; self.patterns.len()];
        for bin in bins {
            let mut lengths: Vec<i64> = bin.pieces.iter().map(|p| p.units).collect();
            lengths.sort_unstable();
            match index.get(lengths.as_slice()) {
                Some(&c) => counts[c] += 1.0,
                None => {
                    tracing::debug!("seed uses a pattern outside the model, starting cold");
                    return;
                }
            }
        }
        self.model.initial = Some(counts);
    }
}

pub struct ModelBuilder {
    stock: Stock,
    rel_gap: f64,
    time_limit: Option<Duration>,
}

impl ModelBuilder {
    pub fn new(stock: Stock, rel_gap: f64) -> Self {
        Self {
            stock,
            rel_gap,
            time_limit: None,
        }
    }

    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn build(&self, pieces: &[Piece], patterns: Vec<Pattern>) -> Result<PatternProgram> {
        if patterns.is_empty() {
            return Err(OptimizeError::InfeasiblePatternSet);
        }

        let mut demand_by_len: BTreeMap<i64, u32> = BTreeMap::new();
        for p in pieces {
            *demand_by_len.entry(p.units).or_default() += 1;
        }
        let rows: Vec<i64> = demand_by_len.keys().copied().collect();
        let demand: Vec<u32> = demand_by_len.values().copied().collect();

        let num_cols = patterns.len();
        let mut col_start = Vec::with_capacity(num_cols + 1);
        let mut row_index = Vec::new();
        let mut value = Vec::new();
        col_start.push(0);
        for pattern in &patterns {
            for (r, &len) in rows.iter().enumerate() {
                let n = pattern.count_of(len);
                if n > 0 {
                    row_index.push(r);
                    value.push(n as f64);
                }
            }
            col_start.push(row_index.len());
        }

        let model = CuttingStockModel {
            num_cols,
            num_rows: rows.len(),
            col_cost: vec![1.0; num_cols],
            col_lower: vec![0.0; num_cols],
            col_upper: vec![f64::INFINITY; num_cols],
            integrality: vec![true; num_cols],
            row_lower: demand.iter().map(|&d| d as f64).collect(),
            row_upper: demand.iter().map(|&d| d as f64).collect(),
            col_start,
            row_index,
            value,
            sense: Sense::Minimize,
            rel_gap: self.rel_gap,
            time_limit: self.time_limit,
            lower_bound: theoretical_minimum(pieces, self.stock) as f64,
            initial: None,
        };
        tracing::debug!(
            cols = model.num_cols,
            rows = model.num_rows,
            nonzeros = model.value.len(),
            lower_bound = model.lower_bound,
            "built cutting-stock model"
        );

        Ok(PatternProgram {
            model,
            patterns,
            rows,
            demand,
        })
    }

    fn accepted(&self, gap: f64) -> Option<SolutionStatus> {
        if gap <= 1e-9 {
            Some(SolutionStatus::Optimal)
        } else if gap <= self.rel_gap {
            Some(SolutionStatus::NearOptimal)
        } else {
            None
        }
    }

    /// Turns solver output into concrete sticks, handing out cut ids in
    /// ascending order per length.
    pub fn interpret(
        &self,
        program: &PatternProgram,
        pieces: &[Piece],
        output: &SolverOutput,
    ) -> Result<(Vec<StickBin>, SolutionStatus)> {
        let status = match &output.status {
            SolverStatus::Optimal => SolutionStatus::Optimal,
            SolverStatus::Feasible { gap } => match self.accepted(*gap) {
                Some(SolutionStatus::Optimal) => SolutionStatus::NearOptimal,
                Some(status) => status,
                None => {
                    return Err(OptimizeError::SolverFailure(format!(
                        "stopped at relative gap {:.4}, above accepted {:.4}",
                        gap, self.rel_gap
                    )));
                }
            },
            SolverStatus::TimeLimit { gap } => self.accepted(*gap).unwrap_or_else(|| {
                tracing::warn!(gap, "MIP time limit reached, keeping best plan found");
                SolutionStatus::Cancelled
            }),
            SolverStatus::Infeasible => {
                return Err(OptimizeError::SolverFailure(
                    "model infeasible: exact quantities cannot be produced".to_string(),
                ));
            }
            SolverStatus::Error(msg) => return Err(OptimizeError::SolverFailure(msg.clone())),
        };

        if output.values.len() != program.patterns.len() {
            return Err(OptimizeError::SolverFailure(format!(
                "expected {} values, solver returned {}",
                program.patterns.len(),
                output.values.len()
            )));
        }

        let mut pools: BTreeMap<i64, Vec<Piece>> = BTreeMap::new();
        for &p in pieces {
            pools.entry(p.units).or_default().push(p);
        }
        for pool in pools.values_mut() {
            // Pop from the back yields ascending ids.
            pool.sort_by(|a, b| b.cut_id.cmp(&a.cut_id));
        }

        let mut bins = Vec::new();
        for (pattern, &raw) in program.patterns.iter().zip(&output.values) {
            if !raw.is_finite() || raw < -0.5 {
                return Err(OptimizeError::SolverFailure(format!(
                    "invalid pattern count {raw}"
                )));
            }
            let count = raw.round() as usize;
            for _ in 0..count {
                let mut bin = StickBin::new(self.stock);
                // Longest first, matching how the other packers lay out sticks.
                for &len in pattern.lengths.iter().rev() {
                    let piece = pools.get_mut(&len).and_then(Vec::pop).ok_or_else(|| {
                        OptimizeError::SolverFailure(format!(
                            "solution over-produces length {}",
                            to_inches(len)
                        ))
                    })?;
                    if !bin.fits(piece) {
                        return Err(OptimizeError::SolverFailure(
                            "pattern exceeds stock length".to_string(),
                        ));
                    }
                    bin.place(piece);
                }
                bins.push(bin);
            }
        }

        if let Some((&len, pool)) = pools.iter().find(|(_, pool)| !pool.is_empty()) {
            return Err(OptimizeError::SolverFailure(format!(
                "solution leaves {} piece(s) of length {} unplaced",
                pool.len(),
                to_inches(len)
            )));
        }

        Ok((bins, status))
    }
}

#[cfg(feature = "milp")]
pub use self::good_lp_backend::GoodLpBackend;

#[cfg(feature = "milp")]
mod good_lp_backend {
    use super::{CuttingStockModel, MipBackend, Sense, SolverOutput, SolverStatus, bound_gap};
    use good_lp::{
        Expression, ProblemVariables, ResolutionError, Solution as _, SolutionStatus,
        SolverModel, Variable, WithInitialSolution, WithMipGap, WithTimeLimit, constraint,
        microlp, variable,
    };

    /// Pure-Rust backend through `good_lp`'s microlp solver.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct GoodLpBackend;

    impl MipBackend for GoodLpBackend {
        fn name(&self) -> &'static str {
            "good_lp"
        }

        fn solve(&self, model: &CuttingStockModel) -> SolverOutput {
            let mut vars = ProblemVariables::new();
            let columns: Vec<Variable> = (0..model.num_cols)
                .map(|c| {
                    let mut def = variable().min(model.col_lower[c]);
                    if model.col_upper[c].is_finite() {
                        def = def.max(model.col_upper[c]);
                    }
                    if model.integrality[c] {
                        def = def.integer();
                    }
                    vars.add(def)
                })
                .collect();

            let objective = columns
                .iter()
                .zip(&model.col_cost)
                .fold(Expression::from(0.0), |acc, (v, &cost)| acc + cost * *v);

            let mut rows: Vec<Expression> = vec![Expression::from(0.0); model.num_rows];
            for (c, var) in columns.iter().enumerate() {
                for k in model.col_start[c]..model.col_start[c + 1] {
                    rows[model.row_index[k]] += model.value[k] * *var;
                }
            }

            let mut problem = match model.sense {
                Sense::Minimize => vars.minimise(objective).using(microlp),
            };
            if let Some(limit) = model.time_limit {
                problem = problem.with_time_limit(limit.as_secs_f64());
            }
            if model.rel_gap > 0.0 {
                problem = match problem.with_mip_gap(model.rel_gap as f32) {
                    Ok(p) => p,
                    Err(e) => return failed(SolverStatus::Error(e.to_string())),
                };
            }
            if let Some(initial) = &model.initial {
                problem = problem
                    .with_initial_solution(columns.iter().copied().zip(initial.iter().copied()));
            }
            for (r, expr) in rows.into_iter().enumerate() {
                let (lo, hi) = (model.row_lower[r], model.row_upper[r]);
                if lo == hi {
                    problem = problem.with(constraint!(expr == lo));
                } else {
                    if lo.is_finite() {
                        problem = problem.with(constraint!(expr.clone() >= lo));
                    }
                    if hi.is_finite() {
                        problem = problem.with(constraint!(expr <= hi));
                    }
                }
            }

            match problem.solve() {
                Ok(solution) => {
                    let values: Vec<f64> = columns.iter().map(|v| solution.value(*v)).collect();
                    let objective: f64 = values
                        .iter()
                        .zip(&model.col_cost)
                        .map(|(x, cost)| x.round() * cost)
                        .sum();
                    let gap = bound_gap(objective, model.lower_bound);
                    let status = match solution.status() {
                        SolutionStatus::Optimal => SolverStatus::Optimal,
                        // The solver proved the gap against its own bound.
                        SolutionStatus::GapLimit => SolverStatus::Feasible {
                            gap: gap.min(model.rel_gap),
                        },
                        SolutionStatus::TimeLimit => SolverStatus::TimeLimit { gap },
                    };
                    SolverOutput { status, values }
                }
                Err(ResolutionError::Infeasible) => failed(SolverStatus::Infeasible),
                Err(e) => failed(SolverStatus::Error(e.to_string())),
            }
        }
    }

    fn failed(status: SolverStatus) -> SolverOutput {
        SolverOutput {
            status,
            values: Vec::new(),
        }
    }
}

/// The backend compiled into this build, if any.
pub fn default_backend() -> Option<Box<dyn MipBackend>> {
    #[cfg(feature = "milp")]
    {
        Some(Box::new(GoodLpBackend))
    }
    #[cfg(not(feature = "milp"))]
    {
        None
    }
}
