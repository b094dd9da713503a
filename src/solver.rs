use std::time::Duration;

use crate::branch_bound::{BranchAndBound, improve};
use crate::cancel::CancelToken;
use crate::config::{OptimizerConfig, Strategy};
use crate::error::{OptimizeError, Result};
use crate::greedy::GreedyPacker;
use crate::mip::{MipBackend, ModelBuilder, default_backend};
use crate::patterns::PatternGenerator;
use crate::stick::StickBin;
use crate::types::{Cut, Demand, Method, Piece, Solution, SolutionStatus, Stock};

pub struct Solver {
    stock_length: f64,
    kerf: f64,
    demands: Vec<Demand>,
    config: OptimizerConfig,
    backend: Option<Box<dyn MipBackend>>,
}

impl Solver {
    pub fn new(stock_length: f64, kerf: f64, demands: Vec<Demand>) -> Self {
        Self {
            stock_length,
            kerf,
            demands,
            config: OptimizerConfig::default(),
            backend: default_backend(),
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_backend(mut self, backend: Box<dyn MipBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn without_backend(mut self) -> Self {
        self.backend = None;
        self
    }

    pub fn solve(&self) -> Result<Solution> {
        self.solve_with_token(&CancelToken::new())
    }

    pub fn solve_with_token(&self, token: &CancelToken) -> Result<Solution> {
        let (stock, cuts) = self.validate()?;
        let pieces: Vec<Piece> = cuts.iter().map(Piece::from_cut).collect();

        let token = match self.config.time_limit_ms {
            Some(ms) => token.child_with_timeout(Duration::from_millis(ms)),
            None => token.clone(),
        };

        let strategy = self.resolve_strategy(pieces.len());
        tracing::info!(
            cuts = pieces.len(),
            stock = self.stock_length,
            kerf = self.kerf,
            ?strategy,
            "optimizing"
        );

        let solution = match strategy {
            Strategy::Auto | Strategy::Greedy => self.greedy(&pieces, stock),
            Strategy::BranchAndBound => self.branch_and_bound(&pieces, stock, &token),
            Strategy::Mip => match self.mip(&pieces, stock, &token) {
                Ok(sol) => sol,
                Err(e) if self.config.fallback_to_greedy => {
                    tracing::warn!(error = %e, "MIP failed, falling back to greedy");
                    self.greedy(&pieces, stock)
                }
                Err(e) if self.config.strategy == Strategy::Auto
                    && matches!(e, OptimizeError::PatternLimit { .. }) =>
                {
                    tracing::info!(error = %e, "too many patterns for MIP, using greedy");
                    self.greedy(&pieces, stock)
                }
                Err(e) => return Err(e),
            },
        };

        tracing::info!(
            sticks = solution.stick_count(),
            waste = solution.total_waste,
            status = ?solution.status,
            method = %solution.method,
            "optimization finished"
        );
        Ok(solution)
    }

    /// Checks the request and expands demands into cuts with ids 1..=n.
    pub fn validate(&self) -> Result<(Stock, Vec<Cut>)> {
        if !self.stock_length.is_finite() || self.stock_length <= 0.0 {
            return Err(OptimizeError::InvalidInput(format!(
                "stock length must be positive, got {}",
                self.stock_length
            )));
        }
        if !self.kerf.is_finite() || self.kerf < 0.0 {
            return Err(OptimizeError::InvalidInput(format!(
                "kerf must be zero or positive, got {}",
                self.kerf
            )));
        }
        if self.demands.is_empty() {
            return Err(OptimizeError::InvalidInput("cut list is empty".to_string()));
        }

        let stock = Stock::new(self.stock_length, self.kerf);
        let mut cuts = Vec::new();
        let mut next_id = 1u32;
        for d in &self.demands {
            if !d.length.is_finite() || d.length <= 0.0 {
                return Err(OptimizeError::InvalidInput(format!(
                    "cut length must be positive, got {}",
                    d.length
                )));
            }
            if d.qty == 0 {
                return Err(OptimizeError::InvalidInput(format!(
                    "quantity for length {} must be non-zero",
                    d.length
                )));
            }
            if d.length > self.stock_length {
                return Err(OptimizeError::InvalidInput(format!(
                    "cut length {} exceeds stock length {}",
                    d.length, self.stock_length
                )));
            }
            for _ in 0..d.qty {
                cuts.push(Cut {
                    id: next_id,
                    length: d.length,
                });
                next_id += 1;
            }
        }
        Ok((stock, cuts))
    }

    fn resolve_strategy(&self, cut_count: usize) -> Strategy {
        match self.config.strategy {
            Strategy::Auto if cut_count <= self.config.greedy_threshold => {
                Strategy::BranchAndBound
            }
            Strategy::Auto if self.backend.is_some() => Strategy::Mip,
            Strategy::Auto => Strategy::Greedy,
            s => s,
        }
    }

    fn greedy(&self, pieces: &[Piece], stock: Stock) -> Solution {
        let bins = GreedyPacker::new(stock, self.config.greedy_threshold).pack(pieces);
        to_solution(bins, stock, SolutionStatus::Heuristic, Method::Greedy)
    }

    fn branch_and_bound(&self, pieces: &[Piece], stock: Stock, token: &CancelToken) -> Solution {
        let seed = GreedyPacker::new(stock, self.config.greedy_threshold).pack(pieces);
        let outcome = BranchAndBound::new(stock, token).search(pieces, seed);
        if outcome.cancelled {
            tracing::warn!(
                sticks = outcome.bins.len(),
                nodes = outcome.nodes,
                "search interrupted, keeping best plan found"
            );
        }
        let status = if outcome.proven_optimal {
            SolutionStatus::Optimal
        } else {
            SolutionStatus::Cancelled
        };
        let bins = if outcome.proven_optimal {
            outcome.bins
        } else {
            improve(outcome.bins, self.config.improvement_rounds)
        };
        to_solution(bins, stock, status, Method::BranchAndBound)
    }

    fn mip(&self, pieces: &[Piece], stock: Stock, token: &CancelToken) -> Result<Solution> {
        let backend = self
            .backend
            .as_deref()
            .ok_or(OptimizeError::SolverUnavailable)?;

        let lengths: Vec<i64> = pieces.iter().map(|p| p.units).collect();
        let patterns = PatternGenerator::new(stock, self.config.max_patterns).generate(&lengths)?;

        let seed = GreedyPacker::new(stock, self.config.greedy_threshold).pack(pieces);
        let limit = self.mip_time_limit(token);
        if token.is_cancelled() || limit.is_zero() {
            tracing::warn!("no time left for the MIP, keeping the greedy plan");
            return Ok(to_solution(seed, stock, SolutionStatus::Cancelled, Method::Greedy));
        }

        let builder =
            ModelBuilder::new(stock, self.config.effective_gap()).with_time_limit(Some(limit));
        let mut program = builder.build(pieces, patterns)?;
        program.warm_start(&seed);

        tracing::debug!(
            backend = backend.name(),
            time_limit_ms = limit.as_millis() as u64,
            "submitting model"
        );
        let output = backend.solve(&program.model);
        let (bins, status) = builder.interpret(&program, pieces, &output)?;
        Ok(to_solution(bins, stock, status, Method::Mip))
    }

    /// The configured MIP cap, shortened to the caller's deadline.
    fn mip_time_limit(&self, token: &CancelToken) -> Duration {
        let cap = Duration::from_millis(self.config.mip_time_limit_ms);
        token.remaining().map_or(cap, |left| left.min(cap))
    }
}

fn to_solution(
    bins: Vec<StickBin>,
    stock: Stock,
    status: SolutionStatus,
    method: Method,
) -> Solution {
    let bins = bins.into_iter().map(|b| b.pieces).collect();
    Solution::new(bins, stock, status, method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mip::{CuttingStockModel, SolverOutput, SolverStatus};
    use std::time::Instant;

    /// Validates a complete solution:
    /// 1. Every cut id appears exactly once and lengths match the demands
    /// 2. No stick is over-filled
    /// 3. used = sum + kerf * (n - 1) on every stick
    fn assert_solution_valid(sol: &Solution, demands: &[Demand]) {
        let mut expected: Vec<(u32, f64)> = Vec::new();
        let mut id = 1;
        for d in demands {
            for _ in 0..d.qty {
                expected.push((id, d.length));
                id += 1;
            }
        }
        let mut placed: Vec<(u32, f64)> = sol
            .sticks
            .iter()
            .flat_map(|s| s.cuts.iter().map(|c| (c.id, c.length)))
            .collect();
        placed.sort_by_key(|&(id, _)| id);
        assert_eq!(placed, expected, "placed cuts differ from the request");

        for (si, stick) in sol.sticks.iter().enumerate() {
            let sum: f64 = stick.cuts.iter().map(|c| c.length).sum();
            let n = stick.cuts.len() as f64;
            let expected_used = sum + sol.kerf * (n - 1.0);
            assert!(
                (stick.used_length - expected_used).abs() < 1e-6,
                "stick {si}: used {} != {}",
                stick.used_length,
                expected_used
            );
            assert!(
                stick.used_length <= sol.stock_length + 1e-9,
                "stick {si} overflows: {} > {}",
                stick.used_length,
                sol.stock_length
            );
            assert!((stick.used_length + stick.waste_length - sol.stock_length).abs() < 1e-9);
        }
        let waste: f64 = sol.sticks.iter().map(|s| s.waste_length).sum();
        assert!((waste - sol.total_waste).abs() < 1e-6);
    }

    fn config(strategy: Strategy) -> OptimizerConfig {
        OptimizerConfig::default().with_strategy(strategy)
    }

    struct FailingBackend;

    impl MipBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn solve(&self, _model: &CuttingStockModel) -> SolverOutput {
            SolverOutput {
                status: SolverStatus::Error("solver crashed".to_string()),
                values: Vec::new(),
            }
        }
    }

    #[test]
    fn test_three_lengths_large_order() {
        let demands = vec![
            Demand::new(60.0, 80),
            Demand::new(100.0, 100),
            Demand::new(36.0, 90),
        ];
        let sol = Solver::new(288.0, 0.0625, demands.clone())
            .with_config(config(Strategy::Greedy))
            .solve()
            .unwrap();
        assert_solution_valid(&sol, &demands);
        assert_eq!(sol.cut_count(), 270);
        assert!(sol.efficiency_percent() > 85.0, "{}", sol.efficiency_percent());
    }

    #[test]
    fn test_small_order_optimal_two_sticks() {
        let demands = vec![
            Demand::new(120.0, 1),
            Demand::new(60.0, 2),
            Demand::new(50.0, 2),
            Demand::new(40.0, 1),
        ];
        for strategy in [Strategy::Auto, Strategy::BranchAndBound, Strategy::Greedy] {
            let sol = Solver::new(240.0, 0.125, demands.clone())
                .with_config(config(strategy))
                .solve()
                .unwrap();
            assert_solution_valid(&sol, &demands);
            assert_eq!(sol.stick_count(), 2, "{strategy:?}");
        }
    }

    #[cfg(feature = "milp")]
    #[test]
    fn test_small_order_optimal_with_mip() {
        let demands = vec![
            Demand::new(120.0, 1),
            Demand::new(60.0, 2),
            Demand::new(50.0, 2),
            Demand::new(40.0, 1),
        ];
        let sol = Solver::new(240.0, 0.125, demands.clone())
            .with_config(config(Strategy::Mip))
            .solve()
            .unwrap();
        assert_solution_valid(&sol, &demands);
        assert_eq!(sol.stick_count(), 2);
        assert_eq!(sol.status, SolutionStatus::Optimal);
        assert_eq!(sol.method, Method::Mip);
    }

    #[test]
    fn test_cut_longer_than_stock_rejected() {
        let err = Solver::new(288.0, 0.125, vec![Demand::new(300.0, 1)])
            .solve()
            .unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidInput(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_invalid_requests() {
        let cases = [
            Solver::new(0.0, 0.125, vec![Demand::new(10.0, 1)]),
            Solver::new(-5.0, 0.125, vec![Demand::new(10.0, 1)]),
            Solver::new(100.0, -1.0, vec![Demand::new(10.0, 1)]),
            Solver::new(100.0, 0.125, vec![]),
            Solver::new(100.0, 0.125, vec![Demand::new(0.0, 1)]),
            Solver::new(100.0, 0.125, vec![Demand::new(10.0, 0)]),
            Solver::new(100.0, 0.125, vec![Demand::new(f64::NAN, 1)]),
        ];
        for solver in cases {
            assert!(matches!(solver.solve(), Err(OptimizeError::InvalidInput(_))));
        }
    }

    #[test]
    fn test_five_hundred_mixed_cuts_bounded_time() {
        let sizes = [120.0, 100.0, 80.0, 60.0, 48.0, 36.0, 24.0];
        let qty = [72, 72, 72, 71, 71, 71, 71];
        let demands: Vec<Demand> = sizes
            .iter()
            .zip(qty)
            .map(|(&l, q)| Demand::new(l, q))
            .collect();

        for strategy in [Strategy::Greedy, Strategy::BranchAndBound] {
            let started = Instant::now();
            let sol = Solver::new(288.0, 0.125, demands.clone())
                .with_config(config(strategy).with_time_limit_ms(300))
                .solve()
                .unwrap();
            assert!(started.elapsed() < Duration::from_secs(10));
            assert_solution_valid(&sol, &demands);
            assert_eq!(sol.cut_count(), 500);
            assert!(sol.stick_count() > 0);
        }
    }

    #[test]
    fn test_kerf_monotonicity() {
        let demands = vec![
            Demand::new(47.5, 4),
            Demand::new(31.25, 3),
            Demand::new(22.0, 5),
            Demand::new(95.0, 2),
        ];
        let mut last_count = 0;
        for kerf in [0.0, 0.0625, 0.125, 0.25, 0.5, 1.0] {
            let sol = Solver::new(144.0, kerf, demands.clone())
                .with_config(config(Strategy::BranchAndBound))
                .solve()
                .unwrap();
            assert_solution_valid(&sol, &demands);
            assert_eq!(sol.status, SolutionStatus::Optimal);
            assert!(sol.stick_count() >= last_count, "kerf {kerf}");
            last_count = sol.stick_count();
        }
    }

    #[test]
    fn test_cancelled_search_still_returns_plan() {
        let demands = vec![
            Demand::new(45.0, 1),
            Demand::new(40.0, 1),
            Demand::new(35.0, 1),
            Demand::new(30.0, 1),
            Demand::new(25.0, 2),
        ];
        let token = CancelToken::new();
        token.cancel();
        let sol = Solver::new(100.0, 0.0, demands.clone())
            .with_config(config(Strategy::BranchAndBound))
            .solve_with_token(&token)
            .unwrap();
        assert_solution_valid(&sol, &demands);
        assert_eq!(sol.status, SolutionStatus::Cancelled);
    }

    #[test]
    fn test_solver_failure_surfaced() {
        let demands = vec![Demand::new(60.0, 20), Demand::new(40.0, 20)];
        let err = Solver::new(100.0, 0.0, demands)
            .with_config(config(Strategy::Mip))
            .with_backend(Box::new(FailingBackend))
            .solve()
            .unwrap_err();
        assert_eq!(err, OptimizeError::SolverFailure("solver crashed".to_string()));
    }

    #[test]
    fn test_solver_failure_fallback_when_opted_in() {
        let demands = vec![Demand::new(60.0, 20), Demand::new(40.0, 20)];
        let mut cfg = config(Strategy::Mip);
        cfg.fallback_to_greedy = true;
        let sol = Solver::new(100.0, 0.0, demands.clone())
            .with_config(cfg)
            .with_backend(Box::new(FailingBackend))
            .solve()
            .unwrap();
        assert_solution_valid(&sol, &demands);
        assert_eq!(sol.method, Method::Greedy);
        assert_eq!(sol.status, SolutionStatus::Heuristic);
    }

    #[test]
    fn test_mip_without_backend() {
        let err = Solver::new(100.0, 0.0, vec![Demand::new(10.0, 1)])
            .with_config(config(Strategy::Mip))
            .without_backend()
            .solve()
            .unwrap_err();
        assert_eq!(err, OptimizeError::SolverUnavailable);
    }

    #[test]
    fn test_auto_without_backend_uses_greedy_for_large_lists() {
        let demands = vec![Demand::new(60.0, 20), Demand::new(40.0, 20)];
        let sol = Solver::new(100.0, 0.0, demands.clone())
            .without_backend()
            .solve()
            .unwrap();
        assert_solution_valid(&sol, &demands);
        assert_eq!(sol.method, Method::Greedy);
        assert_eq!(sol.stick_count(), 20);
    }

    #[test]
    fn test_auto_small_list_is_exact() {
        let demands = vec![
            Demand::new(45.0, 1),
            Demand::new(40.0, 1),
            Demand::new(35.0, 1),
            Demand::new(30.0, 1),
            Demand::new(25.0, 2),
        ];
        let sol = Solver::new(100.0, 0.0, demands.clone()).solve().unwrap();
        assert_solution_valid(&sol, &demands);
        assert_eq!(sol.stick_count(), 2);
        assert_eq!(sol.status, SolutionStatus::Optimal);
        assert_eq!(sol.method, Method::BranchAndBound);
    }

    #[test]
    fn test_decimal_lengths_round_trip() {
        let demands = vec![Demand::new(10.3, 2), Demand::new(33.7, 3)];
        for strategy in [Strategy::Greedy, Strategy::BranchAndBound] {
            let sol = Solver::new(100.0, 0.1, demands.clone())
                .with_config(config(strategy))
                .solve()
                .unwrap();
            assert_solution_valid(&sol, &demands);
            let mut lengths: Vec<f64> = sol
                .sticks
                .iter()
                .flat_map(|s| s.cuts.iter().map(|c| c.length))
                .collect();
            lengths.sort_by(f64::total_cmp);
            assert_eq!(lengths, vec![10.3, 10.3, 33.7, 33.7, 33.7]);
        }
    }

    #[test]
    fn test_cut_barely_longer_than_stock_rejected() {
        let err = Solver::new(288.0, 0.125, vec![Demand::new(288.0004, 1)])
            .solve()
            .unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidInput(_)));

        let sol = Solver::new(288.3, 0.125, vec![Demand::new(288.3, 1)])
            .solve()
            .unwrap();
        assert_eq!(sol.stick_count(), 1);
        assert_eq!(sol.sticks[0].cuts[0].length, 288.3);
    }

    #[test]
    fn test_auto_three_lengths_large_order() {
        let demands = vec![
            Demand::new(60.0, 80),
            Demand::new(100.0, 100),
            Demand::new(36.0, 90),
        ];
        let started = Instant::now();
        let sol = Solver::new(288.0, 0.0625, demands.clone()).solve().unwrap();
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_solution_valid(&sol, &demands);
        assert!(sol.efficiency_percent() > 85.0, "{}", sol.efficiency_percent());
    }

    #[test]
    fn test_auto_five_hundred_mixed_cuts_bounded_time() {
        let sizes = [120.0, 100.0, 80.0, 60.0, 48.0, 36.0, 24.0];
        let qty = [72, 72, 72, 71, 71, 71, 71];
        let demands: Vec<Demand> = sizes
            .iter()
            .zip(qty)
            .map(|(&l, q)| Demand::new(l, q))
            .collect();
        let greedy = Solver::new(288.0, 0.125, demands.clone())
            .with_config(config(Strategy::Greedy))
            .solve()
            .unwrap();

        let started = Instant::now();
        let sol = Solver::new(288.0, 0.125, demands.clone())
            .with_config(OptimizerConfig::default().with_time_limit_ms(3_000))
            .solve()
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_solution_valid(&sol, &demands);
        assert!(sol.stick_count() <= greedy.stick_count());
    }

    #[test]
    fn test_expired_deadline_skips_mip() {
        let demands = vec![Demand::new(60.0, 20), Demand::new(40.0, 20)];
        let token = CancelToken::with_timeout(Duration::ZERO);
        let sol = Solver::new(100.0, 0.0, demands.clone())
            .with_config(config(Strategy::Mip))
            .with_backend(Box::new(FailingBackend))
            .solve_with_token(&token)
            .unwrap();
        assert_solution_valid(&sol, &demands);
        assert_eq!(sol.status, SolutionStatus::Cancelled);
        assert_eq!(sol.method, Method::Greedy);
    }

    #[test]
    fn test_zero_kerf_exact_fill() {
        let demands = vec![Demand::new(50.0, 4)];
        let sol = Solver::new(100.0, 0.0, demands.clone()).solve().unwrap();
        assert_solution_valid(&sol, &demands);
        assert_eq!(sol.stick_count(), 2);
        assert_eq!(sol.total_waste, 0.0);
    }
}
