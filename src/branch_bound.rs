use std::time::Instant;

use crate::cancel::CancelToken;
use crate::greedy::sort_descending;
use crate::stick::{FitRule, StickBin, find_bin};
use crate::types::{Piece, Stock};

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub bins: Vec<StickBin>,
    /// Search space exhausted or the theoretical minimum reached.
    pub proven_optimal: bool,
    pub cancelled: bool,
    pub nodes: u64,
}

/// Fewest sticks any packing of `pieces` can use.
///
/// `k` sticks holding `n` pieces consume `n - k` kerfs, so
/// `k * stock >= total + (n - k) * kerf`.
pub fn theoretical_minimum(pieces: &[Piece], stock: Stock) -> usize {
    if pieces.is_empty() {
        return 0;
    }
    let total: i64 = pieces.iter().map(|p| p.units).sum();
    let need = total + pieces.len() as i64 * stock.kerf;
    let per_stick = stock.length + stock.kerf;
    ((need + per_stick - 1) / per_stick) as usize
}

/// Exact search placing pieces longest first, open sticks in best-fit order
/// before a fresh one. The greedy seed is the starting upper bound.
pub struct BranchAndBound<'a> {
    stock: Stock,
    token: &'a CancelToken,
}

struct SearchState<'a> {
    pieces: &'a [Piece],
    /// `suffix[i]` = total units of `pieces[i..]`.
    suffix: Vec<i64>,
    best_count: usize,
    best: Option<Vec<StickBin>>,
    target: usize,
    nodes: u64,
    stopped: bool,
    cancelled: bool,
}

impl<'a> BranchAndBound<'a> {
    pub fn new(stock: Stock, token: &'a CancelToken) -> Self {
        Self { stock, token }
    }

    /// Searches for a packing with fewer sticks than `seed`.
    pub fn search(&self, pieces: &[Piece], seed: Vec<StickBin>) -> SearchOutcome {
        let started = Instant::now();
        let mut sorted = pieces.to_vec();
        sort_descending(&mut sorted);

        let target = theoretical_minimum(&sorted, self.stock);
        if seed.len() <= target {
            tracing::debug!(sticks = seed.len(), "seed already at theoretical minimum");
            return SearchOutcome {
                bins: seed,
                proven_optimal: true,
                cancelled: false,
                nodes: 0,
            };
        }

        let mut suffix = vec![0; sorted.len() + 1];
        for i in (0..sorted.len()).rev() {
            suffix[i] = suffix[i + 1] + sorted[i].units;
        }

        let mut state = SearchState {
            pieces: &sorted,
            suffix,
            best_count: seed.len(),
            best: None,
            target,
            nodes: 0,
            stopped: false,
            cancelled: false,
        };
        let mut bins = Vec::new();
        self.recurse(&mut state, 0, &mut bins);

        let improved = state.best.is_some();
        let outcome = SearchOutcome {
            bins: state.best.unwrap_or(seed),
            proven_optimal: !state.cancelled,
            cancelled: state.cancelled,
            nodes: state.nodes,
        };
        tracing::debug!(
            nodes = outcome.nodes,
            sticks = outcome.bins.len(),
            target,
            improved,
            cancelled = outcome.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "branch-and-bound finished"
        );
        outcome
    }

    fn recurse(&self, state: &mut SearchState<'_>, idx: usize, bins: &mut Vec<StickBin>) {
        if state.stopped {
            return;
        }
        if self.token.is_cancelled() {
            state.stopped = true;
            state.cancelled = true;
            return;
        }
        state.nodes += 1;

        if idx == state.pieces.len() {
            if bins.len() < state.best_count {
                state.best_count = bins.len();
                state.best = Some(bins.clone());
                tracing::trace!(sticks = bins.len(), nodes = state.nodes, "improved packing");
                if state.best_count <= state.target {
                    state.stopped = true;
                }
            }
            return;
        }

        if bins.len() >= state.best_count {
            return;
        }

        // Remaining pieces must fit in the open sticks' slack plus new sticks.
        let remaining = state.pieces.len() - idx;
        let need = state.suffix[idx] + remaining as i64 * self.stock.kerf;
        let slack: i64 = bins
            .iter()
            .map(|b| b.residual())
            .sum();
        let per_stick = self.stock.length + self.stock.kerf;
        let extra = if need > slack {
            ((need - slack + per_stick - 1) / per_stick) as usize
        } else {
            0
        };
        if bins.len() + extra >= state.best_count {
            return;
        }

        let piece = state.pieces[idx];

        let mut fits: Vec<(i64, usize)> = bins
            .iter()
            .enumerate()
            .filter_map(|(bi, b)| b.residual_after(piece).map(|left| (left, bi)))
            .collect();
        fits.sort_unstable();

        let mut tried_used: Vec<i64> = Vec::with_capacity(fits.len());
        for (_, bi) in fits {
            // Sticks with equal fill lead to the same subtree.
            let used = bins[bi].used();
            if tried_used.contains(&used) {
                continue;
            }
            tried_used.push(used);

            bins[bi].place(piece);
            self.recurse(state, idx + 1, bins);
            bins[bi].pop();
            if state.stopped {
                return;
            }
        }

        if bins.len() + 1 < state.best_count {
            let mut bin = StickBin::new(self.stock);
            bin.place(piece);
            bins.push(bin);
            self.recurse(state, idx + 1, bins);
            bins.pop();
        }
    }
}

/// Tries to empty whole sticks by moving their pieces into the others' slack.
/// Repeats until no stick can be removed or `max_rounds` is reached.
pub fn improve(mut bins: Vec<StickBin>, max_rounds: usize) -> Vec<StickBin> {
    for round in 0..max_rounds {
        let mut removed = None;

        // Try the emptiest sticks first.
        let mut order: Vec<usize> = (0..bins.len()).collect();
        order.sort_by_key(|&i| (bins[i].used(), i));

        for i in order {
            let mut trial: Vec<StickBin> = bins
                .iter()
                .enumerate()
                .filter(|&(k, _)| k != i)
                .map(|(_, b)| b.clone())
                .collect();
            let mut moved_all = true;
            for &piece in &bins[i].pieces {
                match find_bin(&trial, piece, FitRule::BestFit) {
                    Some(k) => trial[k].place(piece),
                    None => {
                        moved_all = false;
                        break;
                    }
                }
            }
            if moved_all {
                removed = Some(trial);
                break;
            }
        }

        match removed {
            Some(trial) => {
                tracing::debug!(round, sticks = trial.len(), "emptied a stick");
                bins = trial;
            }
            None => break,
        }
    }
    bins
}
