use crate::stick::{FitRule, StickBin, find_bin};
use crate::types::{Piece, Stock};

/// Order in which pieces are fed to a packer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutOrder {
    Descending,
    Ascending,
    /// Longest, shortest, second longest, second shortest, ...
    AlternatingLargeSmall,
}

/// Longest first; equal lengths keep ascending cut id.
pub fn sort_descending(pieces: &mut [Piece]) {
    pieces.sort_by(|a, b| b.units.cmp(&a.units).then(a.cut_id.cmp(&b.cut_id)));
}

pub fn ordered(pieces: &[Piece], order: CutOrder) -> Vec<Piece> {
    let mut sorted = pieces.to_vec();
    sort_descending(&mut sorted);
    match order {
        CutOrder::Descending => sorted,
        CutOrder::Ascending => {
            sorted.sort_by(|a, b| a.units.cmp(&b.units).then(a.cut_id.cmp(&b.cut_id)));
            sorted
        }
        CutOrder::AlternatingLargeSmall => {
            let mut out = Vec::with_capacity(sorted.len());
            let (mut lo, mut hi) = (0, sorted.len());
            while lo < hi {
                out.push(sorted[lo]);
                lo += 1;
                if lo < hi {
                    hi -= 1;
                    out.push(sorted[hi]);
                }
            }
            out
        }
    }
}

/// Places pieces in the given order, opening a stick when none has room.
pub fn pack_in_order(pieces: &[Piece], stock: Stock, rule: FitRule) -> Vec<StickBin> {
    let mut bins: Vec<StickBin> = Vec::new();
    for &piece in pieces {
        match find_bin(&bins, piece, rule) {
            Some(bi) => bins[bi].place(piece),
            None => {
                let mut bin = StickBin::new(stock);
                bin.place(piece);
                bins.push(bin);
            }
        }
    }
    bins
}

pub fn first_fit_decreasing(pieces: &[Piece], stock: Stock) -> Vec<StickBin> {
    pack_in_order(&ordered(pieces, CutOrder::Descending), stock, FitRule::FirstFit)
}

pub fn best_fit_decreasing(pieces: &[Piece], stock: Stock) -> Vec<StickBin> {
    pack_in_order(&ordered(pieces, CutOrder::Descending), stock, FitRule::BestFit)
}

pub fn total_waste(bins: &[StickBin]) -> i64 {
    bins.iter().map(StickBin::residual).sum()
}

/// Heuristic packer: several orderings for short lists, BFD alone for long ones.
pub struct GreedyPacker {
    stock: Stock,
    multi_start_threshold: usize,
}

impl GreedyPacker {
    pub fn new(stock: Stock, multi_start_threshold: usize) -> Self {
        Self {
            stock,
            multi_start_threshold,
        }
    }

    /// Callers must have rejected pieces longer than the stock.
    pub fn pack(&self, pieces: &[Piece]) -> Vec<StickBin> {
        if pieces.len() > self.multi_start_threshold {
            return best_fit_decreasing(pieces, self.stock);
        }

        let candidates = [
            (CutOrder::Descending, FitRule::FirstFit),
            (CutOrder::Descending, FitRule::BestFit),
            (CutOrder::Ascending, FitRule::FirstFit),
            (CutOrder::AlternatingLargeSmall, FitRule::FirstFit),
        ];

        let mut best: Option<Vec<StickBin>> = None;
        for (order, rule) in candidates {
            let bins = pack_in_order(&ordered(pieces, order), self.stock, rule);
            let better = match &best {
                None => true,
                Some(b) => (bins.len(), total_waste(&bins)) < (b.len(), total_waste(b)),
            };
            if better {
                tracing::trace!(?order, ?rule, sticks = bins.len(), "greedy candidate improved");
                best = Some(bins);
            }
        }
        best.unwrap_or_default()
    }
}
