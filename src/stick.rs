use crate::types::{Piece, Stock};

/// An open stick during packing. Lengths are fixed-point units.
#[derive(Debug, Clone)]
pub struct StickBin {
    stock: Stock,
    used: i64,
    pub pieces: Vec<Piece>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitRule {
    /// First stick, in creation order, with room.
    FirstFit,
    /// Stick left with the least residual; lowest index on ties.
    BestFit,
}

impl StickBin {
    pub fn new(stock: Stock) -> Self {
        Self {
            stock,
            used: 0,
            pieces: Vec::new(),
        }
    }

    pub fn used(&self) -> i64 {
        self.used
    }

    pub fn residual(&self) -> i64 {
        self.stock.length - self.used
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Length the piece would consume here, including the kerf separating it
    /// from the previous piece.
    pub fn cost(&self, piece: Piece) -> i64 {
        if self.pieces.is_empty() {
            piece.units
        } else {
            piece.units + self.stock.kerf
        }
    }

    pub fn residual_after(&self, piece: Piece) -> Option<i64> {
        let left = self.residual() - self.cost(piece);
        (left >= 0).then_some(left)
    }

    pub fn fits(&self, piece: Piece) -> bool {
        self.residual_after(piece).is_some()
    }

    pub fn place(&mut self, piece: Piece) {
        debug_assert!(self.fits(piece), "piece does not fit");
        self.used += self.cost(piece);
        self.pieces.push(piece);
    }

    /// Undo the most recent `place`.
    pub fn pop(&mut self) -> Option<Piece> {
        let piece = self.pieces.pop()?;
        self.used -= self.cost(piece);
        Some(piece)
    }
}

pub fn find_bin(bins: &[StickBin], piece: Piece, rule: FitRule) -> Option<usize> {
    match rule {
        FitRule::FirstFit => bins.iter().position(|b| b.fits(piece)),
        FitRule::BestFit => {
            let mut best: Option<(usize, i64)> = None;
            for (bi, bin) in bins.iter().enumerate() {
                if let Some(left) = bin.residual_after(piece)
                    && best.is_none_or(|(_, b)| left < b)
                {
                    best = Some((bi, left));
                }
            }
            best.map(|(bi, _)| bi)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::to_units;

    fn piece(id: u32, inches: f64) -> Piece {
        Piece::new(id, inches)
    }

    #[test]
    fn test_place_single_piece() {
        let mut bin = StickBin::new(Stock::new(100.0, 0.125));
        bin.place(piece(1, 40.0));
        assert_eq!(bin.used(), to_units(40.0));
        assert_eq!(bin.residual(), to_units(60.0));
    }

    #[test]
    fn test_kerf_charged_from_second_piece() {
        let mut bin = StickBin::new(Stock::new(100.0, 0.5));
        bin.place(piece(1, 50.0));
        assert_eq!(bin.cost(piece(2, 49.5)), to_units(50.0));
        assert!(bin.fits(piece(2, 49.5)));
        assert!(!bin.fits(piece(2, 49.75)));
    }

    #[test]
    fn test_fill_exact() {
        let mut bin = StickBin::new(Stock::new(100.0, 0.0));
        bin.place(piece(1, 100.0));
        assert_eq!(bin.residual(), 0);
        assert!(!bin.fits(piece(2, 0.5)));
    }

    #[test]
    fn test_pop_restores_used() {
        let mut bin = StickBin::new(Stock::new(100.0, 0.25));
        bin.place(piece(1, 30.0));
        bin.place(piece(2, 20.0));
        assert_eq!(bin.pop(), Some(piece(2, 20.0)));
        assert_eq!(bin.used(), to_units(30.0));
        assert_eq!(bin.pop(), Some(piece(1, 30.0)));
        assert_eq!(bin.used(), 0);
        assert_eq!(bin.pop(), None);
    }

    #[test]
    fn test_first_fit_vs_best_fit() {
        let stock = Stock::new(100.0, 0.0);
        let mut a = StickBin::new(stock);
        a.place(piece(1, 50.0));
        let mut b = StickBin::new(stock);
        b.place(piece(2, 70.0));
        let bins = vec![a, b];

        let p = piece(3, 25.0);
        assert_eq!(find_bin(&bins, p, FitRule::FirstFit), Some(0));
        assert_eq!(find_bin(&bins, p, FitRule::BestFit), Some(1));
        assert_eq!(find_bin(&bins, piece(4, 60.0), FitRule::BestFit), None);
    }

    #[test]
    fn test_best_fit_tie_takes_lowest_index() {
        let stock = Stock::new(100.0, 0.0);
        let mut a = StickBin::new(stock);
        a.place(piece(1, 60.0));
        let b = a.clone();
        assert_eq!(find_bin(&[a, b], piece(2, 10.0), FitRule::BestFit), Some(0));
    }
}
