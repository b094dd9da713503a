use serde::{Deserialize, Serialize};

/// Fixed-point scale for every capacity comparison. A power of two keeps
/// binary fractions (1/16", 1/32", 1/64") exact.
pub const SCALE: i64 = 1024;

pub fn to_units(inches: f64) -> i64 {
    (inches * SCALE as f64).round() as i64
}

pub fn to_inches(units: i64) -> f64 {
    units as f64 / SCALE as f64
}

// Capacity checks round every length up to a whole unit, so a cut equal to
// the stock always fits. Binary fractions down to 1/1024" are exact.
fn units_up(inches: f64) -> i64 {
    (inches * SCALE as f64).ceil() as i64
}

/// One required piece. Ids follow order of entry, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cut {
    pub id: u32,
    pub length: f64,
}

/// A requested length with its quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    pub length: f64,
    pub qty: u32,
}

impl Demand {
    pub fn new(length: f64, qty: u32) -> Self {
        Self { length, qty }
    }
}

/// A cut together with its length in fixed-point units. `length` is the
/// caller's value and is what ends up in the output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Piece {
    pub cut_id: u32,
    pub length: f64,
    pub units: i64,
}

impl Piece {
    pub fn new(cut_id: u32, length: f64) -> Self {
        Self {
            cut_id,
            length,
            units: units_up(length),
        }
    }

    pub fn from_cut(cut: &Cut) -> Self {
        Self::new(cut.id, cut.length)
    }

    pub fn cut(&self) -> Cut {
        Cut {
            id: self.cut_id,
            length: self.length,
        }
    }
}

/// Stock length and kerf in fixed-point units, plus the exact inch values
/// used for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stock {
    pub length: i64,
    pub kerf: i64,
    pub length_inches: f64,
    pub kerf_inches: f64,
}

impl Stock {
    pub fn new(length: f64, kerf: f64) -> Self {
        Self {
            length: units_up(length),
            kerf: units_up(kerf),
            length_inches: length,
            kerf_inches: kerf,
        }
    }

    /// Length consumed by `count` pieces totalling `sum`: kerf only between pieces.
    pub fn used_by(&self, sum: i64, count: usize) -> i64 {
        if count == 0 {
            0
        } else {
            sum + self.kerf * (count as i64 - 1)
        }
    }

    pub fn used_inches(&self, pieces: &[Piece]) -> f64 {
        if pieces.is_empty() {
            return 0.0;
        }
        let sum: f64 = pieces.iter().map(|p| p.length).sum();
        sum + self.kerf_inches * (pieces.len() - 1) as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stick {
    pub cuts: Vec<Cut>,
    pub used_length: f64,
    pub waste_length: f64,
}

impl Stick {
    pub fn from_pieces(pieces: &[Piece], stock: Stock) -> Self {
        let used = stock.used_inches(pieces);
        Self {
            cuts: pieces.iter().map(Piece::cut).collect(),
            used_length: used,
            waste_length: stock.length_inches - used,
        }
    }
}

/// How much trust to put in a solution's stick count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionStatus {
    /// Proven minimum stick count.
    Optimal,
    /// Solver stopped inside the accepted relative gap.
    NearOptimal,
    /// Produced by a heuristic with no optimality claim.
    Heuristic,
    /// Search interrupted; best plan found before the interruption.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    Mip,
    Greedy,
    BranchAndBound,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Mip => write!(f, "mip"),
            Method::Greedy => write!(f, "greedy"),
            Method::BranchAndBound => write!(f, "branch-and-bound"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub sticks: Vec<Stick>,
    pub stock_length: f64,
    pub kerf: f64,
    pub total_waste: f64,
    pub status: SolutionStatus,
    pub method: Method,
}

impl Solution {
    pub fn new(
        bins: Vec<Vec<Piece>>,
        stock: Stock,
        status: SolutionStatus,
        method: Method,
    ) -> Self {
        let sticks: Vec<Stick> = bins
            .iter()
            .map(|pieces| Stick::from_pieces(pieces, stock))
            .collect();
        let total_waste = sticks.iter().map(|s| s.waste_length).sum();
        Self {
            sticks,
            stock_length: stock.length_inches,
            kerf: stock.kerf_inches,
            total_waste,
            status,
            method,
        }
    }

    pub fn stick_count(&self) -> usize {
        self.sticks.len()
    }

    pub fn cut_count(&self) -> usize {
        self.sticks.iter().map(|s| s.cuts.len()).sum()
    }

    pub fn total_stock(&self) -> f64 {
        self.stock_length * self.sticks.len() as f64
    }

    /// Share of purchased stock that ends up as waste (kerf counts as used).
    pub fn total_waste_percent(&self) -> f64 {
        let total = self.total_stock();
        if total == 0.0 {
            return 0.0;
        }
        self.total_waste / total * 100.0
    }

    pub fn efficiency_percent(&self) -> f64 {
        if self.sticks.is_empty() {
            return 0.0;
        }
        100.0 - self.total_waste_percent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_round_trip_binary_fractions() {
        assert_eq!(to_units(0.0625), 64);
        assert_eq!(to_units(0.125), 128);
        assert_eq!(to_inches(to_units(7.5 + 1.0 / 32.0)), 7.53125);
    }

    #[test]
    fn test_kerf_between_pieces_only() {
        let stock = Stock::new(100.0, 0.125);
        let pieces = [
            Piece::new(1, 30.0),
            Piece::new(2, 30.0),
            Piece::new(3, 30.0),
        ];
        let stick = Stick::from_pieces(&pieces, stock);
        assert_eq!(stick.used_length, 90.25);
        assert_eq!(stick.waste_length, 9.75);
    }

    #[test]
    fn test_single_piece_has_no_kerf() {
        let stock = Stock::new(100.0, 0.5);
        let stick = Stick::from_pieces(&[Piece::new(1, 100.0)], stock);
        assert_eq!(stick.used_length, 100.0);
        assert_eq!(stick.waste_length, 0.0);
    }

    #[test]
    fn test_solution_totals() {
        let stock = Stock::new(10.0, 0.0);
        let bins = vec![
            vec![Piece::new(1, 10.0)],
            vec![Piece::new(2, 5.0)],
        ];
        let sol = Solution::new(bins, stock, SolutionStatus::Heuristic, Method::Greedy);
        assert_eq!(sol.stick_count(), 2);
        assert_eq!(sol.cut_count(), 2);
        assert_eq!(sol.total_waste, 5.0);
        assert!((sol.total_waste_percent() - 25.0).abs() < 1e-9);
        assert!((sol.efficiency_percent() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_decimal_lengths_reported_unchanged() {
        let stock = Stock::new(100.0, 0.1);
        let pieces = [Piece::new(1, 10.3), Piece::new(2, 10.3)];
        let stick = Stick::from_pieces(&pieces, stock);
        assert_eq!(stick.cuts[0].length, 10.3);
        assert_eq!(stick.cuts[1].length, 10.3);
        assert!((stick.used_length - 20.7).abs() < 1e-9);
        assert!((stick.waste_length - 79.3).abs() < 1e-9);
    }

    #[test]
    fn test_cut_equal_to_decimal_stock_fits() {
        let stock = Stock::new(10.3, 0.0);
        assert_eq!(Piece::new(1, 10.3).units, stock.length);
    }
}
