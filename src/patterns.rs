use crate::error::{OptimizeError, Result};
use crate::types::{Stock, to_inches};

/// Lengths in fixed-point units, ascending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pattern {
    pub lengths: Vec<i64>,
}

impl Pattern {
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn used(&self, stock: Stock) -> i64 {
        stock.used_by(self.lengths.iter().sum(), self.lengths.len())
    }

    pub fn count_of(&self, units: i64) -> usize {
        self.lengths.iter().filter(|&&l| l == units).count()
    }

    pub fn inches(&self) -> Vec<f64> {
        self.lengths.iter().map(|&l| to_inches(l)).collect()
    }
}

/// Enumerates multisets of lengths that fit one stick, kerf charged between
/// adjacent pieces. Only the distinct lengths matter, not their quantities.
pub struct PatternGenerator {
    stock: Stock,
    limit: usize,
}

impl PatternGenerator {
    pub fn new(stock: Stock, limit: usize) -> Self {
        Self { stock, limit }
    }

    /// Every feasible pattern over `lengths`, canonical and deduplicated.
    ///
    /// Lengths longer than the stock simply never appear, so an empty result
    /// means nothing fits. Fails once more than `limit` patterns exist.
    pub fn generate(&self, lengths: &[i64]) -> Result<Vec<Pattern>> {
        let mut distinct: Vec<i64> = lengths.iter().copied().filter(|&l| l > 0).collect();
        distinct.sort_unstable_by(|a, b| b.cmp(a));
        distinct.dedup();

        let mut out = Vec::new();
        let mut current = Vec::new();
        self.extend(&distinct, 0, self.stock.length, &mut current, &mut out)?;

        for p in &mut out {
            p.lengths.sort_unstable();
        }
        out.sort();
        out.dedup();
        tracing::debug!(
            distinct = distinct.len(),
            patterns = out.len(),
            "generated cutting patterns"
        );
        Ok(out)
    }

    /// Patterns to which not even the shortest distinct length can be added.
    pub fn maximal(&self, lengths: &[i64]) -> Result<Vec<Pattern>> {
        let Some(&shortest) = lengths.iter().filter(|&&l| l > 0).min() else {
            return Ok(Vec::new());
        };
        let patterns = self.generate(lengths)?;
        Ok(patterns
            .into_iter()
            .filter(|p| p.used(self.stock) + self.stock.kerf + shortest > self.stock.length)
            .collect())
    }

    // Depth is bounded by the largest pattern size, stock / shortest length.
    fn extend(
        &self,
        distinct: &[i64],
        start: usize,
        remaining: i64,
        current: &mut Vec<i64>,
        out: &mut Vec<Pattern>,
    ) -> Result<()> {
        if !current.is_empty() {
            if out.len() >= self.limit {
                return Err(OptimizeError::PatternLimit { limit: self.limit });
            }
            out.push(Pattern {
                lengths: current.clone(),
            });
        }

        for (i, &len) in distinct.iter().enumerate().skip(start) {
            let cost = if current.is_empty() {
                len
            } else {
                len + self.stock.kerf
            };
            if cost <= remaining {
                current.push(len);
                self.extend(distinct, i, remaining - cost, current, out)?;
                current.pop();
            }
        }
        Ok(())
    }
}
