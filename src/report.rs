use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::{Cut, Method, Solution, SolutionStatus, Stick, to_units};

/// Sticks sharing the same multiset of lengths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternGroup {
    /// Longest first.
    pub lengths: Vec<f64>,
    pub pretty_lengths: Vec<String>,
    pub count: usize,
    pub used_length: f64,
    pub waste_length: f64,
}

/// Most repeated pattern first; equal counts by ascending used length.
pub fn group_patterns(sticks: &[Stick]) -> Vec<PatternGroup> {
    let mut groups: BTreeMap<Vec<i64>, PatternGroup> = BTreeMap::new();
    for stick in sticks {
        let mut lengths: Vec<f64> = stick.cuts.iter().map(|c| c.length).collect();
        lengths.sort_by(|a, b| b.total_cmp(a));
        let key: Vec<i64> = lengths.iter().map(|&l| to_units(l)).collect();
        groups
            .entry(key)
            .and_modify(|g| g.count += 1)
            .or_insert_with(|| PatternGroup {
                pretty_lengths: lengths.iter().map(|&l| pretty_len(l)).collect(),
                lengths,
                count: 1,
                used_length: stick.used_length,
                waste_length: stick.waste_length,
            });
    }

    let mut patterns: Vec<PatternGroup> = groups.into_values().collect();
    patterns.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.used_length.total_cmp(&b.used_length))
    });
    patterns
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CutSummary {
    pub length: f64,
    pub pretty_length: String,
    pub quantity: usize,
}

/// Requested lengths with their quantities, longest first.
pub fn cuts_summary(cuts: &[Cut]) -> Vec<CutSummary> {
    let mut counts: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for cut in cuts {
        counts.entry(to_units(cut.length)).or_insert((cut.length, 0)).1 += 1;
    }
    counts
        .into_values()
        .rev()
        .map(|(length, quantity)| CutSummary {
            length,
            pretty_length: pretty_len(length),
            quantity,
        })
        .collect()
}

/// Serializable digest of a solution.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub stick_count: usize,
    pub total_waste: f64,
    pub total_waste_pretty: String,
    pub efficiency: f64,
    pub status: SolutionStatus,
    pub method: Method,
    pub patterns: Vec<PatternGroup>,
    pub sticks: Vec<Stick>,
}

impl PlanReport {
    pub fn new(solution: &Solution) -> Self {
        Self {
            stick_count: solution.stick_count(),
            total_waste: solution.total_waste,
            total_waste_pretty: pretty_len(solution.total_waste),
            efficiency: solution.efficiency_percent(),
            status: solution.status,
            method: solution.method,
            patterns: group_patterns(&solution.sticks),
            sticks: solution.sticks.clone(),
        }
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Formats inches as feet, inches and 1/32 fractions: `8' 4 1/2"`, `24'`, `0"`.
pub fn pretty_len(inches: f64) -> String {
    const EPS: f64 = 1.0 / 64.0;
    if !inches.is_finite() || inches.abs() < EPS {
        return "0\"".to_string();
    }

    let mut out = String::new();
    if inches < 0.0 {
        out.push('-');
    }
    let total = (inches.abs() * 32.0).round() / 32.0;

    let mut feet = (total / 12.0).floor() as i64;
    let mut rest = total - feet as f64 * 12.0;
    if rest >= 12.0 - EPS {
        feet += 1;
        rest = 0.0;
    }
    let whole = rest.floor() as i64;
    let frac = rest - whole as f64;

    let has_feet = feet > 0;
    let has_inches = whole > 0;
    let has_frac = frac > EPS;

    if has_feet {
        out.push_str(&format!("{feet}'"));
        if has_inches || has_frac {
            out.push(' ');
        }
    }
    if has_inches {
        out.push_str(&whole.to_string());
    }
    if has_frac {
        if has_inches {
            out.push(' ');
        }
        let num = (frac * 32.0).round() as i64;
        let g = gcd(num, 32);
        out.push_str(&format!("{}/{}", num / g, 32 / g));
    }
    if has_inches || has_frac || !has_feet {
        out.push('"');
    }
    out
}

/// Formats a small length such as a kerf as a fraction of 1/64: `1/8"`, `1 1/2"`.
pub fn to_fraction(inches: f64) -> String {
    let n = (inches.abs() * 64.0).round() as i64;
    if n == 0 {
        return "0\"".to_string();
    }
    let sign = if inches < 0.0 { "-" } else { "" };
    let (whole, rem) = (n / 64, n % 64);
    if rem == 0 {
        return format!("{sign}{whole}\"");
    }
    let g = gcd(rem, 64);
    if whole > 0 {
        format!("{sign}{whole} {}/{}\"", rem / g, 64 / g)
    } else {
        format!("{sign}{}/{}\"", rem / g, 64 / g)
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Text block printed after an optimization.
pub fn summary(solution: &Solution, material: Option<&str>) -> String {
    let n = solution.stick_count();
    let avg = if n > 0 {
        solution.total_waste / n as f64
    } else {
        0.0
    };

    let stock = match material {
        Some(m) => format!("Material:      {} @ {}", m, pretty_len(solution.stock_length)),
        None => format!("Stock:         {}", pretty_len(solution.stock_length)),
    };
    let mut lines = vec![
        "--- Cut Optimization Summary ---".to_string(),
        stock,
        format!("Kerf:          {}", to_fraction(solution.kerf)),
        format!("Sticks Needed: {} stick{}", n, plural(n)),
        format!("Efficiency:    {:.1}%", solution.efficiency_percent()),
        format!(
            "Total Waste:   {} (avg {} per stick)",
            pretty_len(solution.total_waste),
            pretty_len(avg)
        ),
        format!("Method:        {} ({:?})", solution.method, solution.status),
        "--------------------------------".to_string(),
        String::new(),
        "Cut Patterns (Qty | Cuts -> Waste):".to_string(),
    ];
    lines.extend(group_patterns(&solution.sticks).into_iter().map(|p| {
        format!(
            "  {:>2} × | {} -> {} waste",
            p.count,
            p.pretty_lengths.join(", "),
            pretty_len(p.waste_length)
        )
    }));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
