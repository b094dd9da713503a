/// Parses `1/2`, ` 3 / 16 `, `0.125` or `7`.
pub fn parse_fraction(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let value = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = parse_unsigned(num.trim())?;
            let den: f64 = parse_unsigned(den.trim())?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.parse::<f64>().ok()?,
    };
    value.is_finite().then_some(value)
}

fn parse_unsigned(s: &str) -> Option<f64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    s.parse().ok()
}

/// Parses a length into inches.
///
/// Accepted forms: `288`, `110.125`, `24'`, `20' 6"`, `7'6 1/2"`,
/// `7' 6" 1/2`, `180 1/2`, `1/2"`.
pub fn parse_length(s: &str) -> Option<f64> {
    let mut rest = s.trim();
    if rest.is_empty() {
        return None;
    }

    let mut inches = 0.0;
    if let Some((feet, after)) = rest.split_once('\'') {
        inches += parse_fraction(feet)? * 12.0;
        rest = after.trim();
        if rest.is_empty() {
            return Some(inches);
        }
    }

    if let Some(stripped) = rest.strip_suffix('"') {
        rest = stripped.trim_end();
    }

    if let Some((whole, frac)) = rest.split_once('"') {
        // 6" 1/2
        inches += parse_fraction(whole)?;
        let frac = frac.trim();
        if !frac.is_empty() {
            inches += parse_fraction(frac)?;
        }
        return Some(inches);
    }

    let parts: Vec<&str> = rest.split_whitespace().collect();
    match parts.as_slice() {
        [single] => inches += parse_fraction(single)?,
        [whole, frac] if frac.contains('/') => {
            inches += parse_fraction(whole)? + parse_fraction(frac)?;
        }
        _ => return None,
    }
    Some(inches)
}
