//! C-locale numeric formatting/parsing for CGATS and ICC text fields.
//!
//! Rust's `f64` formatting is already locale-independent (unlike C's
//! `printf`, which honors `LC_NUMERIC` and can emit `,` for the decimal
//! point), so the "use `.` regardless of host locale" requirement in
//! The format is satisfied structurally by Rust's own float formatting;
//! what's left to replicate is the
//! shape of C's `"%g"`: shortest-of-fixed-or-scientific with a fixed
//! significant-digit budget and no trailing zeros.

/// Formats `v` the way `printf("%g", v)` would, with `C` locale (decimal
/// point always `.`).
#[must_use]
pub fn format_g(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if !v.is_finite() {
        return if v.is_nan() { "nan".to_string() } else if v > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    const PRECISION: i32 = 6;
    let exponent = v.abs().log10().floor() as i32;
    if exponent < -4 || exponent >= PRECISION {
        let decimals = (PRECISION - 1).max(0) as usize;
        let s = format!("{v:.decimals$e}");
        trim_scientific(&s)
    } else {
        let decimals = (PRECISION - 1 - exponent).max(0) as usize;
        let s = format!("{v:.decimals$}");
        trim_fixed(&s)
    }
}

fn trim_fixed(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('0');
    let trimmed = trimmed.trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn trim_scientific(s: &str) -> String {
    let (mantissa, exp) = s.split_once('e').unwrap_or((s, "0"));
    let mantissa = trim_fixed(mantissa);
    let exp_num: i32 = exp.parse().unwrap_or(0);
    format!("{mantissa}e{}{:02}", if exp_num < 0 { "-" } else { "+" }, exp_num.abs())
}

/// Parses a numeric field. Rust's parser is already locale-independent.
pub fn parse_g(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_c_g() {
        assert_eq!(format_g(1.234), "1.234");
        assert_eq!(format_g(0.0), "0");
        assert_eq!(format_g(1.0), "1");
        assert_eq!(format_g(145.46), "145.46");
        assert_eq!(format_g(-0.5), "-0.5");
    }

    #[test]
    fn parses_back() {
        assert_eq!(parse_g("1.234"), Some(1.234));
        assert_eq!(parse_g("  2.0 "), Some(2.0));
    }
}
