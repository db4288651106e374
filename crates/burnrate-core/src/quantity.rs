//! Kubernetes CPU quantity parsing.

use crate::error::{SourceError, SourceResult};

/// Parse a CPU quantity string into millicores.
///
/// Accepts the suffixes the metrics API and kubelet emit: `n` (nanocores),
/// `u` (microcores), `m` (millicores), or no suffix (whole cores).
///
/// ```
/// use burnrate_core::parse_cpu_millicores;
///
/// assert_eq!(parse_cpu_millicores("250m").unwrap(), 250.0);
/// assert_eq!(parse_cpu_millicores("2").unwrap(), 2000.0);
/// ```
pub fn parse_cpu_millicores(s: &str) -> SourceResult<f64> {
    let s = s.trim();
    let (number, scale) = if let Some(n) = s.strip_suffix('n') {
        (n, 1e-6)
    } else if let Some(u) = s.strip_suffix('u') {
        (u, 1e-3)
    } else if let Some(m) = s.strip_suffix('m') {
        (m, 1.0)
    } else {
        (s, 1000.0)
    };

    let value: f64 = number
        .parse()
        .map_err(|_| SourceError::Parse(format!("invalid cpu quantity {s:?}")))?;

    if !value.is_finite() || value < 0.0 {
        return Err(SourceError::Parse(format!("invalid cpu quantity {s:?}")));
    }

    Ok(value * scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millicores() {
        assert_eq!(parse_cpu_millicores("123m").unwrap(), 123.0);
    }

    #[test]
    fn whole_and_fractional_cores() {
        assert_eq!(parse_cpu_millicores("2").unwrap(), 2000.0);
        assert_eq!(parse_cpu_millicores("0.5").unwrap(), 500.0);
    }

    #[test]
    fn nanocores_and_microcores() {
        assert!((parse_cpu_millicores("1500000n").unwrap() - 1.5).abs() < 1e-9);
        assert!((parse_cpu_millicores("500u").unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(parse_cpu_millicores(" 250m ").unwrap(), 250.0);
    }

    #[test]
    fn malformed_quantities_are_rejected() {
        for bad in ["", "m", "abc", "12x", "-5m", "NaN"] {
            assert!(parse_cpu_millicores(bad).is_err(), "{bad:?} should fail");
        }
    }
}
