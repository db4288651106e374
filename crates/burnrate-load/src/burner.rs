//! CPU burner.

use std::hint::black_box;
use std::time::{Duration, Instant};

use tracing::trace;

use burnrate_core::config::{ComputeConfig, MAX_BURN_MS};

/// Outcome of one burn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurnReport {
    pub requested: Duration,
    pub elapsed: Duration,
    pub iterations: u64,
    /// Final accumulator value. Carries no meaning; it is returned so the
    /// loop body has an observable result.
    pub checksum: f64,
}

/// Resolve the caller-supplied `ms` parameter to a burn duration.
///
/// Never fails: missing, unparsable and non-positive input falls back to
/// the default, oversized input clamps to the maximum. Limits that were
/// never validated are still held under [`MAX_BURN_MS`].
pub fn effective_ms(raw: Option<&str>, limits: &ComputeConfig) -> u64 {
    let max_ms = limits.max_ms.min(MAX_BURN_MS);
    let min_ms = limits.min_ms.min(max_ms);
    let default = limits.default_ms.clamp(min_ms, max_ms);
    match raw.and_then(|s| s.trim().parse::<i64>().ok()) {
        Some(ms) if ms >= 1 => (ms as u64).clamp(min_ms, max_ms),
        _ => default,
    }
}

/// Spin on one core for `ms` milliseconds, at most [`MAX_BURN_MS`].
pub fn burn(ms: u64) -> BurnReport {
    let ms = ms.min(MAX_BURN_MS);
    let requested = Duration::from_millis(ms);
    let start = Instant::now();
    let deadline = start + requested;

    let mut x: f64 = 0.0001;
    let mut iterations: u64 = 0;
    while Instant::now() < deadline {
        x = black_box(x.sin() * x.cos() * (x + 1e-6).tan());
        iterations += 1;
    }

    let report = BurnReport {
        requested,
        elapsed: start.elapsed(),
        iterations,
        checksum: x,
    };
    trace!(
        requested_ms = ms,
        elapsed_ms = report.elapsed.as_millis() as u64,
        iterations,
        checksum = report.checksum,
        "burn finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ComputeConfig {
        ComputeConfig::default()
    }

    #[test]
    fn missing_ms_uses_default() {
        assert_eq!(effective_ms(None, &limits()), 2000);
    }

    #[test]
    fn in_range_values_pass_through() {
        assert_eq!(effective_ms(Some("1"), &limits()), 1);
        assert_eq!(effective_ms(Some("500"), &limits()), 500);
        assert_eq!(effective_ms(Some("10000"), &limits()), 10_000);
    }

    #[test]
    fn oversized_values_clamp_to_max() {
        assert_eq!(effective_ms(Some("10001"), &limits()), 10_000);
        assert_eq!(effective_ms(Some("999999"), &limits()), 10_000);
        assert_eq!(effective_ms(Some("9223372036854775807"), &limits()), 10_000);
    }

    #[test]
    fn non_positive_values_use_default() {
        assert_eq!(effective_ms(Some("0"), &limits()), 2000);
        assert_eq!(effective_ms(Some("-250"), &limits()), 2000);
    }

    #[test]
    fn garbage_uses_default() {
        assert_eq!(effective_ms(Some(""), &limits()), 2000);
        assert_eq!(effective_ms(Some("fast"), &limits()), 2000);
        assert_eq!(effective_ms(Some("12.5"), &limits()), 2000);
        assert_eq!(effective_ms(Some("99999999999999999999999"), &limits()), 2000);
    }

    #[test]
    fn default_is_clamped_into_bounds() {
        let narrow = ComputeConfig {
            default_ms: 2000,
            min_ms: 10,
            max_ms: 100,
        };
        assert_eq!(effective_ms(None, &narrow), 100);
        assert_eq!(effective_ms(Some("5"), &narrow), 10);
    }

    #[test]
    fn burn_runs_at_least_the_requested_time() {
        let report = burn(30);
        assert_eq!(report.requested, Duration::from_millis(30));
        assert!(report.elapsed >= Duration::from_millis(30));
        assert!(report.elapsed < Duration::from_secs(5));
        assert!(report.iterations > 0);
    }

    #[test]
    fn oversized_limits_stay_within_burn_ceiling() {
        let wide = ComputeConfig {
            default_ms: 2000,
            min_ms: 1,
            max_ms: u64::MAX,
        };
        assert_eq!(effective_ms(Some("9223372036854775807"), &wide), MAX_BURN_MS);
        assert_eq!(effective_ms(Some("86400001"), &wide), MAX_BURN_MS);
        assert_eq!(effective_ms(None, &wide), 2000);

        let inverted = ComputeConfig {
            default_ms: u64::MAX,
            min_ms: u64::MAX,
            max_ms: u64::MAX,
        };
        assert_eq!(effective_ms(None, &inverted), MAX_BURN_MS);
    }

    #[test]
    fn burn_of_one_millisecond_returns_promptly() {
        let report = burn(1);
        assert!(report.elapsed >= Duration::from_millis(1));
        assert!(report.elapsed < Duration::from_secs(1));
    }
}
