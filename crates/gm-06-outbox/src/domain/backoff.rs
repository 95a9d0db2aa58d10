//! Retry back-off computation.

use super::config::OutboxConfig;

/// Delay before the next attempt: `min(max, base * 2^attempt)` with the
/// configured jitter applied.
///
/// `jitter_unit` must lie in `[-1, 1]`; the caller draws it from its RNG so
/// this stays a pure, testable function.
pub fn backoff_ms(config: &OutboxConfig, attempt: u32, jitter_unit: f64) -> u64 {
    let exp = attempt.min(32);
    let raw = config
        .base_backoff_ms
        .saturating_mul(1u64.checked_shl(exp).unwrap_or(u64::MAX));
    let capped = raw.min(config.max_backoff_ms) as f64;

    let jitter_span = capped * f64::from(config.jitter_pct) / 100.0;
    let jittered = capped + jitter_unit.clamp(-1.0, 1.0) * jitter_span;
    jittered.max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OutboxConfig {
        OutboxConfig {
            max_attempts: 10,
            base_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            jitter_pct: 20,
            poll_interval_ms: 500,
            purge_acked_after_ms: 1,
        }
    }

    #[test]
    fn test_doubles_per_attempt() {
        let c = config();
        assert_eq!(backoff_ms(&c, 0, 0.0), 1_000);
        assert_eq!(backoff_ms(&c, 1, 0.0), 2_000);
        assert_eq!(backoff_ms(&c, 2, 0.0), 4_000);
    }

    #[test]
    fn test_caps_at_max() {
        let c = config();
        assert_eq!(backoff_ms(&c, 10, 0.0), 60_000);
        assert_eq!(backoff_ms(&c, 63, 0.0), 60_000); // shift overflow guarded
    }

    #[test]
    fn test_jitter_bounds() {
        let c = config();
        assert_eq!(backoff_ms(&c, 0, 1.0), 1_200); // +20%
        assert_eq!(backoff_ms(&c, 0, -1.0), 800); // -20%
        // Out-of-range jitter is clamped, not amplified.
        assert_eq!(backoff_ms(&c, 0, 5.0), 1_200);
    }

    #[test]
    fn test_zero_jitter_config() {
        let c = OutboxConfig {
            jitter_pct: 0,
            ..config()
        };
        assert_eq!(backoff_ms(&c, 0, 1.0), 1_000);
    }
}
