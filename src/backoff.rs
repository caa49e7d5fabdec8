use std::time::Duration;

// Beyond this exponent any multiplier > 1 has long since passed any sane cap.
const MAX_EXPONENT: u32 = 64;

/// Computes the delay before a retry.
///
/// `attempt_index` counts prior failed attempts starting at zero, so the
/// first retry passes `0` and waits `initial`. The result is
/// `min(max, initial * multiplier^attempt_index)` without jitter.
///
/// Multipliers below `1.0` (or not finite) are treated as `1.0`, keeping the
/// delay flat instead of shrinking it.
pub fn backoff_delay(
    attempt_index: u32,
    multiplier: f64,
    initial: Duration,
    max: Duration,
) -> Duration {
    if initial >= max {
        return max;
    }

    let factor = if multiplier.is_finite() && multiplier > 1.0 {
        multiplier
    } else {
        1.0
    };
    let exponent = attempt_index.min(MAX_EXPONENT) as i32;
    let scaled = initial.as_secs_f64() * factor.powi(exponent);

    if !scaled.is_finite() || scaled >= max.as_secs_f64() {
        return max;
    }
    Duration::try_from_secs_f64(scaled).map_or(max, |delay| delay.min(max))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::backoff_delay;

    const SECOND: Duration = Duration::from_secs(1);
    const THIRTY_SECONDS: Duration = Duration::from_secs(30);

    #[test]
    fn first_retry_waits_initial_interval() {
        assert_eq!(backoff_delay(0, 2.0, SECOND, THIRTY_SECONDS), SECOND);
    }

    #[test]
    fn grows_by_multiplier() {
        assert_eq!(
            backoff_delay(1, 2.0, SECOND, THIRTY_SECONDS),
            Duration::from_secs(2)
        );
        assert_eq!(
            backoff_delay(3, 2.0, SECOND, THIRTY_SECONDS),
            Duration::from_secs(8)
        );
    }

    #[test]
    fn fractional_multiplier_is_not_truncated() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(500);
        assert_eq!(backoff_delay(0, 1.5, initial, max), Duration::from_millis(100));
        let second = backoff_delay(1, 1.5, initial, max);
        assert!(second >= Duration::from_micros(149_999));
        assert!(second <= Duration::from_micros(150_001));
    }

    #[test]
    fn capped_at_max_interval() {
        assert_eq!(backoff_delay(10, 2.0, SECOND, THIRTY_SECONDS), THIRTY_SECONDS);
    }

    #[test]
    fn huge_attempt_index_does_not_overflow() {
        assert_eq!(
            backoff_delay(u32::MAX, 10.0, SECOND, THIRTY_SECONDS),
            THIRTY_SECONDS
        );
        assert_eq!(
            backoff_delay(u32::MAX, f64::MAX, SECOND, Duration::MAX),
            Duration::MAX
        );
    }

    #[test]
    fn multiplier_at_or_below_one_stays_flat() {
        for attempt in 0..10 {
            assert_eq!(backoff_delay(attempt, 1.0, SECOND, THIRTY_SECONDS), SECOND);
            assert_eq!(backoff_delay(attempt, 0.5, SECOND, THIRTY_SECONDS), SECOND);
            assert_eq!(
                backoff_delay(attempt, f64::NAN, SECOND, THIRTY_SECONDS),
                SECOND
            );
        }
    }

    #[test]
    fn initial_above_max_returns_max() {
        assert_eq!(
            backoff_delay(0, 2.0, Duration::from_secs(60), THIRTY_SECONDS),
            THIRTY_SECONDS
        );
    }

    #[test]
    fn monotonic_and_bounded() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_secs(5);
        for multiplier in [1.1, 1.5, 2.0, 3.0] {
            let mut previous = Duration::ZERO;
            for attempt in 0..200 {
                let delay = backoff_delay(attempt, multiplier, initial, max);
                assert!(delay >= previous, "delay shrank at attempt {attempt}");
                assert!(delay <= max, "delay exceeded max at attempt {attempt}");
                previous = delay;
            }
        }
    }
}
