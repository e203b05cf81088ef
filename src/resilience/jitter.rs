//! Jittered renewal intervals.

use std::time::Duration;

use rand::Rng;

/// Renewal period for a lease of `expiration`.
///
/// One third of the lease plus a random offset of up to a tenth of it, so a
/// holder gets at least two renewal attempts before the lease lapses.
pub fn renewal_interval(expiration: Duration) -> Duration {
    let base = expiration / 3;
    let jitter_range = expiration / 10;

    let jitter_nanos = u64::try_from(jitter_range.as_nanos()).unwrap_or(u64::MAX);
    let jitter = if jitter_nanos > 0 {
        Duration::from_nanos(rand::thread_rng().gen_range(0..jitter_nanos))
    } else {
        Duration::ZERO
    };

    (base + jitter).max(Duration::from_millis(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renewal_interval_bounds() {
        let expiration = Duration::from_secs(30);
        for _ in 0..100 {
            let interval = renewal_interval(expiration);
            assert!(interval >= Duration::from_secs(10));
            assert!(interval < Duration::from_secs(13));
        }
    }

    #[test]
    fn test_tiny_expiration_never_zero() {
        assert!(renewal_interval(Duration::from_nanos(2)) >= Duration::from_millis(1));
        assert!(renewal_interval(Duration::ZERO) >= Duration::from_millis(1));
    }
}
