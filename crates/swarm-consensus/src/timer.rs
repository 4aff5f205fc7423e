use rand::Rng;
use std::time::Duration;

/// Draws an election deadline uniformly from `min..=max` (millisecond
/// resolution). An inverted range collapses to `min`.
pub fn random_timeout<R: Rng>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    let min_ms = min.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rng.gen_range(min_ms..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_timeout_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let min = Duration::from_millis(150);
        let max = Duration::from_millis(300);

        let draws: Vec<_> = (0..500).map(|_| random_timeout(&mut rng, min, max)).collect();
        assert!(draws.iter().all(|d| *d >= min && *d <= max));

        // Independent re-rolls actually spread out
        let distinct: std::collections::HashSet<_> = draws.iter().collect();
        assert!(distinct.len() > 50);
    }

    #[test]
    fn test_degenerate_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let d = Duration::from_millis(200);
        assert_eq!(random_timeout(&mut rng, d, d), d);
    }
}
