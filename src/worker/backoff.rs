//! Retry backoff (spec §4.C step 7): exponential with jitter, factored out
//! of the worker loop as a free function so it is directly testable against
//! an injected RNG.

use rand::Rng;

/// `min(cap, base * 2^(attempt-1)) * uniform(0.8, 1.2)`. `attempt` is the
/// attempt number that just failed (1-indexed); the jitter keeps concurrent
/// retries of the same episode from thundering back in lockstep.
pub fn backoff(
    attempt: i32,
    base: chrono::Duration,
    cap: chrono::Duration,
    rng: &mut impl Rng,
) -> chrono::Duration {
    let exponent = (attempt - 1).max(0) as u32;
    let doubled = base
        .checked_mul(1i32.checked_shl(exponent).unwrap_or(i32::MAX))
        .unwrap_or(cap);
    let unjittered = doubled.min(cap);

    let jitter = rng.gen_range(0.8..=1.2);
    let millis = (unjittered.num_milliseconds() as f64 * jitter).round() as i64;
    chrono::Duration::milliseconds(millis.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn backoff_never_exceeds_cap() {
        let base = chrono::Duration::seconds(30);
        let cap = chrono::Duration::minutes(30);
        let mut rng = StepRng::new(u64::MAX / 2, 0);
        for attempt in 1..20 {
            let delay = backoff(attempt, base, cap, &mut rng);
            assert!(delay <= cap + chrono::Duration::seconds(1));
        }
    }

    #[test]
    fn backoff_grows_with_attempt_before_capping() {
        let base = chrono::Duration::seconds(30);
        let cap = chrono::Duration::minutes(30);
        let mut rng = StepRng::new(u64::MAX / 2, 0);
        let first = backoff(1, base, cap, &mut rng);
        let second = backoff(2, base, cap, &mut rng);
        assert!(second > first);
    }
}
