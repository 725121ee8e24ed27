//! Backoff computation.

use std::time::Duration;

use rand::Rng;
use recourse_policy::{JitterKind, RetryPolicy};

/// `backoff_i = min(initial * multiplier^i, max_backoff)` where `i` is the
/// retry index of the next sleep.
pub(crate) fn base_backoff(retry_index: u32, retry: &RetryPolicy) -> Duration {
    let initial = retry.initial_backoff.as_nanos() as f64;
    let multiplier = retry.backoff_multiplier.max(1.0);
    let raw = initial * multiplier.powi(retry_index as i32);
    let capped = raw.min(retry.max_backoff.as_nanos() as f64);
    Duration::from_nanos(capped.round() as u64)
}

/// The sleep base for the next group: the exponential backoff, raised to the
/// largest retryable override from the finished group, capped at
/// `max_backoff`.
pub(crate) fn sleep_base(
    retry_index: u32,
    retry: &RetryPolicy,
    max_override: Option<Duration>,
) -> Duration {
    let mut base = base_backoff(retry_index, retry);
    if let Some(over) = max_override {
        base = base.max(over);
    }
    base.min(retry.max_backoff)
}

/// Apply the policy's jitter to a computed sleep.
pub(crate) fn apply_jitter(base: Duration, jitter: JitterKind) -> Duration {
    if base.is_zero() {
        return base;
    }
    let nanos = base.as_nanos() as u64;
    match jitter {
        JitterKind::None => base,
        JitterKind::Full => Duration::from_nanos(rand::thread_rng().gen_range(0..=nanos)),
        JitterKind::Equal => {
            let half = nanos / 2;
            Duration::from_nanos(half + rand::thread_rng().gen_range(0..=nanos - half))
        }
    }
}
