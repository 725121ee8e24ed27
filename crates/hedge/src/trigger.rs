//! The trigger contract and built-in triggers.

use std::time::Duration;

use crate::tracker::LatencySnapshot;

/// Snapshot of a retry group handed to a trigger on each evaluation.
#[derive(Debug, Clone)]
pub struct HedgeState {
    /// Time since the call started.
    pub call_elapsed: Duration,
    /// Time since the current retry group's primary attempt launched.
    pub attempt_elapsed: Duration,
    /// Attempts launched in this group so far, counting the primary.
    pub attempts_launched: usize,
    /// Policy cap on hedges for this group.
    pub max_hedges: usize,
    /// Per-key latency snapshot, when a tracker store is wired.
    pub latency: Option<LatencySnapshot>,
}

/// Decides when a retry group should spawn an additional parallel attempt.
///
/// Returns `(should_spawn, next_check_in)`. A zero `next_check_in` lets the
/// engine pick its floor interval; the engine never polls tighter than that
/// floor regardless of what the trigger asks for.
pub trait Trigger: Send + Sync {
    /// Evaluate the group state.
    fn should_spawn_hedge(&self, state: &HedgeState) -> (bool, Duration);
}

/// Spawns a single hedge once the primary has been in flight for a fixed
/// delay. The engine's fallback when a named trigger is missing.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelayTrigger {
    /// How long the primary may run before the hedge launches.
    pub delay: Duration,
}

impl FixedDelayTrigger {
    /// Create a trigger with the given delay.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Trigger for FixedDelayTrigger {
    fn should_spawn_hedge(&self, state: &HedgeState) -> (bool, Duration) {
        if state.attempt_elapsed < self.delay {
            return (false, self.delay - state.attempt_elapsed);
        }
        // A fixed delay describes the first hedge only; once anything beyond
        // the primary is in flight this trigger stays quiet.
        if state.attempts_launched > 1 {
            return (false, Duration::ZERO);
        }
        (true, Duration::ZERO)
    }
}

/// Which percentile of the latency distribution a trigger keys off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Percentile {
    /// Median.
    P50,
    /// 90th percentile.
    P90,
    /// 95th percentile.
    P95,
    /// 99th percentile.
    P99,
}

/// Spawns hedges once the attempt has outlived a latency percentile for its
/// key.
///
/// Refuses to act until `min_samples` observations exist, falling back to
/// [`FixedDelayTrigger`] behavior with `fallback_delay` instead of hedging
/// off a noisy distribution.
#[derive(Debug, Clone, Copy)]
pub struct PercentileTrigger {
    /// Percentile that marks an attempt as slow.
    pub percentile: Percentile,
    /// Minimum samples before the distribution is trusted.
    pub min_samples: usize,
    /// Fixed delay used below `min_samples`.
    pub fallback_delay: Duration,
}

impl PercentileTrigger {
    /// Create a trigger on the given percentile with a sample floor and
    /// fallback delay.
    pub fn new(percentile: Percentile, min_samples: usize, fallback_delay: Duration) -> Self {
        Self {
            percentile,
            min_samples,
            fallback_delay,
        }
    }

    fn threshold(&self, snapshot: &LatencySnapshot) -> Duration {
        match self.percentile {
            Percentile::P50 => snapshot.p50,
            Percentile::P90 => snapshot.p90,
            Percentile::P95 => snapshot.p95,
            Percentile::P99 => snapshot.p99,
        }
    }
}

impl Trigger for PercentileTrigger {
    fn should_spawn_hedge(&self, state: &HedgeState) -> (bool, Duration) {
        let trusted = state
            .latency
            .as_ref()
            .filter(|snap| snap.sample_count >= self.min_samples);

        let Some(snapshot) = trusted else {
            return FixedDelayTrigger::new(self.fallback_delay).should_spawn_hedge(state);
        };

        let threshold = self.threshold(snapshot);
        if state.attempt_elapsed < threshold {
            return (false, threshold - state.attempt_elapsed);
        }
        // Past the percentile: keep saying yes, the engine caps at
        // max_hedges.
        (true, Duration::ZERO)
    }
}
