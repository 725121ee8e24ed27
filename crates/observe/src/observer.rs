//! The observer contract and the shipped implementations.

use recourse_policy::{EffectivePolicy, PolicyKey};
use tracing::{debug, info, warn};

use crate::types::{AttemptRecord, BudgetDecisionEvent, Timeline};

/// Receives lifecycle callbacks for calls and attempts.
///
/// For any call, `on_start` precedes every `on_attempt`, which precede
/// exactly one of `on_success`/`on_failure`. Callbacks for different
/// attempts may run concurrently; implementations must be thread-safe and
/// cheap — they execute inline on the attempt path.
pub trait Observer: Send + Sync {
    /// A call is starting under the given resolved policy.
    fn on_start(&self, _key: &PolicyKey, _policy: &EffectivePolicy) {}

    /// An attempt finished (or was denied by its budget).
    fn on_attempt(&self, _key: &PolicyKey, _record: &AttemptRecord) {}

    /// A hedge attempt is launching.
    fn on_hedge_spawn(&self, _key: &PolicyKey, _record: &AttemptRecord) {}

    /// An in-flight attempt was canceled by the engine.
    fn on_hedge_cancel(&self, _key: &PolicyKey, _record: &AttemptRecord, _reason: &str) {}

    /// A budget gating decision was made.
    fn on_budget_decision(&self, _event: &BudgetDecisionEvent) {}

    /// The call succeeded; the timeline is final.
    fn on_success(&self, _timeline: &Timeline) {}

    /// The call failed; the timeline is final.
    fn on_failure(&self, _timeline: &Timeline) {}

    /// True when every callback is a no-op. Lets the engine skip record
    /// allocation entirely.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Observer that does nothing and says so.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn is_noop(&self) -> bool {
        true
    }
}

/// Forwards every callback to `tracing` as structured events.
///
/// Attempt-level noise goes to `debug`, call outcomes to `info`/`warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_start(&self, key: &PolicyKey, policy: &EffectivePolicy) {
        debug!(
            key = %key,
            policy_id = %policy.id,
            max_attempts = policy.retry.max_attempts,
            hedging = policy.hedge.enabled,
            "call starting"
        );
    }

    fn on_attempt(&self, key: &PolicyKey, record: &AttemptRecord) {
        debug!(
            key = %key,
            attempt = record.attempt,
            retry_index = record.retry_index,
            is_hedge = record.is_hedge,
            outcome = ?record.outcome.kind,
            reason = %record.outcome.reason,
            "attempt finished"
        );
    }

    fn on_hedge_spawn(&self, key: &PolicyKey, record: &AttemptRecord) {
        debug!(
            key = %key,
            attempt = record.attempt,
            hedge_index = record.hedge_index,
            "hedge spawned"
        );
    }

    fn on_hedge_cancel(&self, key: &PolicyKey, record: &AttemptRecord, reason: &str) {
        debug!(
            key = %key,
            attempt = record.attempt,
            reason = reason,
            "attempt canceled"
        );
    }

    fn on_budget_decision(&self, event: &BudgetDecisionEvent) {
        debug!(
            key = %event.key,
            attempt = event.attempt,
            kind = event.kind.as_str(),
            budget = %event.budget_name,
            mode = event.mode.as_str(),
            allowed = event.allowed,
            reason = %event.reason,
            "budget decision"
        );
    }

    fn on_success(&self, timeline: &Timeline) {
        info!(
            key = %timeline.key,
            attempts = timeline.attempts.len(),
            "call succeeded"
        );
    }

    fn on_failure(&self, timeline: &Timeline) {
        let error = timeline
            .final_error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();
        warn!(
            key = %timeline.key,
            attempts = timeline.attempts.len(),
            error = %error,
            "call failed"
        );
    }
}
