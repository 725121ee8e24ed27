//! Builder for assembling effective policies in code.

use std::time::Duration;

use crate::schema::{default_policy_for, BudgetRef, EffectivePolicy, JitterKind};
use crate::PolicyKey;

/// Fluent builder over [`EffectivePolicy`].
///
/// Starts from the safe default policy for the key and layers overrides on
/// top. [`PolicyBuilder::build`] always normalizes; if normalization fails
/// the builder falls back to the key's default policy, so it never yields an
/// invalid policy.
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    policy: EffectivePolicy,
}

impl PolicyBuilder {
    /// Start building a policy for the given key.
    pub fn new(key: impl Into<PolicyKey>) -> Self {
        Self {
            policy: default_policy_for(key.into()),
        }
    }

    /// Set the maximum number of attempts.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.policy.retry.max_attempts = n;
        self
    }

    /// Set the initial backoff duration.
    pub fn initial_backoff(mut self, d: Duration) -> Self {
        self.policy.retry.initial_backoff = d;
        self
    }

    /// Set the maximum backoff duration.
    pub fn max_backoff(mut self, d: Duration) -> Self {
        self.policy.retry.max_backoff = d;
        self
    }

    /// Set the exponential backoff multiplier.
    pub fn backoff_multiplier(mut self, m: f64) -> Self {
        self.policy.retry.backoff_multiplier = m;
        self
    }

    /// Set initial, max, and multiplier together.
    pub fn backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.policy.retry.initial_backoff = initial;
        self.policy.retry.max_backoff = max;
        self.policy.retry.backoff_multiplier = multiplier;
        self
    }

    /// Set the jitter strategy.
    pub fn jitter(mut self, j: JitterKind) -> Self {
        self.policy.retry.jitter = j;
        self
    }

    /// Set the timeout for each individual attempt.
    pub fn per_attempt_timeout(mut self, d: Duration) -> Self {
        self.policy.retry.timeout_per_attempt = d;
        self
    }

    /// Set the total timeout across all attempts.
    pub fn overall_timeout(mut self, d: Duration) -> Self {
        self.policy.retry.overall_timeout = d;
        self
    }

    /// Set the classifier name for this policy.
    pub fn classifier(mut self, name: impl Into<String>) -> Self {
        self.policy.retry.classifier_name = name.into();
        self
    }

    /// Set the budget reference for retry attempts at cost 1.
    pub fn budget(mut self, name: impl Into<String>) -> Self {
        self.policy.retry.budget = BudgetRef::named(name);
        self
    }

    /// Set the budget reference for retry attempts with a custom cost.
    pub fn budget_with_cost(mut self, name: impl Into<String>, cost: u32) -> Self {
        self.policy.retry.budget = BudgetRef {
            name: name.into(),
            cost,
        };
        self
    }

    /// Set a policy identifier, carried into timelines for observability.
    pub fn policy_id(mut self, id: impl Into<String>) -> Self {
        self.policy.id = id.into();
        self
    }

    /// Enable hedging with default settings.
    pub fn enable_hedging(mut self) -> Self {
        self.policy.hedge.enabled = true;
        if self.policy.hedge.max_hedges == 0 {
            self.policy.hedge.max_hedges = 2;
        }
        if self.policy.hedge.hedge_delay.is_zero() {
            self.policy.hedge.hedge_delay = Duration::from_millis(200);
        }
        self
    }

    /// Set the maximum hedged attempts per retry group; implies hedging.
    pub fn hedge_max_attempts(mut self, n: u32) -> Self {
        self.policy.hedge.enabled = true;
        self.policy.hedge.max_hedges = n;
        self
    }

    /// Set the delay before spawning hedge attempts; implies hedging.
    pub fn hedge_delay(mut self, d: Duration) -> Self {
        self.policy.hedge.enabled = true;
        self.policy.hedge.hedge_delay = d;
        self
    }

    /// Set a named trigger for hedge decisions; implies hedging.
    pub fn hedge_trigger(mut self, name: impl Into<String>) -> Self {
        self.policy.hedge.enabled = true;
        self.policy.hedge.trigger_name = name.into();
        self
    }

    /// Set the budget reference for hedge attempts.
    pub fn hedge_budget(mut self, name: impl Into<String>) -> Self {
        self.policy.hedge.budget = BudgetRef::named(name);
        self
    }

    /// Configure fail-fast behavior for hedged groups.
    pub fn hedge_cancel_on_terminal(mut self, cancel: bool) -> Self {
        self.policy.hedge.cancel_on_first_terminal = cancel;
        self
    }

    /// Enable circuit breaking with the given threshold and cooldown.
    pub fn circuit(mut self, threshold: u32, cooldown: Duration) -> Self {
        self.policy.circuit.enabled = true;
        self.policy.circuit.threshold = threshold;
        self.policy.circuit.cooldown = cooldown;
        self
    }

    // --- Presets ---

    /// Exponential backoff with equal jitter; the recommended default.
    pub fn exponential_backoff(self, initial: Duration, max: Duration) -> Self {
        self.backoff(initial, max, 2.0).jitter(JitterKind::Equal)
    }

    /// Constant-delay retries, for predictable timing such as polling.
    pub fn constant_backoff(self, delay: Duration) -> Self {
        self.backoff(delay, delay, 1.0).jitter(JitterKind::None)
    }

    /// Reasonable settings for HTTP client calls: exponential backoff with
    /// full jitter, per-attempt and overall timeouts, the `http` classifier.
    pub fn http_defaults(self) -> Self {
        self.max_attempts(3)
            .backoff(Duration::from_millis(100), Duration::from_secs(2), 2.0)
            .jitter(JitterKind::Full)
            .per_attempt_timeout(Duration::from_secs(10))
            .overall_timeout(Duration::from_secs(30))
            .classifier("http")
    }

    /// Conservative settings for database calls.
    pub fn database_defaults(self) -> Self {
        self.max_attempts(3)
            .backoff(Duration::from_millis(100), Duration::from_secs(5), 2.0)
            .jitter(JitterKind::Equal)
            .per_attempt_timeout(Duration::from_secs(30))
            .overall_timeout(Duration::from_secs(60))
    }

    /// Settings for background jobs: more retries, longer backoff, no
    /// per-attempt timeout.
    pub fn background_job_defaults(self) -> Self {
        self.max_attempts(5)
            .backoff(Duration::from_secs(1), Duration::from_secs(30), 2.0)
            .jitter(JitterKind::Full)
            .overall_timeout(Duration::from_secs(300))
    }

    /// Settings for latency-sensitive calls: aggressive timeouts plus
    /// hedging.
    pub fn low_latency_defaults(self) -> Self {
        self.max_attempts(2)
            .backoff(Duration::from_millis(10), Duration::from_millis(50), 2.0)
            .jitter(JitterKind::Equal)
            .per_attempt_timeout(Duration::from_millis(500))
            .overall_timeout(Duration::from_secs(1))
            .hedge_max_attempts(2)
            .hedge_delay(Duration::from_millis(100))
    }

    /// Normalize and return the policy.
    ///
    /// Falls back to the key's default policy if normalization fails, so the
    /// result is always executable.
    pub fn build(self) -> EffectivePolicy {
        let key = self.policy.key.clone();
        match self.policy.normalize() {
            Ok(p) => p,
            Err(_) => default_policy_for(key)
                .normalize()
                .expect("default policy normalizes"),
        }
    }
}
