//! Built-in budget implementations.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use recourse_policy::{BudgetRef, PolicyKey};

use crate::reasons;
use crate::types::{AttemptKind, Budget, Decision, Release};

/// Token bucket: a fixed capacity refilled at a constant rate.
///
/// Each attempt consumes `budget.cost` tokens (min 1). Tokens are not
/// returned when an attempt finishes, so no release guard is issued.
pub struct TokenBucketBudget {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketBudget {
    /// Create a bucket with the given capacity and refill rate (tokens per
    /// second; zero disables refill). The bucket starts full.
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_per_sec: refill_per_sec.max(0.0),
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Tokens currently available, after applying pending refill.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().expect("token bucket lock poisoned");
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        if self.refill_per_sec <= 0.0 {
            return;
        }
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.last_refill = now;
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
    }
}

impl Budget for TokenBucketBudget {
    fn allow_attempt(
        &self,
        _key: &PolicyKey,
        _attempt: usize,
        _kind: AttemptKind,
        budget: &BudgetRef,
    ) -> Decision {
        let cost = f64::from(budget.cost.max(1));
        let mut state = self.state.lock().expect("token bucket lock poisoned");
        self.refill(&mut state);
        if state.tokens >= cost {
            state.tokens -= cost;
            Decision::allow(reasons::ALLOWED)
        } else {
            Decision::deny(reasons::BUDGET_DENIED)
        }
    }
}

/// Caps attempts in flight at once.
///
/// Admissions carry a [`Release`] guard; the slot frees when the guard drops,
/// whatever path the attempt exits by.
pub struct ConcurrencyLimitBudget {
    max_in_flight: u32,
    active: Arc<AtomicU32>,
}

impl ConcurrencyLimitBudget {
    /// Create a limiter admitting at most `max_in_flight` concurrent
    /// attempts.
    pub fn new(max_in_flight: u32) -> Self {
        Self {
            max_in_flight,
            active: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Attempts currently holding a slot.
    pub fn in_flight(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }
}

impl Budget for ConcurrencyLimitBudget {
    fn allow_attempt(
        &self,
        _key: &PolicyKey,
        _attempt: usize,
        _kind: AttemptKind,
        _budget: &BudgetRef,
    ) -> Decision {
        let admitted = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                (active < self.max_in_flight).then_some(active + 1)
            })
            .is_ok();

        if !admitted {
            return Decision::deny(reasons::BUDGET_DENIED);
        }

        let active = Arc::clone(&self.active);
        Decision::allow_with_release(
            reasons::ALLOWED,
            Release::new(move || {
                active.fetch_sub(1, Ordering::SeqCst);
            }),
        )
    }
}
