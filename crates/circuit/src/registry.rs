//! Bounded per-key breaker registry.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use recourse_policy::{CircuitPolicy, PolicyKey};

use crate::breaker::{BreakerConfig, CircuitBreaker};

/// Default bound on breaker keys.
pub const DEFAULT_MAX_BREAKERS: usize = 1024;

/// Per-key [`CircuitBreaker`] store with LRU eviction.
///
/// Breaker state is long-lived and shared across calls for the same key; the
/// LRU bound keeps a misbehaving key set from growing the map without limit.
pub struct CircuitBreakerRegistry {
    max_keys: usize,
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    breakers: HashMap<PolicyKey, Arc<CircuitBreaker>>,
    order: VecDeque<PolicyKey>,
}

impl CircuitBreakerRegistry {
    /// Create a registry with the default key bound.
    pub fn new() -> Self {
        Self::with_max_keys(DEFAULT_MAX_BREAKERS)
    }

    /// Create a registry bounded to `max_keys` breakers.
    pub fn with_max_keys(max_keys: usize) -> Self {
        Self {
            max_keys: max_keys.max(1),
            inner: Mutex::new(RegistryInner {
                breakers: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Get or create the breaker for a key, configured from the policy's
    /// circuit envelope on first use.
    ///
    /// The config is fixed at creation; later policy changes for the same
    /// key reuse the existing breaker so its failure history survives policy
    /// refreshes.
    pub fn breaker_for(&self, key: &PolicyKey, policy: &CircuitPolicy) -> Arc<CircuitBreaker> {
        let mut inner = self.inner.lock().expect("breaker registry lock poisoned");

        if let Some(breaker) = inner.breakers.get(key).cloned() {
            Self::touch(&mut inner.order, key);
            return breaker;
        }

        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::from_policy(policy)));
        inner.breakers.insert(key.clone(), Arc::clone(&breaker));
        inner.order.push_back(key.clone());

        if inner.breakers.len() > self.max_keys {
            if let Some(oldest) = inner.order.pop_front() {
                inner.breakers.remove(&oldest);
            }
        }

        breaker
    }

    /// Look up the breaker for a key without creating one.
    pub fn get(&self, key: &PolicyKey) -> Option<Arc<CircuitBreaker>> {
        self.inner
            .lock()
            .expect("breaker registry lock poisoned")
            .breakers
            .get(key)
            .cloned()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("breaker registry lock poisoned")
            .breakers
            .len()
    }

    /// True when no breakers exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch(order: &mut VecDeque<PolicyKey>, key: &PolicyKey) {
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.clone());
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
