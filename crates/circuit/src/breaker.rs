//! The breaker state machine.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use recourse_policy::{CircuitPolicy, PolicyKey};

use crate::reasons;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow normally.
    Closed,
    /// Calls are denied until the cooldown elapses.
    Open,
    /// A bounded number of probe calls test the dependency.
    HalfOpen,
}

/// Breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive terminal failures that open the circuit.
    pub threshold: u32,
    /// How long the circuit stays open before probing.
    pub cooldown: Duration,
    /// Probe calls allowed in flight while half-open.
    pub max_probes: u32,
    /// Consecutive probe successes that close the circuit.
    pub probe_successes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown: Duration::from_secs(10),
            max_probes: 1,
            probe_successes: 1,
        }
    }
}

impl BreakerConfig {
    /// Derive a config from a policy's circuit envelope, filling the probe
    /// fields the policy does not carry.
    pub fn from_policy(policy: &CircuitPolicy) -> Self {
        let defaults = Self::default();
        Self {
            threshold: if policy.threshold == 0 {
                defaults.threshold
            } else {
                policy.threshold
            },
            cooldown: if policy.cooldown.is_zero() {
                defaults.cooldown
            } else {
                policy.cooldown
            },
            ..defaults
        }
    }
}

/// Result of asking the breaker whether a call may proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerDecision {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// Denial reason; empty when allowed.
    pub reason: &'static str,
    /// True when this call occupies a half-open probe slot. The engine
    /// disables hedging for probe calls.
    pub is_probe: bool,
}

impl BreakerDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: "",
            is_probe: false,
        }
    }

    fn probe() -> Self {
        Self {
            allowed: true,
            reason: "",
            is_probe: true,
        }
    }

    fn deny(reason: &'static str) -> Self {
        Self {
            allowed: false,
            reason,
            is_probe: false,
        }
    }
}

/// The error a call fails with when the circuit denies it outright.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit open for {key}: {reason}")]
pub struct CircuitOpenError {
    /// Key whose circuit denied the call.
    pub key: PolicyKey,
    /// Denial reason (see [`crate::reasons`]).
    pub reason: String,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probes_in_flight: u32,
    probe_successes: u32,
}

/// Per-key breaker. Shared across calls and internally synchronized.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker with the given config.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probes_in_flight: 0,
                probe_successes: 0,
            }),
        }
    }

    /// Decide whether a call may proceed, transitioning Open → HalfOpen when
    /// the cooldown has elapsed.
    pub fn allow(&self) -> BreakerDecision {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");

        if inner.state == BreakerState::Open {
            let cooled = inner
                .opened_at
                .map(|at| at.elapsed() >= self.config.cooldown)
                .unwrap_or(true);
            if !cooled {
                return BreakerDecision::deny(reasons::CIRCUIT_OPEN);
            }
            inner.state = BreakerState::HalfOpen;
            inner.probes_in_flight = 0;
            inner.probe_successes = 0;
        }

        match inner.state {
            BreakerState::Closed => BreakerDecision::allow(),
            BreakerState::HalfOpen => {
                if inner.probes_in_flight < self.config.max_probes {
                    inner.probes_in_flight += 1;
                    BreakerDecision::probe()
                } else {
                    BreakerDecision::deny(reasons::CIRCUIT_PROBES_EXHAUSTED)
                }
            }
            BreakerState::Open => unreachable!("open state handled above"),
        }
    }

    /// Record a successful terminal outcome.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => inner.consecutive_failures = 0,
            BreakerState::HalfOpen => {
                inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.probe_successes {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.opened_at = None;
                    inner.probes_in_flight = 0;
                    inner.probe_successes = 0;
                }
            }
            // A call that started before the reopen; its result is stale.
            BreakerState::Open => {}
        }
    }

    /// Record a failed terminal outcome.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                // Any probe failure reopens and restarts the cooldown.
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probes_in_flight = 0;
                inner.probe_successes = 0;
            }
            BreakerState::Open => {}
        }
    }

    /// Release a probe slot without recording an outcome. Used for aborts
    /// (user cancellation, policy-level aborts) that say nothing about the
    /// dependency's health.
    pub fn record_ignored(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        if inner.state == BreakerState::HalfOpen {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }
    }

    /// Current state. Does not apply the cooldown transition; only
    /// [`CircuitBreaker::allow`] moves Open to HalfOpen.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Force the breaker open now. For tests and operational overrides.
    pub fn trip(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
        inner.probes_in_flight = 0;
        inner.probe_successes = 0;
    }
}
