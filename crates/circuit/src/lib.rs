//! Per-key circuit breakers for the recourse resilience runtime.
//!
//! A breaker fails fast for dependencies that are known bad: consecutive
//! terminal failures open the circuit, a cooldown later a bounded number of
//! probe calls test the dependency, and consecutive probe successes close it
//! again.

mod breaker;
mod registry;

pub mod reasons;

pub use breaker::{
    BreakerConfig, BreakerDecision, BreakerState, CircuitBreaker, CircuitOpenError,
};
pub use registry::{CircuitBreakerRegistry, DEFAULT_MAX_BREAKERS};
