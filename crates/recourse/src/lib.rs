//! Policy-driven resilience runtime for calls into remote dependencies.
//!
//! A call site names a low-cardinality policy key and an operation; the
//! runtime resolves a policy, executes the operation under it (bounded
//! retries with backoff and jitter, parallel hedging, budgets, circuit
//! breakers), and emits a structured timeline of every attempt.
//!
//! ```no_run
//! use recourse::{CallContext, Executor, PolicyBuilder, StaticProvider};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), recourse::CallError> {
//! let provider = Arc::new(StaticProvider::empty());
//! provider.set(
//!     PolicyBuilder::new("billing.Charge")
//!         .max_attempts(3)
//!         .exponential_backoff(Duration::from_millis(50), Duration::from_secs(2))
//!         .build(),
//! );
//! let executor = Executor::new(provider);
//!
//! let charged = executor
//!     .do_value(&CallContext::new(), "billing.Charge", |_attempt| async {
//!         // call the dependency here
//!         Ok::<_, recourse::BoxError>("receipt".to_string())
//!     })
//!     .await?;
//! # let _ = charged;
//! # Ok(())
//! # }
//! ```
//!
//! To inspect what a call did, attach a [`TimelineCapture`] to the
//! [`CallContext`] and read the timeline after the call returns.

mod global;

pub use global::{default_executor, do_call, do_value, set_default_executor, GlobalError};

// Policy model.
pub use recourse_policy::{
    default_policy_for, BudgetRef, CircuitPolicy, EffectivePolicy, HedgePolicy, JitterKind,
    NormalizeError, PolicyBuilder, PolicyKey, PolicySource, RetryPolicy,
};

// Classification.
pub use recourse_classify::{
    BoxError, CancelError, Classifier, ClassifierRegistry, ClassifyValue, DefaultClassifier,
    HttpStatusClassifier, Outcome, OutcomeKind, StatusResponse,
};

// Budgets.
pub use recourse_budget::{
    AttemptKind, Budget, BudgetRegistry, ConcurrencyLimitBudget, Decision, Release,
    TokenBucketBudget,
};

// Hedging and latency tracking.
pub use recourse_hedge::{
    FixedDelayTrigger, HedgeState, LatencySnapshot, LatencyTracker, Percentile,
    PercentileTrigger, TrackerStore, Trigger, TriggerRegistry,
};

// Circuit breaking.
pub use recourse_circuit::{
    BreakerConfig, BreakerState, CircuitBreaker, CircuitBreakerRegistry, CircuitOpenError,
};

// Observability.
pub use recourse_observe::{
    AttemptInfo, AttemptRecord, BudgetDecisionEvent, BudgetMode, NoopObserver, Observer,
    SharedError, Timeline, TimelineCapture, TracingObserver,
};

// Policy resolution.
pub use recourse_control::{PolicyProvider, ProviderError, ProviderErrorKind, StaticProvider};

// The engine.
pub use recourse_engine::{
    AttemptContext, CallContext, CallError, Clock, Executor, ExecutorBuilder, FailureMode,
    PanicError, SystemClock,
};
