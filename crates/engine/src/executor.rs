//! The executor: policy resolution, circuit gating, the retry loop, and
//! timeline finalization.

use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use recourse_budget::BudgetRegistry;
use recourse_circuit::{CircuitBreaker, CircuitBreakerRegistry, CircuitOpenError};
use recourse_classify::{
    BoxError, Classifier, ClassifierRegistry, DefaultClassifier, Outcome, OutcomeKind,
};
use recourse_control::{PolicyProvider, ProviderError, StaticProvider};
use recourse_hedge::{FixedDelayTrigger, TrackerStore, Trigger, TriggerRegistry};
use recourse_observe::{
    attrs, AttemptRecord, NoopObserver, Observer, SharedError, Timeline, TimelineCapture,
};
use recourse_policy::{default_policy_for, EffectivePolicy, PolicyKey};

use crate::backoff::{apply_jitter, sleep_base};
use crate::clock::{Clock, SystemClock};
use crate::context::{AttemptContext, CallContext};
use crate::error::{CallError, FailureMode, PanicError};
use crate::group::{run_group, GroupConfig, GroupVerdict, Operation};

pub(crate) struct ExecutorInner {
    provider: Arc<dyn PolicyProvider>,
    observer: Arc<dyn Observer>,
    clock: Arc<dyn Clock>,
    classifiers: Arc<ClassifierRegistry>,
    default_classifier: Arc<dyn Classifier>,
    budgets: Option<Arc<BudgetRegistry>>,
    triggers: Option<Arc<TriggerRegistry>>,
    breakers: Option<Arc<CircuitBreakerRegistry>>,
    trackers: Option<Arc<TrackerStore>>,
    missing_policy_mode: FailureMode,
    missing_classifier_mode: FailureMode,
    missing_budget_mode: FailureMode,
    missing_trigger_mode: FailureMode,
    recover_panics: bool,
}

/// Configures and builds an [`Executor`].
pub struct ExecutorBuilder {
    provider: Arc<dyn PolicyProvider>,
    observer: Arc<dyn Observer>,
    clock: Arc<dyn Clock>,
    classifiers: Arc<ClassifierRegistry>,
    default_classifier: Arc<dyn Classifier>,
    budgets: Option<Arc<BudgetRegistry>>,
    triggers: Option<Arc<TriggerRegistry>>,
    breakers: Option<Arc<CircuitBreakerRegistry>>,
    trackers: Option<Arc<TrackerStore>>,
    max_circuit_breakers: Option<usize>,
    max_latency_trackers: Option<usize>,
    missing_policy_mode: FailureMode,
    missing_classifier_mode: FailureMode,
    missing_budget_mode: FailureMode,
    missing_trigger_mode: FailureMode,
    recover_panics: bool,
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self {
            provider: Arc::new(StaticProvider::empty()),
            observer: Arc::new(NoopObserver),
            clock: Arc::new(SystemClock),
            classifiers: Arc::new(ClassifierRegistry::with_builtins()),
            default_classifier: Arc::new(DefaultClassifier),
            budgets: None,
            triggers: None,
            breakers: None,
            trackers: None,
            max_circuit_breakers: None,
            max_latency_trackers: None,
            missing_policy_mode: FailureMode::Fallback,
            missing_classifier_mode: FailureMode::Fallback,
            missing_budget_mode: FailureMode::Fallback,
            missing_trigger_mode: FailureMode::Fallback,
            recover_panics: false,
        }
    }
}

impl ExecutorBuilder {
    /// Set the policy provider. Defaults to an empty static provider, which
    /// resolves every key through the missing-policy path.
    pub fn provider(mut self, provider: Arc<dyn PolicyProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Set the observer. Defaults to [`NoopObserver`], which also enables
    /// the record-free fast path.
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Set the wall clock, injectable for tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the classifier registry. Defaults to the built-ins.
    pub fn classifiers(mut self, registry: Arc<ClassifierRegistry>) -> Self {
        self.classifiers = registry;
        self
    }

    /// Set the fallback classifier used when a policy names none.
    pub fn default_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.default_classifier = classifier;
        self
    }

    /// Set the budget registry.
    pub fn budgets(mut self, registry: Arc<BudgetRegistry>) -> Self {
        self.budgets = Some(registry);
        self
    }

    /// Set the hedge trigger registry.
    pub fn triggers(mut self, registry: Arc<TriggerRegistry>) -> Self {
        self.triggers = Some(registry);
        self
    }

    /// Set the circuit breaker registry.
    pub fn circuit_breakers(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = Some(registry);
        self
    }

    /// Set the latency tracker store.
    pub fn latency_trackers(mut self, store: Arc<TrackerStore>) -> Self {
        self.trackers = Some(store);
        self
    }

    /// Bound the default circuit breaker registry.
    pub fn max_circuit_breakers(mut self, max: usize) -> Self {
        self.max_circuit_breakers = Some(max);
        self
    }

    /// Bound the default latency tracker store.
    pub fn max_latency_trackers(mut self, max: usize) -> Self {
        self.max_latency_trackers = Some(max);
        self
    }

    /// What to do when policy resolution fails without a usable policy.
    pub fn missing_policy_mode(mut self, mode: FailureMode) -> Self {
        self.missing_policy_mode = mode;
        self
    }

    /// What to do when a named classifier is not registered.
    pub fn missing_classifier_mode(mut self, mode: FailureMode) -> Self {
        self.missing_classifier_mode = mode;
        self
    }

    /// What to do when a named budget is not registered.
    pub fn missing_budget_mode(mut self, mode: FailureMode) -> Self {
        self.missing_budget_mode = mode;
        self
    }

    /// What to do when a named trigger is not registered.
    pub fn missing_trigger_mode(mut self, mode: FailureMode) -> Self {
        self.missing_trigger_mode = mode;
        self
    }

    /// Recover panics in classifiers, budgets, triggers, and observers,
    /// converting them to `panic_in_*` aborts. Off by default: panics
    /// propagate.
    pub fn recover_panics(mut self, recover: bool) -> Self {
        self.recover_panics = recover;
        self
    }

    /// Build the executor.
    pub fn build(self) -> Executor {
        let breakers = self.breakers.unwrap_or_else(|| {
            Arc::new(match self.max_circuit_breakers {
                Some(max) => CircuitBreakerRegistry::with_max_keys(max),
                None => CircuitBreakerRegistry::new(),
            })
        });
        let trackers = self.trackers.unwrap_or_else(|| {
            Arc::new(match self.max_latency_trackers {
                Some(max) => TrackerStore::with_bounds(
                    recourse_hedge::DEFAULT_TRACKER_CAPACITY,
                    max,
                ),
                None => TrackerStore::new(),
            })
        });
        Executor {
            inner: Arc::new(ExecutorInner {
                provider: self.provider,
                observer: self.observer,
                clock: self.clock,
                classifiers: self.classifiers,
                default_classifier: self.default_classifier,
                budgets: self.budgets,
                triggers: self.triggers,
                breakers: Some(breakers),
                trackers: Some(trackers),
                missing_policy_mode: self.missing_policy_mode,
                missing_classifier_mode: self.missing_classifier_mode,
                missing_budget_mode: self.missing_budget_mode,
                missing_trigger_mode: self.missing_trigger_mode,
                recover_panics: self.recover_panics,
            }),
        }
    }
}

/// Which way the call's terminal outcome feeds the circuit breaker.
enum BreakerSignal {
    Success,
    Failure,
    Ignore,
}

/// The policy-driven resilience executor.
///
/// Cheap to clone; clones share registries, breakers, and trackers.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

impl Executor {
    /// Start building an executor.
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::default()
    }

    /// An executor over the given provider with default everything else.
    pub fn new(provider: Arc<dyn PolicyProvider>) -> Self {
        Self::builder().provider(provider).build()
    }

    /// Execute `op` under the policy for `key`, returning its value.
    pub async fn do_value<T, F, Fut>(
        &self,
        ctx: &CallContext,
        key: impl Into<PolicyKey>,
        op: F,
    ) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: Fn(AttemptContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let op: Operation<T> = Arc::new(move |actx| op(actx).boxed());
        self.run(ctx, key.into(), op, false).await.0
    }

    /// Execute a unit-valued `op` under the policy for `key`.
    pub async fn do_call<F, Fut>(
        &self,
        ctx: &CallContext,
        key: impl Into<PolicyKey>,
        op: F,
    ) -> Result<(), CallError>
    where
        F: Fn(AttemptContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.do_value(ctx, key, op).await
    }

    /// Like [`Executor::do_value`], returning the finalized timeline
    /// alongside the result. The timeline is `None` only when the call was
    /// denied before a policy existed (missing policy under deny mode).
    pub async fn do_value_recorded<T, F, Fut>(
        &self,
        ctx: &CallContext,
        key: impl Into<PolicyKey>,
        op: F,
    ) -> (Result<T, CallError>, Option<Timeline>)
    where
        T: Send + 'static,
        F: Fn(AttemptContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let op: Operation<T> = Arc::new(move |actx| op(actx).boxed());
        self.run(ctx, key.into(), op, true).await
    }

    async fn run<T: Send + 'static>(
        &self,
        ctx: &CallContext,
        key: PolicyKey,
        op: Operation<T>,
        want_timeline: bool,
    ) -> (Result<T, CallError>, Option<Timeline>) {
        let inner = &self.inner;
        let external = ctx
            .cancel
            .clone()
            .unwrap_or_else(CancellationToken::new);
        let capture = ctx.capture.clone();
        let recording = want_timeline || capture.is_some() || !inner.observer.is_noop();

        // 1-2. Resolve and normalize the policy.
        let (policy, resolution_attrs) = match self.resolve_policy(&key).await {
            Ok(resolved) => resolved,
            Err(err) => return (Err(err), None),
        };

        inner.observer.on_start(&key, &policy);

        let call_start_wall = inner.clock.now();
        let call_start = Instant::now();
        let mut timeline =
            recording.then(|| Timeline::new(key.clone(), policy.id.clone(), call_start_wall));
        if let Some(tl) = &mut timeline {
            for (attr_key, attr_value) in &resolution_attrs {
                tl.set_attribute(*attr_key, attr_value.clone());
            }
        }

        // 3. Overall deadline.
        let deadline =
            (!policy.retry.overall_timeout.is_zero()).then(|| call_start + policy.retry.overall_timeout);

        // 4. Circuit breaker.
        let mut breaker: Option<Arc<CircuitBreaker>> = None;
        let mut is_probe = false;
        if policy.circuit.enabled {
            if let Some(registry) = &inner.breakers {
                let candidate = registry.breaker_for(&key, &policy.circuit);
                let decision = candidate.allow();
                if !decision.allowed {
                    let now = inner.clock.now();
                    let record = AttemptRecord {
                        retry_index: 0,
                        attempt: 0,
                        start: now,
                        end: now,
                        is_hedge: false,
                        hedge_index: 0,
                        outcome: Outcome::abort(decision.reason),
                        error: None,
                        backoff: Duration::ZERO,
                        budget_allowed: true,
                        budget_reason: String::new(),
                    };
                    if recording {
                        inner.observer.on_attempt(&key, &record);
                    }
                    let err = CallError::CircuitOpen(CircuitOpenError {
                        key: key.clone(),
                        reason: decision.reason.to_string(),
                    });
                    let timeline =
                        self.finalize(timeline, &capture, vec![record], Some(&err));
                    return (Err(err), timeline);
                }
                is_probe = decision.is_probe;
                breaker = Some(candidate);
            }
        }

        // Classifier resolution.
        let classifier_name = policy.retry.classifier_name.trim().to_string();
        let classifier: Arc<dyn Classifier> = if classifier_name.is_empty() {
            Arc::clone(&inner.default_classifier)
        } else if let Some(found) = inner.classifiers.get(&classifier_name) {
            found
        } else {
            match inner.missing_classifier_mode {
                FailureMode::Fallback | FailureMode::Allow => {
                    debug!(key = %key, classifier = %classifier_name, "classifier not found; using default");
                    if let Some(tl) = &mut timeline {
                        tl.set_attribute(attrs::CLASSIFIER_NOT_FOUND, classifier_name.clone());
                    }
                    Arc::clone(&inner.default_classifier)
                }
                FailureMode::Deny => {
                    let err = CallError::ClassifierNotFound {
                        name: classifier_name,
                    };
                    let timeline = self.finalize(timeline, &capture, Vec::new(), Some(&err));
                    return (Err(err), timeline);
                }
            }
        };

        // Trigger resolution; probes never hedge.
        let mut hedging = policy.hedge.enabled && policy.hedge.max_hedges > 0 && !is_probe;
        if policy.hedge.enabled && is_probe {
            if let Some(tl) = &mut timeline {
                tl.set_attribute(attrs::HEDGING_DISABLED, "true");
            }
        }
        let trigger: Option<Arc<dyn Trigger>> = if hedging {
            let trigger_name = policy.hedge.trigger_name.trim();
            if trigger_name.is_empty() {
                Some(Arc::new(FixedDelayTrigger::new(policy.hedge.hedge_delay)))
            } else {
                match inner.triggers.as_ref().and_then(|r| r.get(trigger_name)) {
                    Some(found) => Some(found),
                    None => match inner.missing_trigger_mode {
                        FailureMode::Fallback | FailureMode::Allow => {
                            debug!(key = %key, trigger = %trigger_name, "trigger not found; using fixed delay");
                            if let Some(tl) = &mut timeline {
                                tl.set_attribute(attrs::TRIGGER_NOT_FOUND, trigger_name);
                            }
                            Some(Arc::new(FixedDelayTrigger::new(policy.hedge.hedge_delay)))
                        }
                        FailureMode::Deny => {
                            warn!(key = %key, trigger = %trigger_name, "trigger not found; hedging disabled");
                            if let Some(tl) = &mut timeline {
                                tl.set_attribute(attrs::TRIGGER_NOT_FOUND, trigger_name);
                                tl.set_attribute(attrs::HEDGING_DISABLED, "true");
                            }
                            hedging = false;
                            None
                        }
                    },
                }
            }
        } else {
            None
        };
        let _ = hedging;

        let tracker = inner
            .trackers
            .as_ref()
            .map(|store| store.tracker_for(&key));

        let cfg = Arc::new(GroupConfig {
            key: key.clone(),
            policy: policy.clone(),
            op,
            classifier,
            observer: Arc::clone(&inner.observer),
            clock: Arc::clone(&inner.clock),
            budgets: inner.budgets.clone(),
            missing_budget_mode: inner.missing_budget_mode,
            recover_panics: inner.recover_panics,
            recording,
            trigger,
            tracker,
            attempt_counter: AtomicU64::new(0),
            call_start,
        });

        // 5. Retry groups.
        let call_token = external.child_token();
        let mut records: Vec<AttemptRecord> = Vec::new();
        let mut last_error: Option<SharedError> = None;
        let mut last_reason = String::new();
        let mut sleep_backoff = Duration::ZERO;
        let mut breaker_signal = BreakerSignal::Ignore;
        let max_attempts = policy.retry.max_attempts;

        let result: Result<T, CallError> = 'call: {
            for retry_index in 0..max_attempts {
                if external.is_cancelled() {
                    break 'call Err(CallError::Canceled);
                }

                let verdict = run_group(
                    &cfg,
                    retry_index,
                    sleep_backoff,
                    &call_token,
                    &external,
                    deadline,
                    &mut records,
                )
                .await;

                match verdict {
                    GroupVerdict::Success { value } => {
                        breaker_signal = BreakerSignal::Success;
                        break 'call Ok(value);
                    }
                    GroupVerdict::Propagate(payload) => {
                        call_token.cancel();
                        std::panic::resume_unwind(payload);
                    }
                    GroupVerdict::Interrupted { deadline: true } => {
                        break 'call Err(CallError::DeadlineExceeded);
                    }
                    GroupVerdict::Interrupted { deadline: false } => {
                        break 'call Err(CallError::Canceled);
                    }
                    GroupVerdict::Terminal {
                        error,
                        outcome,
                        primary_denied,
                        panic_error,
                    } => {
                        if primary_denied {
                            if retry_index == 0 {
                                break 'call Err(match panic_error {
                                    Some(panic) => CallError::Panic(panic),
                                    None => CallError::BudgetDenied {
                                        reason: outcome.reason,
                                    },
                                });
                            }
                            // A later retry was denied: stop retrying, the
                            // call fails with the last real attempt's error.
                            if let Some(tl) = &mut timeline {
                                tl.set_attribute(attrs::STOPPED_DUE_TO_BUDGET, "true");
                            }
                            breaker_signal = BreakerSignal::Failure;
                            break 'call Err(attempt_failure(
                                last_error.take(),
                                std::mem::take(&mut last_reason),
                            ));
                        }
                        if let Some(panic) = panic_error {
                            break 'call Err(CallError::Panic(panic));
                        }
                        breaker_signal = match outcome.kind {
                            OutcomeKind::NonRetryable => BreakerSignal::Failure,
                            _ => BreakerSignal::Ignore,
                        };
                        break 'call Err(attempt_failure(error, outcome.reason));
                    }
                    GroupVerdict::Retryable {
                        error,
                        outcome,
                        max_override,
                    } => {
                        last_error = error;
                        last_reason = outcome.reason;
                        if retry_index + 1 >= max_attempts {
                            breaker_signal = BreakerSignal::Failure;
                            break 'call Err(attempt_failure(
                                last_error.take(),
                                std::mem::take(&mut last_reason),
                            ));
                        }

                        let base = sleep_base(retry_index, &policy.retry, max_override);
                        let sleep = apply_jitter(base, policy.retry.jitter);
                        sleep_backoff = sleep;
                        if !sleep.is_zero() {
                            match backoff_sleep(sleep, &external, deadline).await {
                                SleepEnd::Done => {}
                                SleepEnd::Canceled => break 'call Err(CallError::Canceled),
                                SleepEnd::Deadline => {
                                    break 'call Err(CallError::DeadlineExceeded)
                                }
                            }
                        }
                    }
                }
            }
            // max_attempts is >= 1 after normalization; every group breaks.
            Err(CallError::Rejected {
                reason: "retries_exhausted".to_string(),
            })
        };

        call_token.cancel();

        // 6. Feed the breaker and finalize.
        if let Some(breaker) = &breaker {
            match breaker_signal {
                BreakerSignal::Success => breaker.record_success(),
                BreakerSignal::Failure => breaker.record_failure(),
                BreakerSignal::Ignore => breaker.record_ignored(),
            }
        }

        let timeline = self.finalize(timeline, &capture, records, result.as_ref().err());
        (result, timeline)
    }

    /// Close out the timeline: sort records into launch order, stamp the
    /// end, fire the terminal observer callback, store the capture.
    fn finalize(
        &self,
        timeline: Option<Timeline>,
        capture: &Option<TimelineCapture>,
        mut records: Vec<AttemptRecord>,
        error: Option<&CallError>,
    ) -> Option<Timeline> {
        let mut timeline = timeline?;
        records.sort_by_key(|r| r.attempt);
        timeline.attempts = records;
        timeline.finalize(self.inner.clock.now(), error.map(|e| e.to_shared()));
        if error.is_none() {
            self.inner.observer.on_success(&timeline);
        } else {
            self.inner.observer.on_failure(&timeline);
        }
        if let Some(capture) = capture {
            capture.store(timeline.clone());
        }
        Some(timeline)
    }

    /// Resolve and normalize the policy for a key, producing the timeline
    /// attributes that describe how resolution went.
    async fn resolve_policy(
        &self,
        key: &PolicyKey,
    ) -> Result<(EffectivePolicy, Vec<(&'static str, String)>), CallError> {
        let inner = &self.inner;
        let mut resolution_attrs: Vec<(&'static str, String)> = Vec::new();

        enum Resolution {
            Policy(EffectivePolicy),
            Provider(ProviderError),
            Panicked(PanicError),
        }

        let fetched = if inner.recover_panics {
            match std::panic::AssertUnwindSafe(inner.provider.get_effective_policy(key))
                .catch_unwind()
                .await
            {
                Ok(Ok(policy)) => Resolution::Policy(policy),
                Ok(Err(err)) => Resolution::Provider(err),
                Err(payload) => Resolution::Panicked(PanicError::from_payload(
                    "policy_provider",
                    payload.as_ref(),
                )),
            }
        } else {
            match inner.provider.get_effective_policy(key).await {
                Ok(policy) => Resolution::Policy(policy),
                Err(err) => Resolution::Provider(err),
            }
        };

        let policy = match fetched {
            Resolution::Policy(policy) => {
                resolution_attrs
                    .push((attrs::POLICY_SOURCE, policy.meta.source.as_str().to_string()));
                policy
            }
            Resolution::Provider(err) => {
                // A provider that hands back a last-known-good policy keeps
                // the call alive even under deny mode; an operator-chosen
                // LKG beats a synthetic denial.
                if let Some(lkg) = err.lkg.clone() {
                    debug!(key = %key, error = %err, "running under last-known-good policy");
                    resolution_attrs.push((attrs::POLICY_SOURCE, "lkg".to_string()));
                    resolution_attrs.push((attrs::POLICY_ERROR, err.kind.as_str().to_string()));
                    *lkg
                } else {
                    match inner.missing_policy_mode {
                        FailureMode::Fallback | FailureMode::Allow => {
                            debug!(key = %key, error = %err, "policy resolution failed; using default policy");
                            resolution_attrs.push((attrs::POLICY_SOURCE, "default".to_string()));
                            resolution_attrs
                                .push((attrs::POLICY_ERROR, err.kind.as_str().to_string()));
                            default_policy_for(key.clone())
                        }
                        FailureMode::Deny => {
                            return Err(CallError::NoPolicy {
                                key: key.clone(),
                                source: Box::new(err),
                            })
                        }
                    }
                }
            }
            Resolution::Panicked(panic) => match inner.missing_policy_mode {
                FailureMode::Fallback | FailureMode::Allow => {
                    warn!(key = %key, error = %panic, "policy provider panicked; using default policy");
                    resolution_attrs.push((attrs::POLICY_SOURCE, "default".to_string()));
                    resolution_attrs
                        .push((attrs::POLICY_ERROR, "panic_in_policy_provider".to_string()));
                    default_policy_for(key.clone())
                }
                FailureMode::Deny => {
                    return Err(CallError::NoPolicy {
                        key: key.clone(),
                        source: Box::new(panic),
                    })
                }
            },
        };

        // Normalization runs at the boundary even when a provider already
        // normalized; a second pass must change nothing.
        let normalized = match policy.normalize() {
            Ok(normalized) => normalized,
            Err(err) => match inner.missing_policy_mode {
                FailureMode::Fallback | FailureMode::Allow => {
                    warn!(key = %key, error = %err, "policy failed normalization; using default policy");
                    resolution_attrs.push((attrs::POLICY_SOURCE, "default".to_string()));
                    resolution_attrs.push((attrs::POLICY_ERROR, "invalid_policy".to_string()));
                    default_policy_for(key.clone())
                        .normalize()
                        .expect("default policy normalizes")
                }
                FailureMode::Deny => return Err(CallError::Normalize(err)),
            },
        };

        if normalized.meta.normalization.changed {
            resolution_attrs.push((attrs::POLICY_NORMALIZED, "true".to_string()));
            resolution_attrs.push((
                attrs::POLICY_CLAMPED_FIELDS,
                normalized.meta.normalization.changed_fields.join(","),
            ));
        }

        Ok((normalized, resolution_attrs))
    }
}

fn attempt_failure(error: Option<SharedError>, reason: String) -> CallError {
    match error {
        Some(err) => CallError::Operation(err),
        None => CallError::Rejected { reason },
    }
}

enum SleepEnd {
    Done,
    Canceled,
    Deadline,
}

/// Inter-group backoff sleep, interruptible by the caller's cancellation
/// and the overall deadline.
async fn backoff_sleep(
    duration: Duration,
    external: &CancellationToken,
    deadline: Option<Instant>,
) -> SleepEnd {
    let deadline_sleep = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => futures::future::pending().await,
        }
    };
    tokio::select! {
        _ = tokio::time::sleep(duration) => SleepEnd::Done,
        _ = external.cancelled() => SleepEnd::Canceled,
        _ = deadline_sleep => SleepEnd::Deadline,
    }
}
