//! End-to-end scenarios for the executor and the group coordinator.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use recourse_budget::{BudgetRegistry, ConcurrencyLimitBudget, TokenBucketBudget};
use recourse_classify::{
    BoxError, Classifier, ClassifierRegistry, ClassifyValue, Outcome, OutcomeKind,
};
use recourse_control::{PolicyProvider, ProviderError, StaticProvider};
use recourse_observe::{
    AttemptRecord, BudgetDecisionEvent, Observer, Timeline, TimelineCapture,
};
use recourse_policy::{
    default_policy_for, EffectivePolicy, JitterKind, PolicyBuilder, PolicyKey,
};

use crate::{CallContext, CallError, Executor, FailureMode, PanicError};

fn boom() -> BoxError {
    anyhow::anyhow!("boom").into()
}

fn provider_with(policy: EffectivePolicy) -> Arc<StaticProvider> {
    let provider = Arc::new(StaticProvider::empty());
    provider.set(policy);
    provider
}

/// Observer that logs every callback for ordering assertions.
#[derive(Default)]
struct TestObserver {
    events: Mutex<Vec<String>>,
}

impl TestObserver {
    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl Observer for TestObserver {
    fn on_start(&self, _key: &PolicyKey, _policy: &EffectivePolicy) {
        self.push("start");
    }

    fn on_attempt(&self, _key: &PolicyKey, record: &AttemptRecord) {
        self.push(format!("attempt:{}", record.attempt));
    }

    fn on_hedge_spawn(&self, _key: &PolicyKey, _record: &AttemptRecord) {
        self.push("hedge_spawn");
    }

    fn on_hedge_cancel(&self, _key: &PolicyKey, _record: &AttemptRecord, reason: &str) {
        self.push(format!("hedge_cancel:{reason}"));
    }

    fn on_budget_decision(&self, event: &BudgetDecisionEvent) {
        self.push(format!("budget:{}:{}", event.reason, event.allowed));
    }

    fn on_success(&self, _timeline: &Timeline) {
        self.push("success");
    }

    fn on_failure(&self, _timeline: &Timeline) {
        self.push("failure");
    }
}

/// Classifier that treats every error as a permanent validation failure.
struct ValidationClassifier;

impl Classifier for ValidationClassifier {
    fn classify(&self, _value: Option<ClassifyValue<'_>>, error: Option<&BoxError>) -> Outcome {
        match error {
            None => Outcome::success(),
            Some(_) => Outcome::non_retryable("validation"),
        }
    }
}

struct PanickingClassifier;

impl Classifier for PanickingClassifier {
    fn classify(&self, _value: Option<ClassifyValue<'_>>, _error: Option<&BoxError>) -> Outcome {
        panic!("classifier blew up");
    }
}

struct PanickingProvider;

#[async_trait]
impl PolicyProvider for PanickingProvider {
    async fn get_effective_policy(
        &self,
        _key: &PolicyKey,
    ) -> Result<EffectivePolicy, ProviderError> {
        panic!("provider blew up");
    }
}

struct LkgProvider {
    policy: EffectivePolicy,
}

#[async_trait]
impl PolicyProvider for LkgProvider {
    async fn get_effective_policy(
        &self,
        _key: &PolicyKey,
    ) -> Result<EffectivePolicy, ProviderError> {
        Err(ProviderError::unavailable("control plane down").with_lkg(self.policy.clone()))
    }
}

#[tokio::test(start_paused = true)]
async fn retry_to_success_with_exact_backoffs() {
    let policy = PolicyBuilder::new("svc.Retry")
        .max_attempts(3)
        .backoff(Duration::from_millis(10), Duration::from_secs(10), 2.0)
        .jitter(JitterKind::None)
        .build();
    let exec = Executor::builder().provider(provider_with(policy)).build();

    let calls = Arc::new(AtomicU32::new(0));
    let op_calls = Arc::clone(&calls);
    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.Retry", move |_ctx| {
            let calls = Arc::clone(&op_calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(boom())
                } else {
                    Ok("ok".to_string())
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let timeline = timeline.unwrap();
    assert_eq!(timeline.attempts.len(), 3);
    assert!(timeline.succeeded());
    let backoffs: Vec<Duration> = timeline.attempts.iter().map(|a| a.backoff).collect();
    assert_eq!(
        backoffs,
        vec![
            Duration::ZERO,
            Duration::from_millis(10),
            Duration::from_millis(20),
        ]
    );
    // Launch order is strictly increasing from zero.
    for (i, record) in timeline.attempts.iter().enumerate() {
        assert_eq!(record.attempt, i as u64);
    }
}

#[tokio::test]
async fn non_retryable_outcome_stops_immediately() {
    let classifiers = Arc::new(ClassifierRegistry::with_builtins());
    classifiers
        .register("validation", Arc::new(ValidationClassifier))
        .unwrap();
    let policy = PolicyBuilder::new("svc.Strict")
        .max_attempts(5)
        .classifier("validation")
        .build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .classifiers(classifiers)
        .build();

    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.Strict", |_ctx| async {
            Err::<(), _>(boom())
        })
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, CallError::Operation(_)));
    let timeline = timeline.unwrap();
    assert_eq!(timeline.attempts.len(), 1);
    assert_eq!(timeline.attempts[0].outcome.kind, OutcomeKind::NonRetryable);
    assert_eq!(timeline.attempts[0].outcome.reason, "validation");
    assert!(!timeline.succeeded());
}

#[tokio::test(start_paused = true)]
async fn budget_denial_stops_retries() {
    let budgets = Arc::new(BudgetRegistry::new());
    budgets
        .register("tight", Arc::new(TokenBucketBudget::new(1, 0.0)))
        .unwrap();
    let policy = PolicyBuilder::new("svc.Budgeted")
        .max_attempts(3)
        .initial_backoff(Duration::from_millis(1))
        .jitter(JitterKind::None)
        .budget("tight")
        .build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .budgets(budgets)
        .build();

    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.Budgeted", |_ctx| async {
            Err::<(), _>(boom())
        })
        .await;

    // The terminal error is the real attempt's error, not the denial.
    let err = result.unwrap_err();
    assert!(err.to_string().contains("boom"), "got {err}");

    let timeline = timeline.unwrap();
    assert_eq!(timeline.attempts.len(), 2);
    let denied = &timeline.attempts[1];
    assert!(!denied.budget_allowed);
    assert_eq!(denied.budget_reason, "budget_denied");
    assert_eq!(
        timeline.attributes.get("stopped_due_to_budget").map(String::as_str),
        Some("true")
    );
}

#[tokio::test]
async fn budget_denial_on_first_attempt_fails_the_call() {
    let budgets = Arc::new(BudgetRegistry::new());
    budgets
        .register("empty", Arc::new(TokenBucketBudget::new(0, 0.0)))
        .unwrap();
    let policy = PolicyBuilder::new("svc.NoBudget").budget("empty").build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .budgets(budgets)
        .build();

    let invoked = Arc::new(AtomicU32::new(0));
    let op_invoked = Arc::clone(&invoked);
    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.NoBudget", move |_ctx| {
            let invoked = Arc::clone(&op_invoked);
            async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(1u32)
            }
        })
        .await;

    assert!(matches!(
        result.unwrap_err(),
        CallError::BudgetDenied { .. }
    ));
    assert_eq!(invoked.load(Ordering::SeqCst), 0, "denied attempt ran the op");
    assert_eq!(timeline.unwrap().attempts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn hedge_wins_and_primary_is_internally_canceled() {
    let observer = Arc::new(TestObserver::default());
    let policy = PolicyBuilder::new("svc.Hedged")
        .max_attempts(1)
        .hedge_max_attempts(1)
        .hedge_delay(Duration::from_millis(10))
        .build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .observer(observer.clone())
        .build();

    let capture = TimelineCapture::new();
    let ctx = CallContext::new().with_timeline_capture(&capture);
    let result = exec
        .do_value(&ctx, "svc.Hedged", |actx| async move {
            if actx.info().is_hedge {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok("hedge".to_string())
            } else {
                // Does not watch for cancellation; the engine drops the
                // future when the hedge wins.
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok("primary".to_string())
            }
        })
        .await;

    assert_eq!(result.unwrap(), "hedge");

    let timeline = capture.timeline().unwrap();
    assert_eq!(timeline.attempts.len(), 2);
    // At most MaxAttempts * (1 + MaxHedges) attempts.
    assert!(timeline.attempts.len() <= 2);
    let primary = timeline.attempts.iter().find(|a| !a.is_hedge).unwrap();
    let hedge = timeline.attempts.iter().find(|a| a.is_hedge).unwrap();
    assert_eq!(primary.outcome.reason, "canceled_internal");
    assert_eq!(primary.outcome.kind, OutcomeKind::Abort);
    assert!(hedge.outcome.is_success());
    assert_eq!(hedge.hedge_index, 1);

    let events = observer.events();
    assert_eq!(
        events.iter().filter(|e| e.as_str() == "hedge_spawn").count(),
        1
    );
    assert!(events.iter().any(|e| e == "hedge_cancel:winner"));
}

#[tokio::test(start_paused = true)]
async fn late_success_wins_when_cancel_on_first_terminal_is_off() {
    let classifiers = Arc::new(ClassifierRegistry::with_builtins());
    classifiers
        .register("validation", Arc::new(ValidationClassifier))
        .unwrap();
    let policy = PolicyBuilder::new("svc.LateWin")
        .max_attempts(1)
        .classifier("validation")
        .hedge_max_attempts(1)
        .hedge_delay(Duration::from_millis(10))
        .hedge_cancel_on_terminal(false)
        .build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .classifiers(classifiers)
        .build();

    let result = exec
        .do_value(&CallContext::new(), "svc.LateWin", |actx| async move {
            if actx.info().is_hedge {
                tokio::time::sleep(Duration::from_millis(15)).await;
                Ok("late".to_string())
            } else {
                tokio::time::sleep(Duration::from_millis(15)).await;
                Err(boom())
            }
        })
        .await;

    // The primary fails terminally at ~15ms, the hedge succeeds at ~25ms;
    // with fail-fast off the in-flight hedge may still win.
    assert_eq!(result.unwrap(), "late");
}

#[tokio::test(start_paused = true)]
async fn first_terminal_cancels_the_group_when_configured() {
    let observer = Arc::new(TestObserver::default());
    let classifiers = Arc::new(ClassifierRegistry::with_builtins());
    classifiers
        .register("validation", Arc::new(ValidationClassifier))
        .unwrap();
    let policy = PolicyBuilder::new("svc.FailFast")
        .max_attempts(1)
        .classifier("validation")
        .hedge_max_attempts(1)
        .hedge_delay(Duration::from_millis(10))
        .hedge_cancel_on_terminal(true)
        .build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .classifiers(classifiers)
        .observer(observer.clone())
        .build();

    let capture = TimelineCapture::new();
    let ctx = CallContext::new().with_timeline_capture(&capture);
    let result = exec
        .do_value(&ctx, "svc.FailFast", |actx| async move {
            if actx.info().is_hedge {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok("slow hedge".to_string())
            } else {
                tokio::time::sleep(Duration::from_millis(15)).await;
                Err(boom())
            }
        })
        .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("boom"), "got {err}");

    let timeline = capture.timeline().unwrap();
    let hedge = timeline.attempts.iter().find(|a| a.is_hedge).unwrap();
    assert_eq!(hedge.outcome.reason, "canceled_internal");
    assert!(observer.events().iter().any(|e| e == "hedge_cancel:terminal"));
}

#[tokio::test]
async fn open_circuit_fails_fast_without_invoking_the_op() {
    let observer = Arc::new(TestObserver::default());
    let classifiers = Arc::new(ClassifierRegistry::with_builtins());
    classifiers
        .register("validation", Arc::new(ValidationClassifier))
        .unwrap();
    let policy = PolicyBuilder::new("svc.Broken")
        .max_attempts(1)
        .classifier("validation")
        .circuit(1, Duration::from_secs(60))
        .build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .classifiers(classifiers)
        .observer(observer.clone())
        .build();

    let invoked = Arc::new(AtomicU32::new(0));

    // First call fails terminally and opens the breaker.
    let op_invoked = Arc::clone(&invoked);
    let first = exec
        .do_value(&CallContext::new(), "svc.Broken", move |_ctx| {
            let invoked = Arc::clone(&op_invoked);
            async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(boom())
            }
        })
        .await;
    assert!(first.is_err());
    assert_eq!(invoked.load(Ordering::SeqCst), 1);

    // Second call is denied by the open circuit.
    let op_invoked = Arc::clone(&invoked);
    let (second, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.Broken", move |_ctx| {
            let invoked = Arc::clone(&op_invoked);
            async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

    assert!(matches!(second.unwrap_err(), CallError::CircuitOpen(_)));
    assert_eq!(invoked.load(Ordering::SeqCst), 1, "op ran behind an open circuit");

    let timeline = timeline.unwrap();
    assert_eq!(timeline.attempts.len(), 1);
    assert_eq!(timeline.attempts[0].outcome.kind, OutcomeKind::Abort);
    assert_eq!(timeline.attempts[0].outcome.reason, "circuit_open");
    assert_eq!(observer.events().iter().filter(|e| e.as_str() == "failure").count(), 2);
}

#[tokio::test(start_paused = true)]
async fn external_cancellation_interrupts_backoff() {
    let policy = PolicyBuilder::new("svc.Canceled")
        .max_attempts(3)
        .initial_backoff(Duration::from_millis(50))
        .jitter(JitterKind::None)
        .build();
    let exec = Executor::builder().provider(provider_with(policy)).build();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let ctx = CallContext::new().with_cancellation(token);
    let (result, timeline) = exec
        .do_value_recorded(&ctx, "svc.Canceled", |_ctx| async {
            Err::<(), _>(boom())
        })
        .await;

    assert!(result.unwrap_err().is_canceled());
    // The first attempt ran, the cancellation hit mid-backoff, and no
    // further attempt launched.
    assert_eq!(timeline.unwrap().attempts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn overall_timeout_ends_the_call() {
    let policy = PolicyBuilder::new("svc.Slow")
        .max_attempts(3)
        .overall_timeout(Duration::from_millis(30))
        .build();
    let exec = Executor::builder().provider(provider_with(policy)).build();

    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.Slow", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        })
        .await;

    assert!(matches!(result.unwrap_err(), CallError::DeadlineExceeded));
    let timeline = timeline.unwrap();
    assert_eq!(timeline.attempts.len(), 1);
    assert_eq!(timeline.attempts[0].outcome.kind, OutcomeKind::Abort);
}

#[tokio::test(start_paused = true)]
async fn per_attempt_timeout_aborts_under_default_classification() {
    let policy = PolicyBuilder::new("svc.AttemptTimeout")
        .max_attempts(3)
        .per_attempt_timeout(Duration::from_millis(10))
        .build();
    let exec = Executor::builder().provider(provider_with(policy)).build();

    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.AttemptTimeout", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .await;

    assert!(matches!(result.unwrap_err(), CallError::Operation(_)));
    let timeline = timeline.unwrap();
    assert_eq!(timeline.attempts.len(), 1);
    assert_eq!(timeline.attempts[0].outcome.reason, "deadline_exceeded");
}

#[tokio::test]
async fn attempt_info_is_visible_inside_the_op() {
    let policy = PolicyBuilder::new("svc.Info")
        .max_attempts(2)
        .initial_backoff(Duration::from_millis(1))
        .policy_id("pol-42")
        .build();
    let exec = Executor::builder().provider(provider_with(policy)).build();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let op_seen = Arc::clone(&seen);
    let result = exec
        .do_value(&CallContext::new(), "svc.Info", move |actx| {
            let seen = Arc::clone(&op_seen);
            async move {
                let info = actx.info().clone();
                seen.lock().unwrap().push(info.clone());
                if info.attempt == 0 {
                    Err(boom())
                } else {
                    Ok(info.retry_index)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 1);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].attempt, 0);
    assert_eq!(seen[0].retry_index, 0);
    assert_eq!(seen[1].attempt, 1);
    assert_eq!(seen[1].retry_index, 1);
    assert!(seen.iter().all(|i| i.policy_id == "pol-42"));
}

#[tokio::test]
async fn lkg_policy_keeps_the_call_alive() {
    let lkg = PolicyBuilder::new("svc.Lkg").max_attempts(2).build();
    let exec = Executor::builder()
        .provider(Arc::new(LkgProvider { policy: lkg }))
        .missing_policy_mode(FailureMode::Deny)
        .build();

    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.Lkg", |_ctx| async { Ok(7u32) })
        .await;

    assert_eq!(result.unwrap(), 7);
    let timeline = timeline.unwrap();
    assert_eq!(
        timeline.attributes.get("policy_source").map(String::as_str),
        Some("lkg")
    );
    assert_eq!(
        timeline.attributes.get("policy_error").map(String::as_str),
        Some("provider_unavailable")
    );
}

#[tokio::test]
async fn missing_policy_falls_back_to_default() {
    let exec = Executor::builder()
        .provider(Arc::new(StaticProvider::empty()))
        .build();

    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.Unknown", |_ctx| async { Ok(1u8) })
        .await;

    assert_eq!(result.unwrap(), 1);
    let timeline = timeline.unwrap();
    assert_eq!(
        timeline.attributes.get("policy_source").map(String::as_str),
        Some("default")
    );
    assert_eq!(
        timeline.attributes.get("policy_error").map(String::as_str),
        Some("policy_not_found")
    );
}

#[tokio::test]
async fn missing_policy_deny_fails_the_call() {
    let exec = Executor::builder()
        .provider(Arc::new(StaticProvider::empty()))
        .missing_policy_mode(FailureMode::Deny)
        .build();

    let err = exec
        .do_value(&CallContext::new(), "svc.Unknown", |_ctx| async { Ok(1u8) })
        .await
        .unwrap_err();

    let CallError::NoPolicy { key, source } = err else {
        panic!("expected NoPolicy, got {err}");
    };
    assert_eq!(key.to_string(), "svc.Unknown");
    assert!(source.downcast_ref::<ProviderError>().is_some());
}

#[tokio::test]
async fn provider_panic_is_recovered_into_no_policy() {
    let exec = Executor::builder()
        .provider(Arc::new(PanickingProvider))
        .missing_policy_mode(FailureMode::Deny)
        .recover_panics(true)
        .build();

    let err = exec
        .do_value(&CallContext::new(), "svc.Panics", |_ctx| async { Ok(1u8) })
        .await
        .unwrap_err();

    let CallError::NoPolicy { source, .. } = err else {
        panic!("expected NoPolicy, got {err}");
    };
    let panic = source.downcast_ref::<PanicError>().expect("panic in chain");
    assert_eq!(panic.component, "policy_provider");
}

#[tokio::test]
async fn normalization_is_annotated_on_the_timeline() {
    let mut policy = default_policy_for(PolicyKey::parse("svc.Clamped"));
    policy.retry.max_attempts = 50;
    let exec = Executor::builder().provider(provider_with(policy)).build();

    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.Clamped", |_ctx| async { Ok(()) })
        .await;

    assert!(result.is_ok());
    let timeline = timeline.unwrap();
    assert_eq!(
        timeline.attributes.get("policy_normalized").map(String::as_str),
        Some("true")
    );
    assert!(timeline
        .attributes
        .get("policy_clamped_fields")
        .unwrap()
        .contains("retry.max_attempts"));
}

#[tokio::test]
async fn classifier_panic_is_recovered_into_a_typed_error() {
    let classifiers = Arc::new(ClassifierRegistry::with_builtins());
    classifiers
        .register("explosive", Arc::new(PanickingClassifier))
        .unwrap();
    let policy = PolicyBuilder::new("svc.Explosive")
        .max_attempts(2)
        .classifier("explosive")
        .build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .classifiers(classifiers)
        .recover_panics(true)
        .build();

    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.Explosive", |_ctx| async { Ok(0u8) })
        .await;

    let CallError::Panic(panic) = result.unwrap_err() else {
        panic!("expected panic error");
    };
    assert_eq!(panic.component, "classifier");
    let timeline = timeline.unwrap();
    assert_eq!(timeline.attempts[0].outcome.reason, "panic_in_classifier");
}

#[tokio::test]
async fn classifier_panic_propagates_by_default() {
    let classifiers = Arc::new(ClassifierRegistry::with_builtins());
    classifiers
        .register("explosive", Arc::new(PanickingClassifier))
        .unwrap();
    let policy = PolicyBuilder::new("svc.Explosive")
        .classifier("explosive")
        .build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .classifiers(classifiers)
        .build();

    let outcome = std::panic::AssertUnwindSafe(
        exec.do_value(&CallContext::new(), "svc.Explosive", |_ctx| async { Ok(0u8) }),
    )
    .catch_unwind()
    .await;
    assert!(outcome.is_err(), "expected the classifier panic to propagate");
}

#[tokio::test(start_paused = true)]
async fn budget_releases_are_returned_on_every_path() {
    let conc = Arc::new(ConcurrencyLimitBudget::new(2));
    let budgets = Arc::new(BudgetRegistry::new());
    budgets.register("conc", conc.clone()).unwrap();

    let policy = PolicyBuilder::new("svc.Released")
        .max_attempts(1)
        .budget("conc")
        .hedge_max_attempts(1)
        .hedge_delay(Duration::from_millis(10))
        .hedge_budget("conc")
        .build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .budgets(budgets)
        .build();

    let result = exec
        .do_value(&CallContext::new(), "svc.Released", |actx| async move {
            if actx.info().is_hedge {
                Ok("hedge".to_string())
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                    _ = actx.cancelled() => {}
                }
                Ok("primary".to_string())
            }
        })
        .await;

    assert_eq!(result.unwrap(), "hedge");
    // Both the winner's and the canceled primary's admissions returned.
    assert_eq!(conc.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn observer_ordering_holds_across_retries() {
    let observer = Arc::new(TestObserver::default());
    let policy = PolicyBuilder::new("svc.Ordered")
        .max_attempts(3)
        .initial_backoff(Duration::from_millis(1))
        .jitter(JitterKind::None)
        .build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .observer(observer.clone())
        .build();

    let calls = Arc::new(AtomicU32::new(0));
    let op_calls = Arc::clone(&calls);
    let result = exec
        .do_value(&CallContext::new(), "svc.Ordered", move |_ctx| {
            let calls = Arc::clone(&op_calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 1 {
                    Err(boom())
                } else {
                    Ok(())
                }
            }
        })
        .await;
    assert!(result.is_ok());

    let events = observer.events();
    assert_eq!(events.first().map(String::as_str), Some("start"));
    assert_eq!(events.last().map(String::as_str), Some("success"));
    let terminals = events
        .iter()
        .filter(|e| *e == "success" || *e == "failure")
        .count();
    assert_eq!(terminals, 1);
    let last_attempt = events.iter().rposition(|e| e.starts_with("attempt:")).unwrap();
    let terminal = events.iter().position(|e| e == "success").unwrap();
    assert!(last_attempt < terminal, "attempt after terminal callback");
}

#[tokio::test]
async fn timeline_capture_and_suppression() {
    let policy = PolicyBuilder::new("svc.Captured").build();
    let exec = Executor::builder().provider(provider_with(policy)).build();

    let capture = TimelineCapture::new();
    let ctx = CallContext::new().with_timeline_capture(&capture);
    exec.do_value(&ctx, "svc.Captured", |_ctx| async { Ok(1u8) })
        .await
        .unwrap();
    let first = capture.timeline().expect("captured timeline");
    assert_eq!(first.key.to_string(), "svc.Captured");

    // A nested call with capture suppressed leaves the outer capture alone.
    let nested_ctx = ctx.clone().without_timeline_capture();
    exec.do_value(&nested_ctx, "svc.Other", |_ctx| async { Ok(2u8) })
        .await
        .unwrap();
    assert_eq!(
        capture.timeline().unwrap().key.to_string(),
        "svc.Captured"
    );
}

#[tokio::test]
async fn fast_path_still_feeds_latency_trackers() {
    let trackers = Arc::new(recourse_hedge::TrackerStore::new());
    let policy = PolicyBuilder::new("svc.Fast").build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .latency_trackers(trackers.clone())
        .build();

    // Noop observer and no capture: the record-free path.
    let result = exec
        .do_value(&CallContext::new(), "svc.Fast", |_ctx| async { Ok(5u64) })
        .await;
    assert_eq!(result.unwrap(), 5);

    let tracker = trackers.get(&PolicyKey::parse("svc.Fast")).unwrap();
    assert_eq!(tracker.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_trigger_falls_back_to_fixed_delay() {
    let policy = PolicyBuilder::new("svc.NoTrigger")
        .max_attempts(1)
        .hedge_max_attempts(1)
        .hedge_delay(Duration::from_millis(10))
        .hedge_trigger("missing")
        .build();
    let exec = Executor::builder().provider(provider_with(policy)).build();

    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.NoTrigger", |actx| async move {
            if actx.info().is_hedge {
                Ok("hedge".to_string())
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                    _ = actx.cancelled() => {}
                }
                Ok("primary".to_string())
            }
        })
        .await;

    assert_eq!(result.unwrap(), "hedge");
    let timeline = timeline.unwrap();
    assert_eq!(
        timeline.attributes.get("trigger_not_found").map(String::as_str),
        Some("missing")
    );
}

#[tokio::test(start_paused = true)]
async fn missing_trigger_deny_mode_disables_hedging() {
    let policy = PolicyBuilder::new("svc.NoHedge")
        .max_attempts(1)
        .hedge_max_attempts(1)
        .hedge_delay(Duration::from_millis(10))
        .hedge_trigger("missing")
        .build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .missing_trigger_mode(FailureMode::Deny)
        .build();

    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.NoHedge", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok("primary".to_string())
        })
        .await;

    assert_eq!(result.unwrap(), "primary");
    let timeline = timeline.unwrap();
    assert_eq!(
        timeline.attributes.get("hedging_disabled").map(String::as_str),
        Some("true")
    );
    assert_eq!(timeline.attempts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn denied_hedge_does_not_affect_the_group() {
    let budgets = Arc::new(BudgetRegistry::new());
    budgets
        .register("empty", Arc::new(TokenBucketBudget::new(0, 0.0)))
        .unwrap();
    let policy = PolicyBuilder::new("svc.HedgeDenied")
        .max_attempts(1)
        .hedge_max_attempts(1)
        .hedge_delay(Duration::from_millis(10))
        .hedge_budget("empty")
        .build();
    let exec = Executor::builder()
        .provider(provider_with(policy))
        .budgets(budgets)
        .build();

    let (result, timeline) = exec
        .do_value_recorded(&CallContext::new(), "svc.HedgeDenied", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok("primary".to_string())
        })
        .await;

    assert_eq!(result.unwrap(), "primary");
    let timeline = timeline.unwrap();
    assert_eq!(timeline.attempts.len(), 2);
    let denied = timeline.attempts.iter().find(|a| a.is_hedge).unwrap();
    assert!(!denied.budget_allowed);
    assert_eq!(denied.outcome.reason, "budget_denied");
    assert!(timeline.succeeded());
}
