//! The retry group coordinator.
//!
//! A retry group runs one primary attempt and, when hedging is on, a spawner
//! task that launches parallel hedges. Every attempt runs in its own task
//! and reports over a bounded channel; the channel closing is the proof that
//! no attempt task is still alive, so the coordinator never leaks work.
//!
//! Cancellation is tagged (see [`crate::cancel`]): attempts that lose to a
//! winner or to a terminal sibling finish with `canceled_internal` outcomes
//! that are recorded but never influence the group verdict.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use recourse_budget::{AttemptKind, BudgetRegistry, Release};
use recourse_classify::{BoxError, CancelError, Classifier, ClassifyValue, Outcome, OutcomeKind};
use recourse_hedge::{HedgeState, LatencyTracker, Trigger};
use recourse_observe::{
    AttemptInfo, AttemptRecord, BudgetDecisionEvent, BudgetMode, Observer, SharedError,
};
use recourse_policy::{BudgetRef, EffectivePolicy, PolicyKey};

use crate::cancel::{CancelCause, GroupCancel};
use crate::clock::Clock;
use crate::context::AttemptContext;
use crate::error::{FailureMode, PanicError};
use crate::reasons;

/// Type-erased user operation.
pub(crate) type Operation<T> =
    Arc<dyn Fn(AttemptContext) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// Spawner re-evaluation floor when a trigger asks for an immediate or
/// unspecified next check. A trigger that names a concrete positive wait is
/// honored exactly.
const SPAWNER_FLOOR: Duration = Duration::from_millis(25);

/// Per-call constants shared by every group of the call.
pub(crate) struct GroupConfig<T> {
    pub key: PolicyKey,
    pub policy: EffectivePolicy,
    pub op: Operation<T>,
    pub classifier: Arc<dyn Classifier>,
    pub observer: Arc<dyn Observer>,
    pub clock: Arc<dyn Clock>,
    pub budgets: Option<Arc<BudgetRegistry>>,
    pub missing_budget_mode: FailureMode,
    pub recover_panics: bool,
    pub recording: bool,
    /// `None` disables hedging for this call (policy, probe, or deny mode).
    pub trigger: Option<Arc<dyn Trigger>>,
    pub tracker: Option<Arc<LatencyTracker>>,
    pub attempt_counter: AtomicU64,
    pub call_start: Instant,
}

impl<T> GroupConfig<T> {
    fn max_hedges(&self) -> u32 {
        if self.trigger.is_some() && self.policy.hedge.enabled {
            self.policy.hedge.max_hedges
        } else {
            0
        }
    }
}

/// What one attempt reported back to the coordinator.
pub(crate) struct AttemptOutput<T> {
    attempt: u64,
    is_hedge: bool,
    /// True for real attempts (they count toward the in-flight tally);
    /// false for synthetic messages such as a trigger panic.
    counts: bool,
    denied: bool,
    internal_canceled: bool,
    outcome: Outcome,
    value: Option<T>,
    error: Option<SharedError>,
    elapsed: Duration,
    panic_error: Option<PanicError>,
    propagate: Option<Box<dyn Any + Send>>,
    record: Option<AttemptRecord>,
}

/// The collapsed result of one retry group.
pub(crate) enum GroupVerdict<T> {
    /// An attempt succeeded; the group result is its value.
    Success { value: T },
    /// The group failed terminally.
    Terminal {
        error: Option<SharedError>,
        outcome: Outcome,
        /// The group's primary attempt was denied by its budget.
        primary_denied: bool,
        /// A recovered collaborator panic to surface as the call error.
        panic_error: Option<PanicError>,
    },
    /// The group failed but may be retried.
    Retryable {
        error: Option<SharedError>,
        outcome: Outcome,
        /// Largest `backoff_override` among the group's retryable outcomes.
        max_override: Option<Duration>,
    },
    /// The caller's cancellation or the overall deadline ended the group.
    Interrupted { deadline: bool },
    /// An unrecovered panic to resume on the caller after cleanup.
    Propagate(Box<dyn Any + Send>),
}

/// Execute one retry group and collapse it to a verdict.
///
/// Appends attempt records (hedges and denials included) to `records` in
/// completion order; the executor sorts by attempt index at finalization.
pub(crate) async fn run_group<T: Send + 'static>(
    cfg: &Arc<GroupConfig<T>>,
    retry_index: u32,
    backoff: Duration,
    call_token: &CancellationToken,
    external: &CancellationToken,
    deadline: Option<Instant>,
    records: &mut Vec<AttemptRecord>,
) -> GroupVerdict<T> {
    if cfg.max_hedges() == 0 {
        run_single(cfg, retry_index, backoff, call_token, external, deadline, records).await
    } else {
        run_hedged(cfg, retry_index, backoff, call_token, external, deadline, records).await
    }
}

/// The degenerate path: hedging disabled, one attempt awaited inline, no
/// spawner and no channel.
async fn run_single<T: Send + 'static>(
    cfg: &Arc<GroupConfig<T>>,
    retry_index: u32,
    backoff: Duration,
    call_token: &CancellationToken,
    external: &CancellationToken,
    deadline: Option<Instant>,
    records: &mut Vec<AttemptRecord>,
) -> GroupVerdict<T> {
    let cancel = Arc::new(GroupCancel::child_of(call_token));
    let attempt = cfg.attempt_counter.fetch_add(1, Ordering::SeqCst);

    let attempt_fut = run_attempt(Arc::clone(cfg), Arc::clone(&cancel), retry_index, attempt, 0, backoff);
    tokio::pin!(attempt_fut);

    let deadline_sleep = sleep_until_opt(deadline);
    tokio::pin!(deadline_sleep);

    let mut deadline_fired = false;
    let mut out = loop {
        tokio::select! {
            out = &mut attempt_fut => break out,
            _ = &mut deadline_sleep, if !deadline_fired => {
                deadline_fired = true;
                cancel.cancel(CancelCause::CtxCanceled);
            }
        }
    };

    if let Some(record) = out.record.take() {
        records.push(record);
    }
    if let Some(payload) = out.propagate.take() {
        return GroupVerdict::Propagate(payload);
    }
    if out.outcome.is_success() {
        if let Some(tracker) = &cfg.tracker {
            tracker.observe(out.elapsed);
        }
    }
    // The caller's verdict is authoritative: a success that slipped out
    // during the cancellation window does not override it.
    if deadline_fired {
        return GroupVerdict::Interrupted { deadline: true };
    }
    if external.is_cancelled() {
        return GroupVerdict::Interrupted { deadline: false };
    }
    if out.outcome.is_success() {
        if let Some(value) = out.value.take() {
            return GroupVerdict::Success { value };
        }
    }

    let max_override = out.outcome.backoff_override;
    match out.outcome.kind {
        OutcomeKind::Retryable => GroupVerdict::Retryable {
            error: out.error,
            outcome: out.outcome,
            max_override,
        },
        _ => GroupVerdict::Terminal {
            error: out.error,
            outcome: out.outcome,
            primary_denied: out.denied,
            panic_error: out.panic_error,
        },
    }
}

/// The hedged path: primary plus spawner, fused over a bounded channel.
async fn run_hedged<T: Send + 'static>(
    cfg: &Arc<GroupConfig<T>>,
    retry_index: u32,
    backoff: Duration,
    call_token: &CancellationToken,
    external: &CancellationToken,
    deadline: Option<Instant>,
    records: &mut Vec<AttemptRecord>,
) -> GroupVerdict<T> {
    let max_hedges = cfg.max_hedges();
    let cancel = Arc::new(GroupCancel::child_of(call_token));
    let spawn_stop = CancellationToken::new();
    let launched = Arc::new(AtomicUsize::new(0));
    let group_start = Instant::now();

    // Every sender sends at most once; +1 slack for a trigger panic message.
    let (tx, mut rx) = mpsc::channel::<AttemptOutput<T>>(2 + max_hedges as usize);

    launch(cfg, &cancel, &tx, &launched, retry_index, 0, backoff);

    let trigger = cfg.trigger.clone().expect("hedged path requires a trigger");
    let spawner_handle = tokio::spawn(spawner(
        Arc::clone(cfg),
        Arc::clone(&cancel),
        spawn_stop.clone(),
        tx.clone(),
        Arc::clone(&launched),
        retry_index,
        group_start,
        trigger,
    ));
    drop(tx);

    let deadline_sleep = sleep_until_opt(deadline);
    tokio::pin!(deadline_sleep);

    let mut received = 0usize;
    let mut winner: Option<T> = None;
    let mut best: Option<BestFailure> = None;
    let mut primary_denied = false;
    let mut max_override: Option<Duration> = None;
    let mut propagate: Option<Box<dyn Any + Send>> = None;
    let mut deadline_fired = false;

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(mut out) = msg else { break };
                if let Some(record) = out.record.take() {
                    records.push(record);
                }
                if out.counts {
                    received += 1;
                }
                if let Some(payload) = out.propagate.take() {
                    if propagate.is_none() {
                        propagate = Some(payload);
                    }
                    cancel.cancel(CancelCause::Terminal);
                } else {
                    fuse(
                        cfg, out, &cancel, &spawn_stop, &mut winner, &mut best,
                        &mut primary_denied, &mut max_override,
                        deadline_fired || external.is_cancelled(),
                    );
                }
                // All launched attempts have reported and nothing won: stop
                // the spawner and wind the group down instead of waiting for
                // a future hedge. A failed group retries; it does not hedge.
                if winner.is_none()
                    && propagate.is_none()
                    && received >= launched.load(Ordering::SeqCst)
                {
                    cancel.cancel(CancelCause::Terminal);
                }
            }
            _ = &mut deadline_sleep, if !deadline_fired => {
                deadline_fired = true;
                cancel.cancel(CancelCause::CtxCanceled);
            }
        }
    }

    // The spawner exits on group cancel or its hedge cap; the channel above
    // only closed because it (and every attempt task) is done.
    let _ = spawner_handle.await;

    if let Some(payload) = propagate {
        return GroupVerdict::Propagate(payload);
    }
    if let Some(value) = winner {
        return GroupVerdict::Success { value };
    }
    if deadline_fired {
        return GroupVerdict::Interrupted { deadline: true };
    }
    if external.is_cancelled() {
        return GroupVerdict::Interrupted { deadline: false };
    }
    match best {
        Some(best) if best.outcome.kind == OutcomeKind::Retryable => GroupVerdict::Retryable {
            error: best.error,
            outcome: best.outcome,
            max_override,
        },
        Some(best) => GroupVerdict::Terminal {
            error: best.error,
            outcome: best.outcome,
            primary_denied,
            panic_error: best.panic_error,
        },
        // Every output was an internal cancel with no winner; only an
        // external race can produce this.
        None => GroupVerdict::Interrupted { deadline: false },
    }
}

struct BestFailure {
    rank: u8,
    outcome: Outcome,
    error: Option<SharedError>,
    panic_error: Option<PanicError>,
}

/// Fold one attempt output into the group's fusion state.
#[allow(clippy::too_many_arguments)]
fn fuse<T>(
    cfg: &GroupConfig<T>,
    mut out: AttemptOutput<T>,
    cancel: &GroupCancel,
    spawn_stop: &CancellationToken,
    winner: &mut Option<T>,
    best: &mut Option<BestFailure>,
    primary_denied: &mut bool,
    max_override: &mut Option<Duration>,
    external_abort: bool,
) {
    // Internal-cancel outcomes are recorded but never influence the verdict.
    if out.internal_canceled {
        return;
    }

    if out.outcome.is_success() {
        if out.counts {
            if let Some(tracker) = &cfg.tracker {
                tracker.observe(out.elapsed);
            }
        }
        // Once the caller is gone or the group was terminally canceled the
        // verdict stands; a success that slips out during the cancellation
        // window is recorded but cannot win.
        let terminal_issued = matches!(cancel.cause(), Some(CancelCause::Terminal));
        if winner.is_none() && !external_abort && !terminal_issued {
            *winner = out.value.take();
            cancel.cancel(CancelCause::Winner);
        }
        return;
    }

    if external_abort {
        return;
    }

    // A denied hedge is recorded but does not affect the group outcome.
    if out.denied && out.is_hedge {
        return;
    }
    if out.denied && !out.is_hedge {
        *primary_denied = true;
    }

    if out.outcome.kind == OutcomeKind::Retryable {
        if let Some(over) = out.outcome.backoff_override {
            *max_override = Some(max_override.map_or(over, |m| m.max(over)));
        }
    }

    let rank = match out.outcome.kind {
        OutcomeKind::NonRetryable => 3,
        OutcomeKind::Abort => 2,
        OutcomeKind::Retryable => 1,
        OutcomeKind::Success => unreachable!("success handled above"),
    };
    if best.as_ref().map_or(true, |b| rank > b.rank) {
        *best = Some(BestFailure {
            rank,
            outcome: out.outcome.clone(),
            error: out.error.take(),
            panic_error: out.panic_error.take(),
        });
    }

    if out.outcome.is_terminal_failure() {
        if cfg.policy.hedge.cancel_on_first_terminal {
            cancel.cancel(CancelCause::Terminal);
        } else {
            // Stop spawning new hedges but let in-flight attempts finish so
            // a late success can still win.
            spawn_stop.cancel();
        }
    }
}

/// Launch one attempt task. The launched counter increments before the
/// spawn so the coordinator's in-flight arithmetic never undercounts.
fn launch<T: Send + 'static>(
    cfg: &Arc<GroupConfig<T>>,
    cancel: &Arc<GroupCancel>,
    tx: &mpsc::Sender<AttemptOutput<T>>,
    launched: &Arc<AtomicUsize>,
    retry_index: u32,
    hedge_index: u32,
    backoff: Duration,
) {
    launched.fetch_add(1, Ordering::SeqCst);
    let attempt = cfg.attempt_counter.fetch_add(1, Ordering::SeqCst);
    let cfg = Arc::clone(cfg);
    let cancel = Arc::clone(cancel);
    let tx = tx.clone();
    tokio::spawn(async move {
        let out = run_attempt(cfg, cancel, retry_index, attempt, hedge_index, backoff).await;
        let _ = tx.send(out).await;
    });
}

/// The hedge spawner: a single task that re-evaluates the trigger on a
/// resettable timer and launches hedges until the cap or the group ends.
#[allow(clippy::too_many_arguments)]
async fn spawner<T: Send + 'static>(
    cfg: Arc<GroupConfig<T>>,
    cancel: Arc<GroupCancel>,
    spawn_stop: CancellationToken,
    tx: mpsc::Sender<AttemptOutput<T>>,
    launched: Arc<AtomicUsize>,
    retry_index: u32,
    group_start: Instant,
    trigger: Arc<dyn Trigger>,
) {
    let max_hedges = cfg.max_hedges();
    let mut hedges = 0u32;

    loop {
        let state = HedgeState {
            call_elapsed: cfg.call_start.elapsed(),
            attempt_elapsed: group_start.elapsed(),
            attempts_launched: launched.load(Ordering::SeqCst),
            max_hedges: max_hedges as usize,
            latency: cfg.tracker.as_ref().and_then(|t| t.snapshot()),
        };

        let decision =
            std::panic::catch_unwind(AssertUnwindSafe(|| trigger.should_spawn_hedge(&state)));
        let (should, next_check) = match decision {
            Ok(decision) => decision,
            Err(payload) => {
                let out = trigger_panic_output(&cfg, payload);
                let _ = tx.send(out).await;
                return;
            }
        };

        if should && hedges < max_hedges {
            hedges += 1;
            launch(&cfg, &cancel, &tx, &launched, retry_index, hedges, Duration::ZERO);
        }
        if hedges >= max_hedges {
            return;
        }

        let wait = if next_check.is_zero() { SPAWNER_FLOOR } else { next_check };
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.token().cancelled() => return,
            _ = spawn_stop.cancelled() => return,
        }
    }
}

/// Synthetic output for a panicking trigger: aborts the group under
/// `recover_panics`, propagates otherwise.
fn trigger_panic_output<T>(
    cfg: &GroupConfig<T>,
    payload: Box<dyn Any + Send>,
) -> AttemptOutput<T> {
    let (panic_error, propagate) = if cfg.recover_panics {
        (
            Some(PanicError::from_payload("trigger", payload.as_ref())),
            None,
        )
    } else {
        (None, Some(payload))
    };
    AttemptOutput {
        attempt: u64::MAX,
        is_hedge: true,
        counts: false,
        denied: false,
        internal_canceled: false,
        outcome: Outcome::abort(recourse_hedge::reasons::PANIC_IN_TRIGGER),
        value: None,
        error: None,
        elapsed: Duration::ZERO,
        panic_error,
        propagate,
        record: None,
    }
}

/// How the raced attempt future ended.
enum AttemptEnd<T> {
    Op(Result<T, BoxError>),
    OpPanicked(Box<dyn Any + Send>),
    Canceled,
    TimedOut,
}

/// Run one attempt end to end: budget gate, context derivation, operation,
/// classification, recording, release.
async fn run_attempt<T: Send + 'static>(
    cfg: Arc<GroupConfig<T>>,
    cancel: Arc<GroupCancel>,
    retry_index: u32,
    attempt: u64,
    hedge_index: u32,
    backoff: Duration,
) -> AttemptOutput<T> {
    let is_hedge = hedge_index > 0;
    let start_wall = cfg.clock.now();
    let started = Instant::now();
    let kind = if is_hedge { AttemptKind::Hedge } else { AttemptKind::Retry };
    let budget_ref = if is_hedge {
        &cfg.policy.hedge.budget
    } else {
        &cfg.policy.retry.budget
    };
    let record_backoff = if is_hedge { Duration::ZERO } else { backoff };

    // 1. Budget gate. Denied attempts never invoke the operation.
    let gate = gate_budget(&cfg, attempt, kind, budget_ref);
    if let Some(payload) = gate.propagate {
        return AttemptOutput {
            attempt,
            is_hedge,
            counts: true,
            denied: false,
            internal_canceled: false,
            outcome: Outcome::abort(recourse_budget::reasons::PANIC_IN_BUDGET),
            value: None,
            error: None,
            elapsed: started.elapsed(),
            panic_error: None,
            propagate: Some(payload),
            record: None,
        };
    }
    if cfg.recording {
        cfg.observer.on_budget_decision(&BudgetDecisionEvent {
            key: cfg.key.clone(),
            attempt,
            kind,
            budget_name: budget_ref.name.clone(),
            cost: budget_ref.cost.max(1),
            mode: gate.mode,
            allowed: gate.allowed,
            reason: gate.reason.clone(),
        });
    }
    if !gate.allowed {
        let outcome = Outcome::abort(gate.reason.clone());
        let end_wall = cfg.clock.now();
        let record = cfg.recording.then(|| AttemptRecord {
            retry_index,
            attempt,
            start: start_wall,
            end: end_wall,
            is_hedge,
            hedge_index,
            outcome: outcome.clone(),
            error: None,
            backoff: record_backoff,
            budget_allowed: false,
            budget_reason: gate.reason.clone(),
        });
        if let Some(record) = &record {
            cfg.observer.on_attempt(&cfg.key, record);
        }
        return AttemptOutput {
            attempt,
            is_hedge,
            counts: true,
            denied: true,
            internal_canceled: false,
            outcome,
            value: None,
            error: None,
            elapsed: started.elapsed(),
            panic_error: gate.panic_error,
            propagate: None,
            record,
        };
    }
    let release: Option<Release> = gate.release;

    if is_hedge && cfg.recording {
        cfg.observer.on_hedge_spawn(
            &cfg.key,
            &AttemptRecord {
                retry_index,
                attempt,
                start: start_wall,
                end: start_wall,
                is_hedge,
                hedge_index,
                outcome: Outcome::success(),
                error: None,
                backoff: Duration::ZERO,
                budget_allowed: true,
                budget_reason: gate.reason.clone(),
            },
        );
    }

    // 2-4. Derive the attempt context and race the operation against the
    // group token and the per-attempt deadline. Losing drops the operation
    // future: true cancellation, not advisory.
    let token = cancel.token().child_token();
    let timeout = cfg.policy.retry.timeout_per_attempt;
    let attempt_deadline = (!timeout.is_zero()).then(|| started + timeout);
    let actx = AttemptContext {
        cancel: token.clone(),
        deadline: attempt_deadline,
        info: AttemptInfo {
            retry_index,
            attempt,
            is_hedge,
            hedge_index,
            policy_id: cfg.policy.id.clone(),
        },
    };

    let end = {
        let op_fut = AssertUnwindSafe((cfg.op)(actx)).catch_unwind();
        tokio::pin!(op_fut);
        let timeout_sleep = sleep_until_opt(attempt_deadline);
        tokio::pin!(timeout_sleep);
        tokio::select! {
            res = &mut op_fut => match res {
                Ok(result) => AttemptEnd::Op(result),
                Err(payload) => AttemptEnd::OpPanicked(payload),
            },
            _ = token.cancelled() => AttemptEnd::Canceled,
            _ = &mut timeout_sleep => AttemptEnd::TimedOut,
        }
    };
    let elapsed = started.elapsed();
    let end_wall = cfg.clock.now();

    if let AttemptEnd::OpPanicked(payload) = end {
        drop(release);
        return AttemptOutput {
            attempt,
            is_hedge,
            counts: true,
            denied: false,
            internal_canceled: false,
            outcome: Outcome::abort("panic"),
            value: None,
            error: None,
            elapsed,
            panic_error: None,
            propagate: Some(payload),
            record: None,
        };
    }

    let token_canceled = matches!(end, AttemptEnd::Canceled);
    let (value, error): (Option<T>, Option<BoxError>) = match end {
        AttemptEnd::Op(Ok(value)) => (Some(value), None),
        AttemptEnd::Op(Err(err)) => (None, Some(err)),
        AttemptEnd::Canceled => (None, Some(Box::new(CancelError::Canceled))),
        AttemptEnd::TimedOut => (None, Some(Box::new(CancelError::DeadlineExceeded))),
        AttemptEnd::OpPanicked(_) => unreachable!("handled above"),
    };

    // 5. Distinguish engine-internal cancellation from the caller's.
    let internal_cause = if token_canceled {
        match cancel.cause() {
            Some(cause @ (CancelCause::Winner | CancelCause::Terminal)) => Some(cause),
            _ => None,
        }
    } else {
        None
    };
    let internal_canceled = internal_cause.is_some();

    // 6. Classify, with panic recovery around the classifier.
    let mut panic_error: Option<PanicError> = None;
    let mut propagate: Option<Box<dyn Any + Send>> = None;
    let outcome = if internal_canceled {
        Outcome::abort(reasons::CANCELED_INTERNAL)
    } else {
        let classify_value = value.as_ref().map(|v| ClassifyValue {
            any: v as &dyn Any,
            type_name: std::any::type_name::<T>(),
        });
        match std::panic::catch_unwind(AssertUnwindSafe(|| {
            cfg.classifier.classify(classify_value, error.as_ref())
        })) {
            Ok(outcome) => outcome,
            Err(payload) => {
                if cfg.recover_panics {
                    panic_error = Some(PanicError::from_payload("classifier", payload.as_ref()));
                    Outcome::abort(recourse_classify::reasons::PANIC_IN_CLASSIFIER)
                } else {
                    propagate = Some(payload);
                    Outcome::abort(recourse_classify::reasons::PANIC_IN_CLASSIFIER)
                }
            }
        }
    };

    let shared_error: Option<SharedError> = error.map(SharedError::from);

    // 7. Record, then release the budget admission.
    let record = cfg.recording.then(|| AttemptRecord {
        retry_index,
        attempt,
        start: start_wall,
        end: end_wall,
        is_hedge,
        hedge_index,
        outcome: outcome.clone(),
        error: shared_error.clone(),
        backoff: record_backoff,
        budget_allowed: true,
        budget_reason: gate.reason.clone(),
    });
    if let Some(record) = &record {
        if let Some(cause) = internal_cause {
            cfg.observer.on_hedge_cancel(&cfg.key, record, cause.as_str());
        }
        cfg.observer.on_attempt(&cfg.key, record);
    }
    drop(release);

    AttemptOutput {
        attempt,
        is_hedge,
        counts: true,
        denied: false,
        internal_canceled,
        outcome,
        value,
        error: shared_error,
        elapsed,
        panic_error,
        propagate,
        record,
    }
}

struct BudgetGate {
    allowed: bool,
    reason: String,
    mode: BudgetMode,
    release: Option<Release>,
    panic_error: Option<PanicError>,
    propagate: Option<Box<dyn Any + Send>>,
}

impl BudgetGate {
    fn allow(reason: &str, mode: BudgetMode) -> Self {
        Self {
            allowed: true,
            reason: reason.to_string(),
            mode,
            release: None,
            panic_error: None,
            propagate: None,
        }
    }

    fn deny(reason: &str, mode: BudgetMode) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
            mode,
            release: None,
            panic_error: None,
            propagate: None,
        }
    }
}

/// Resolve and consult the budget for one attempt.
fn gate_budget<T>(
    cfg: &GroupConfig<T>,
    attempt: u64,
    kind: AttemptKind,
    budget_ref: &BudgetRef,
) -> BudgetGate {
    use recourse_budget::reasons as br;

    let name = budget_ref.name.trim();
    if name.is_empty() {
        return BudgetGate::allow(br::NO_BUDGET, BudgetMode::Allow);
    }
    let Some(registry) = &cfg.budgets else {
        return BudgetGate::allow(br::BUDGET_REGISTRY_NIL, BudgetMode::Allow);
    };
    let Some(budget) = registry.get(name) else {
        return match cfg.missing_budget_mode {
            FailureMode::Fallback | FailureMode::Allow => {
                BudgetGate::allow(br::BUDGET_NOT_FOUND, BudgetMode::Fallback)
            }
            FailureMode::Deny => BudgetGate::deny(br::BUDGET_NOT_FOUND, BudgetMode::Deny),
        };
    };

    match std::panic::catch_unwind(AssertUnwindSafe(|| {
        budget.allow_attempt(&cfg.key, attempt as usize, kind, budget_ref)
    })) {
        Ok(decision) => BudgetGate {
            allowed: decision.allowed,
            reason: decision.reason,
            mode: BudgetMode::Standard,
            release: decision.release,
            panic_error: None,
            propagate: None,
        },
        Err(payload) => {
            if cfg.recover_panics {
                let mut gate = BudgetGate::deny(br::PANIC_IN_BUDGET, BudgetMode::Deny);
                gate.panic_error = Some(PanicError::from_payload("budget", payload.as_ref()));
                gate
            } else {
                let mut gate = BudgetGate::deny(br::PANIC_IN_BUDGET, BudgetMode::Deny);
                gate.propagate = Some(payload);
                gate
            }
        }
    }
}

/// Sleep until an optional deadline; pends forever when there is none.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}
