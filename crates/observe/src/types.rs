//! Attempt records, timelines, and budget decision events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use recourse_budget::AttemptKind;
use recourse_classify::Outcome;
use recourse_policy::PolicyKey;
use serde::{Serialize, Serializer};

/// Shared, cloneable view of an attempt's error.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

fn serialize_error<S: Serializer>(
    error: &Option<SharedError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

/// One launched-or-denied attempt, hedges and budget denials included.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// Retry group index (0-based).
    pub retry_index: u32,
    /// Global attempt index in launch order (0-based, strictly increasing).
    pub attempt: u64,
    /// Attempt start time.
    pub start: DateTime<Utc>,
    /// Attempt end time.
    pub end: DateTime<Utc>,
    /// Whether this attempt is a hedge.
    pub is_hedge: bool,
    /// Hedge index within the group; 0 is the primary.
    pub hedge_index: u32,
    /// Classification outcome.
    pub outcome: Outcome,
    /// Error returned by the attempt, if any.
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<SharedError>,
    /// Backoff slept before this attempt (primary attempts only).
    pub backoff: Duration,
    /// Whether budget gating allowed this attempt.
    pub budget_allowed: bool,
    /// Budget decision reason.
    pub budget_reason: String,
}

/// Admission mode a budget decision was made under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetMode {
    /// A registered budget decided.
    Standard,
    /// Allowed without consulting a budget (none configured).
    Allow,
    /// Denied without consulting a budget (panic, deny mode).
    Deny,
    /// Allowed by fallback after a registry miss.
    Fallback,
    /// Allowed despite a condition that would normally deny.
    AllowUnsafe,
    /// Mode could not be determined.
    Unknown,
}

impl BudgetMode {
    /// Stable snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Fallback => "fallback",
            Self::AllowUnsafe => "allow_unsafe",
            Self::Unknown => "unknown",
        }
    }
}

/// A budget gating decision, as seen by observers.
#[derive(Debug, Clone)]
pub struct BudgetDecisionEvent {
    /// Policy key for the call.
    pub key: PolicyKey,
    /// Global attempt index being gated.
    pub attempt: u64,
    /// Retry or hedge attempt.
    pub kind: AttemptKind,
    /// Budget registry name; empty when none configured.
    pub budget_name: String,
    /// Units requested from the budget.
    pub cost: u32,
    /// Admission mode.
    pub mode: BudgetMode,
    /// Whether the attempt was allowed.
    pub allowed: bool,
    /// Decision reason.
    pub reason: String,
}

/// Structured record of one call and all of its attempts.
///
/// Created once per call, append-only while the call runs, finalized exactly
/// once when the call returns.
#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    /// Policy key for the call.
    pub key: PolicyKey,
    /// Policy identifier, when the policy carries one.
    pub policy_id: String,
    /// Call start time.
    pub start: DateTime<Utc>,
    /// Call end time.
    pub end: DateTime<Utc>,
    /// Call-level metadata: policy source, normalization notes, degradations.
    pub attributes: HashMap<String, String>,
    /// Per-attempt records in launch order.
    pub attempts: Vec<AttemptRecord>,
    /// Final error returned to the caller; `None` on success.
    #[serde(serialize_with = "serialize_error")]
    pub final_error: Option<SharedError>,
}

impl Timeline {
    /// Open a timeline at the given start time.
    pub fn new(key: PolicyKey, policy_id: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            key,
            policy_id: policy_id.into(),
            start,
            end: start,
            attributes: HashMap::new(),
            attempts: Vec::new(),
            final_error: None,
        }
    }

    /// Set a call-level attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Append an attempt record.
    pub fn push_attempt(&mut self, record: AttemptRecord) {
        self.attempts.push(record);
    }

    /// Close the timeline with its end time and final error.
    pub fn finalize(&mut self, end: DateTime<Utc>, final_error: Option<SharedError>) {
        self.end = end;
        self.final_error = final_error;
    }

    /// True when the call ended without a final error.
    pub fn succeeded(&self) -> bool {
        self.final_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_collects_attempts_and_attributes() {
        let start = Utc::now();
        let mut timeline = Timeline::new(PolicyKey::parse("svc.M"), "pol-1", start);
        timeline.set_attribute(crate::attrs::POLICY_SOURCE, "static");
        timeline.push_attempt(AttemptRecord {
            retry_index: 0,
            attempt: 0,
            start,
            end: start,
            is_hedge: false,
            hedge_index: 0,
            outcome: Outcome::success(),
            error: None,
            backoff: Duration::ZERO,
            budget_allowed: true,
            budget_reason: "allowed".to_string(),
        });
        timeline.finalize(start, None);

        assert!(timeline.succeeded());
        assert_eq!(timeline.attempts.len(), 1);
        assert_eq!(
            timeline.attributes.get("policy_source").map(String::as_str),
            Some("static")
        );
    }

    #[test]
    fn serialization_uses_stable_names_and_stringifies_errors() {
        let start = Utc::now();
        let mut timeline = Timeline::new(PolicyKey::parse("svc.M"), "", start);
        let boxed: Box<dyn std::error::Error + Send + Sync> = anyhow::anyhow!("boom").into();
        let err: SharedError = Arc::from(boxed);
        timeline.push_attempt(AttemptRecord {
            retry_index: 0,
            attempt: 0,
            start,
            end: start,
            is_hedge: true,
            hedge_index: 1,
            outcome: Outcome::retryable("default_retry"),
            error: Some(err.clone()),
            backoff: Duration::from_millis(10),
            budget_allowed: true,
            budget_reason: "allowed".to_string(),
        });
        timeline.finalize(start, Some(err));

        let json = serde_json::to_value(&timeline).unwrap();
        assert_eq!(json["final_error"], "boom");
        assert_eq!(json["attempts"][0]["is_hedge"], true);
        assert_eq!(json["attempts"][0]["hedge_index"], 1);
        assert_eq!(json["attempts"][0]["error"], "boom");
        assert_eq!(json["attempts"][0]["outcome"]["reason"], "default_retry");
    }

    #[test]
    fn budget_mode_labels() {
        assert_eq!(BudgetMode::Standard.as_str(), "standard");
        assert_eq!(BudgetMode::AllowUnsafe.as_str(), "allow_unsafe");
    }
}
