//! Attempt outcomes.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The four outcome classes, ordered here by fusion precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The attempt succeeded; its value is the call result.
    Success,
    /// The attempt failed transiently and may be retried.
    Retryable,
    /// The attempt failed permanently; retrying cannot help.
    NonRetryable,
    /// The call must stop immediately; never retried.
    Abort,
}

/// Classifier verdict for a single attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Outcome class.
    pub kind: OutcomeKind,
    /// Stable snake_case reason identifier.
    pub reason: String,
    /// Optional key/value detail (e.g. `expected_type` on a mismatch).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
    /// Retryable outcomes may ask for a longer sleep (e.g. `Retry-After`).
    /// The engine takes the per-group maximum, capped at the policy's
    /// `max_backoff`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_override: Option<Duration>,
}

impl Outcome {
    fn new(kind: OutcomeKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            attributes: HashMap::new(),
            backoff_override: None,
        }
    }

    /// Successful attempt.
    pub fn success() -> Self {
        Self::new(OutcomeKind::Success, "")
    }

    /// Transient failure with the given reason.
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Retryable, reason)
    }

    /// Permanent failure with the given reason.
    pub fn non_retryable(reason: impl Into<String>) -> Self {
        Self::new(OutcomeKind::NonRetryable, reason)
    }

    /// Terminal abort with the given reason.
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Abort, reason)
    }

    /// Attach a key/value attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Request a minimum backoff before the next retry group.
    pub fn with_backoff_override(mut self, d: Duration) -> Self {
        self.backoff_override = Some(d);
        self
    }

    /// True for `NonRetryable` and `Abort`.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self.kind, OutcomeKind::NonRetryable | OutcomeKind::Abort)
    }

    /// True for `Success`.
    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kind_and_reason() {
        assert_eq!(Outcome::success().kind, OutcomeKind::Success);
        let o = Outcome::retryable("default_retry");
        assert_eq!(o.kind, OutcomeKind::Retryable);
        assert_eq!(o.reason, "default_retry");
        assert!(Outcome::non_retryable("validation").is_terminal_failure());
        assert!(Outcome::abort("circuit_open").is_terminal_failure());
    }

    #[test]
    fn attributes_and_override() {
        let o = Outcome::retryable("http_429")
            .with_attribute("status", "429")
            .with_backoff_override(Duration::from_secs(1));
        assert_eq!(o.attributes.get("status").map(String::as_str), Some("429"));
        assert_eq!(o.backoff_override, Some(Duration::from_secs(1)));
    }

    #[test]
    fn serde_uses_snake_case_kinds() {
        let json = serde_json::to_string(&Outcome::non_retryable("validation")).unwrap();
        assert!(json.contains("\"non_retryable\""));
        assert!(json.contains("\"validation\""));
    }
}
