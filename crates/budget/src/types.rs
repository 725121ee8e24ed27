//! The budget contract.

use recourse_policy::{BudgetRef, PolicyKey};

/// The attempt type being gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptKind {
    /// A primary attempt or retry.
    Retry,
    /// A hedged attempt.
    Hedge,
}

impl AttemptKind {
    /// Stable snake_case label, used in budget events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Hedge => "hedge",
        }
    }
}

/// Returns an admission to its budget.
///
/// Released exactly once: either explicitly via [`Release::release`] or
/// implicitly on drop. The engine holds the guard for the lifetime of the
/// gated attempt, so cancellation and panics still release.
pub struct Release {
    action: Option<Box<dyn FnOnce() + Send>>,
}

impl Release {
    /// Wrap a release action.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// Release explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}

    fn run(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

impl Drop for Release {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Release {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Release")
            .field("pending", &self.action.is_some())
            .finish()
    }
}

/// The result of a budget check.
#[derive(Debug)]
pub struct Decision {
    /// Whether the attempt may run.
    pub allowed: bool,
    /// Stable reason identifier (see [`crate::reasons`]).
    pub reason: String,
    /// Optional guard that returns the admission when the attempt finishes.
    pub release: Option<Release>,
}

impl Decision {
    /// Admit the attempt.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            release: None,
        }
    }

    /// Admit the attempt with a release guard.
    pub fn allow_with_release(reason: impl Into<String>, release: Release) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            release: Some(release),
        }
    }

    /// Deny the attempt.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            release: None,
        }
    }
}

/// Gates attempts to prevent retry and hedge storms.
///
/// Implementations must be thread-safe and cheap; the engine consults the
/// budget inline before every attempt.
pub trait Budget: Send + Sync {
    /// Decide whether one attempt may run.
    fn allow_attempt(
        &self,
        key: &PolicyKey,
        attempt: usize,
        kind: AttemptKind,
        budget: &BudgetRef,
    ) -> Decision;
}
