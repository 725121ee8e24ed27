//! Typed errors returned by the engine.

use recourse_circuit::CircuitOpenError;
use recourse_observe::SharedError;
use recourse_policy::{NormalizeError, PolicyKey};

/// What to do when a named collaborator (policy, classifier, budget,
/// trigger) cannot be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureMode {
    /// Substitute the engine default and annotate the timeline.
    #[default]
    Fallback,
    /// Proceed without the collaborator.
    Allow,
    /// Fail the call fast.
    Deny,
}

/// A panic recovered from a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("panic in {component}: {message}")]
pub struct PanicError {
    /// Which collaborator panicked: `policy_provider`, `classifier`,
    /// `budget`, `trigger`, or `observer`.
    pub component: &'static str,
    /// Stringified panic payload.
    pub message: String,
}

impl PanicError {
    /// Build from a caught panic payload.
    pub fn from_payload(component: &'static str, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { component, message }
    }
}

/// The error a call fails with.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The last real attempt's error, for retry exhaustion and terminal
    /// failures.
    #[error("{0}")]
    Operation(SharedError),

    /// An attempt produced no error but its outcome was a terminal failure
    /// (e.g. a classifier rejected the value).
    #[error("attempt rejected: {reason}")]
    Rejected {
        /// Outcome reason of the rejecting classification.
        reason: String,
    },

    /// The circuit denied the call before any attempt ran.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// No usable policy under deny mode.
    #[error("no usable policy for {key}")]
    NoPolicy {
        /// Key that failed to resolve.
        key: PolicyKey,
        /// The provider error, or the recovered provider panic.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The resolved policy could not be normalized, under deny mode.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// A named classifier was missing under deny mode.
    #[error("classifier {name:?} not registered")]
    ClassifierNotFound {
        /// The missing classifier name.
        name: String,
    },

    /// The caller's cancellation fired.
    #[error("call canceled")]
    Canceled,

    /// The policy's overall timeout elapsed.
    #[error("overall deadline exceeded")]
    DeadlineExceeded,

    /// The first attempt of the call was denied by its budget.
    #[error("attempt denied by budget: {reason}")]
    BudgetDenied {
        /// Budget decision reason.
        reason: String,
    },

    /// A collaborator panicked and `recover_panics` converted it.
    #[error(transparent)]
    Panic(#[from] PanicError),
}

impl CallError {
    /// The underlying operation error, when this is an attempt failure.
    pub fn operation_error(&self) -> Option<&SharedError> {
        match self {
            Self::Operation(err) => Some(err),
            _ => None,
        }
    }

    /// True when the call failed because the caller canceled it.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Shared-error view for timeline finalization.
    pub(crate) fn to_shared(&self) -> SharedError {
        match self {
            Self::Operation(err) => err.clone(),
            other => {
                let boxed: Box<dyn std::error::Error + Send + Sync> =
                    Box::new(FinalError(other.to_string()));
                boxed.into()
            }
        }
    }
}

/// String snapshot of a call error, stored on timelines for variants that
/// are not themselves shareable.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
struct FinalError(String);
