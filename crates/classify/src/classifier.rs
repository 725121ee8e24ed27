//! The classifier contract and the engine's default classifier.

use std::any::Any;

use crate::outcome::Outcome;
use crate::reasons;

/// Boxed error type returned by user operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Cancellation errors the engine substitutes for an attempt that lost the
/// race against its deadline or cancellation token.
///
/// These are the two standard cancellation errors: every classifier should
/// map them (and only them) to an abort, never to a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    /// The attempt's cancellation token fired.
    #[error("operation canceled")]
    Canceled,
    /// The attempt's deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Type-erased view of an attempt's value handed to a classifier.
#[derive(Clone, Copy)]
pub struct ClassifyValue<'a> {
    /// The value behind `dyn Any`; downcast to the expected concrete type.
    pub any: &'a dyn Any,
    /// Name of the concrete type, for `got_type` mismatch attributes.
    pub type_name: &'static str,
}

impl std::fmt::Debug for ClassifyValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifyValue")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Maps an attempt's `(value, error)` pair to an [`Outcome`].
///
/// Implementations must be cheap and must never block; the engine calls them
/// inline on the attempt path. A classifier handed a value or error type it
/// does not understand must return `NonRetryable` with reason
/// [`reasons::CLASSIFIER_TYPE_MISMATCH`], never `Retryable`.
pub trait Classifier: Send + Sync {
    /// Classify one attempt result.
    fn classify(&self, value: Option<ClassifyValue<'_>>, error: Option<&BoxError>) -> Outcome;
}

/// The engine's fallback classifier.
///
/// No error is success; the standard cancellation errors abort; everything
/// else is retryable with reason [`reasons::DEFAULT_RETRY`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl Classifier for DefaultClassifier {
    fn classify(&self, _value: Option<ClassifyValue<'_>>, error: Option<&BoxError>) -> Outcome {
        let Some(err) = error else {
            return Outcome::success();
        };

        if let Some(cancel) = err.downcast_ref::<CancelError>() {
            return match cancel {
                CancelError::Canceled => Outcome::abort(reasons::CTX_CANCELED),
                CancelError::DeadlineExceeded => Outcome::abort(reasons::DEADLINE_EXCEEDED),
            };
        }
        if err.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return Outcome::abort(reasons::DEADLINE_EXCEEDED);
        }

        Outcome::retryable(reasons::DEFAULT_RETRY)
    }
}
