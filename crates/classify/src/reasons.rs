//! Stable reason identifiers produced by the classification layer.
//!
//! These strings are part of the public surface: observers and timeline
//! consumers match on them.

/// Default classifier's reason for an unrecognized error.
pub const DEFAULT_RETRY: &str = "default_retry";
/// The value or error type did not match the classifier's expected shape.
pub const CLASSIFIER_TYPE_MISMATCH: &str = "classifier_type_mismatch";
/// A named classifier was not found in the registry.
pub const CLASSIFIER_NOT_FOUND: &str = "classifier_not_found";
/// A classifier panicked and the engine recovered it.
pub const PANIC_IN_CLASSIFIER: &str = "panic_in_classifier";
/// The caller's cancellation fired.
pub const CTX_CANCELED: &str = "ctx_canceled";
/// A per-attempt or overall deadline fired.
pub const DEADLINE_EXCEEDED: &str = "deadline_exceeded";
