//! Stable reason identifiers for hedging.

/// A named trigger was not found in the registry.
pub const TRIGGER_NOT_FOUND: &str = "trigger_not_found";
/// A trigger miss under deny mode disabled hedging for the call.
pub const TRIGGER_MISSING_DISABLE_HEDGING: &str = "trigger_missing_disable_hedging";
/// A trigger panicked and the engine recovered it.
pub const PANIC_IN_TRIGGER: &str = "panic_in_trigger";
