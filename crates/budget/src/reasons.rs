//! Stable reason identifiers for budget decisions.

/// The budget admitted the attempt.
pub const ALLOWED: &str = "allowed";
/// No budget is configured for this attempt kind.
pub const NO_BUDGET: &str = "no_budget";
/// The named budget was not found in the registry.
pub const BUDGET_NOT_FOUND: &str = "budget_not_found";
/// The budget denied the attempt.
pub const BUDGET_DENIED: &str = "budget_denied";
/// The budget panicked and the engine recovered it.
pub const PANIC_IN_BUDGET: &str = "panic_in_budget";
/// The executor was built without a budget registry.
pub const BUDGET_REGISTRY_NIL: &str = "budget_registry_nil";
