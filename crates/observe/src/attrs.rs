//! Stable timeline attribute keys.

/// Resolution source of the policy (`static`, `remote`, `lkg`, `default`).
pub const POLICY_SOURCE: &str = "policy_source";
/// Provider error kind when the policy came from a degraded path.
pub const POLICY_ERROR: &str = "policy_error";
/// Present and `"true"` when normalization changed the policy.
pub const POLICY_NORMALIZED: &str = "policy_normalized";
/// Comma-separated field paths normalization clamped.
pub const POLICY_CLAMPED_FIELDS: &str = "policy_clamped_fields";
/// Present and `"true"` when a budget denial stopped further retries.
pub const STOPPED_DUE_TO_BUDGET: &str = "stopped_due_to_budget";
/// Named classifier that was missing; the default classifier ran instead.
pub const CLASSIFIER_NOT_FOUND: &str = "classifier_not_found";
/// Named trigger that was missing.
pub const TRIGGER_NOT_FOUND: &str = "trigger_not_found";
/// Present and `"true"` when hedging was disabled for the call (probe calls,
/// trigger-miss deny mode).
pub const HEDGING_DISABLED: &str = "hedging_disabled";
