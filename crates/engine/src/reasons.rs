//! Stable reason identifiers owned by the engine itself.

/// An attempt was canceled because a sibling won the group.
pub const WINNER: &str = "winner";
/// An attempt was canceled because a sibling failed terminally.
pub const TERMINAL: &str = "terminal";
/// Outcome reason for attempts the engine canceled internally; these
/// outcomes never influence group fusion.
pub const CANCELED_INTERNAL: &str = "canceled_internal";
/// Policy resolution fell back to the default policy.
pub const POLICY_FALLBACK: &str = "policy_fallback";
/// No usable policy under deny mode.
pub const NO_POLICY: &str = "no_policy";
/// Policy resolution failed.
pub const POLICY_ERROR: &str = "policy_error";
