//! Attempt identity visible to user operations.

/// Identifies the attempt an operation invocation belongs to.
///
/// Handed to the operation through its attempt context, so call sites can
/// log, tag spans, or make hedging-aware choices (e.g. only the primary
/// writes through a cache).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptInfo {
    /// Retry group index (0-based).
    pub retry_index: u32,
    /// Global attempt index in launch order (0-based).
    pub attempt: u64,
    /// Whether this invocation is a hedge.
    pub is_hedge: bool,
    /// Hedge index within the group; 0 is the primary.
    pub hedge_index: u32,
    /// Identifier of the policy the call runs under.
    pub policy_id: String,
}
