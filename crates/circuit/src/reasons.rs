//! Stable reason identifiers for circuit decisions.

/// The circuit is open; the call was denied without an attempt.
pub const CIRCUIT_OPEN: &str = "circuit_open";
/// The circuit is half-open and all probe slots are taken.
pub const CIRCUIT_PROBES_EXHAUSTED: &str = "circuit_probes_exhausted";
