//! Hedge triggers and latency tracking for the recourse resilience runtime.
//!
//! A trigger decides *when* a retry group should spawn an additional parallel
//! attempt. Latency-aware triggers consume per-key latency snapshots from the
//! tracker store; the engine enforces the `max_hedges` cap either way.

mod registry;
mod tracker;
mod trigger;

pub mod reasons;

pub use registry::{RegistryError, TriggerRegistry};
pub use tracker::{
    LatencySnapshot, LatencyTracker, TrackerStore, DEFAULT_MAX_TRACKERS, DEFAULT_TRACKER_CAPACITY,
};
pub use trigger::{FixedDelayTrigger, HedgeState, Percentile, PercentileTrigger, Trigger};
