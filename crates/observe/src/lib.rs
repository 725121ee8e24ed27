//! Observability surface of the recourse resilience runtime.
//!
//! Every call produces a [`Timeline`]: the call-level record of policy
//! resolution, each attempt (hedges and budget denials included), and the
//! final verdict. Observers receive lifecycle callbacks as the call runs;
//! a [`TimelineCapture`] lets a caller grab the finished timeline without
//! writing an observer.

mod capture;
mod info;
mod observer;
mod types;

pub mod attrs;

pub use capture::TimelineCapture;
pub use info::AttemptInfo;
pub use observer::{NoopObserver, Observer, TracingObserver};
pub use types::{AttemptRecord, BudgetDecisionEvent, BudgetMode, SharedError, Timeline};
