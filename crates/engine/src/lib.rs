//! Execution engine of the recourse resilience runtime.
//!
//! Given a resolved policy and a user operation, the engine drives retries,
//! hedging, budgets, circuit breakers, classification, cancellation, and
//! timeline emission. Calls enter through [`Executor::do_value`] /
//! [`Executor::do_call`]; everything else in this crate exists to make those
//! two functions keep their ordering, leak-freedom, and failure-semantics
//! guarantees.

mod backoff;
mod cancel;
#[cfg(test)]
mod executor_tests;
mod clock;
mod context;
mod error;
mod executor;
mod group;

pub mod reasons;

pub use clock::{Clock, SystemClock};
pub use context::{AttemptContext, CallContext};
pub use error::{CallError, FailureMode, PanicError};
pub use executor::{Executor, ExecutorBuilder};
