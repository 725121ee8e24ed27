//! Outcome classification for the recourse resilience runtime.
//!
//! A classifier maps the `(value, error)` pair produced by one attempt to an
//! [`Outcome`] that tells the engine whether to stop, retry, or abort.

mod classifier;
mod http;
mod outcome;
mod registry;

pub mod reasons;

pub use classifier::{BoxError, CancelError, Classifier, ClassifyValue, DefaultClassifier};
pub use http::{HttpStatusClassifier, StatusResponse};
pub use outcome::{Outcome, OutcomeKind};
pub use registry::{ClassifierRegistry, RegistryError};
