//! Policy resolution interface for the recourse resilience runtime.
//!
//! The engine consumes policies through [`PolicyProvider`]; how policies are
//! fetched, cached, or refreshed is a provider concern. A provider that
//! fails may still hand back a last-known-good policy inside its error, and
//! the engine will run under it while annotating the timeline.

mod provider;

pub use provider::{PolicyProvider, ProviderError, ProviderErrorKind, StaticProvider};
