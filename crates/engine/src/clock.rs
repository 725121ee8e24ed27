//! Wall-clock abstraction.

use chrono::{DateTime, Utc};

/// Source of wall-clock timestamps for timelines and attempt records.
///
/// Interval measurement (backoff, deadlines, latency) uses the tokio clock
/// and is controlled in tests with `tokio::time::pause`; this trait only
/// covers the wall timestamps stamped onto records.
pub trait Clock: Send + Sync {
    /// The current wall time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
