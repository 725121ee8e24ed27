//! Per-key rolling latency samples.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use recourse_policy::PolicyKey;
use tracing::warn;

/// Default ring capacity per key.
pub const DEFAULT_TRACKER_CAPACITY: usize = 256;

/// Default bound on tracked keys.
pub const DEFAULT_MAX_TRACKERS: usize = 1024;

/// Approximate percentiles over the tracked window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySnapshot {
    /// Median latency.
    pub p50: Duration,
    /// 90th percentile latency.
    pub p90: Duration,
    /// 95th percentile latency.
    pub p95: Duration,
    /// 99th percentile latency.
    pub p99: Duration,
    /// Samples currently in the window.
    pub sample_count: usize,
}

/// Fixed-capacity ring of latency samples for one key.
///
/// `observe` is O(1); `snapshot` sorts a copy of the window, so it runs only
/// during trigger evaluation, never on the attempt hot path.
pub struct LatencyTracker {
    inner: Mutex<Ring>,
}

struct Ring {
    samples: Vec<Duration>,
    capacity: usize,
    next: usize,
}

impl LatencyTracker {
    /// Create a tracker with the given ring capacity (min 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Ring {
                samples: Vec::with_capacity(capacity),
                capacity,
                next: 0,
            }),
        }
    }

    /// Record one latency sample, overwriting the oldest once full.
    pub fn observe(&self, latency: Duration) {
        let mut ring = self.inner.lock().expect("latency tracker lock poisoned");
        if ring.samples.len() < ring.capacity {
            ring.samples.push(latency);
        } else {
            let slot = ring.next;
            ring.samples[slot] = latency;
        }
        ring.next = (ring.next + 1) % ring.capacity;
    }

    /// Samples currently held.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("latency tracker lock poisoned")
            .samples
            .len()
    }

    /// True when no samples have been observed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute percentiles over the current window. Returns `None` when the
    /// window is empty.
    pub fn snapshot(&self) -> Option<LatencySnapshot> {
        let mut sorted = {
            let ring = self.inner.lock().expect("latency tracker lock poisoned");
            if ring.samples.is_empty() {
                return None;
            }
            ring.samples.clone()
        };
        sorted.sort_unstable();

        let nearest = |p: f64| -> Duration {
            let idx = (p * (sorted.len() - 1) as f64).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };

        Some(LatencySnapshot {
            p50: nearest(0.50),
            p90: nearest(0.90),
            p95: nearest(0.95),
            p99: nearest(0.99),
            sample_count: sorted.len(),
        })
    }
}

/// Bounded per-key store of latency trackers.
///
/// Keys evict least-recently-used once `max_keys` is exceeded; a warning is
/// logged once when the key count crosses the warn threshold, since a
/// growing key set usually means request identifiers leaked into policy
/// keys.
pub struct TrackerStore {
    capacity_per_key: usize,
    max_keys: usize,
    warn_threshold: usize,
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    trackers: HashMap<PolicyKey, Arc<LatencyTracker>>,
    order: VecDeque<PolicyKey>,
    warned: bool,
}

impl TrackerStore {
    /// Create a store with default bounds.
    pub fn new() -> Self {
        Self::with_bounds(DEFAULT_TRACKER_CAPACITY, DEFAULT_MAX_TRACKERS)
    }

    /// Create a store with an explicit per-key ring capacity and key bound.
    pub fn with_bounds(capacity_per_key: usize, max_keys: usize) -> Self {
        let max_keys = max_keys.max(1);
        Self {
            capacity_per_key,
            max_keys,
            warn_threshold: (max_keys * 3) / 4,
            inner: Mutex::new(StoreInner {
                trackers: HashMap::new(),
                order: VecDeque::new(),
                warned: false,
            }),
        }
    }

    /// Get or create the tracker for a key, marking it most recently used.
    pub fn tracker_for(&self, key: &PolicyKey) -> Arc<LatencyTracker> {
        let mut inner = self.inner.lock().expect("tracker store lock poisoned");

        if let Some(tracker) = inner.trackers.get(key).cloned() {
            Self::touch(&mut inner.order, key);
            return tracker;
        }

        let tracker = Arc::new(LatencyTracker::new(self.capacity_per_key));
        inner.trackers.insert(key.clone(), Arc::clone(&tracker));
        inner.order.push_back(key.clone());

        if inner.trackers.len() > self.max_keys {
            if let Some(oldest) = inner.order.pop_front() {
                inner.trackers.remove(&oldest);
            }
        }

        if !inner.warned && inner.trackers.len() >= self.warn_threshold && self.warn_threshold > 0
        {
            inner.warned = true;
            warn!(
                keys = inner.trackers.len(),
                max_keys = self.max_keys,
                "latency tracker key count nearing its bound; check policy keys for high cardinality"
            );
        }

        tracker
    }

    /// Look up the tracker for a key without creating one.
    pub fn get(&self, key: &PolicyKey) -> Option<Arc<LatencyTracker>> {
        self.inner
            .lock()
            .expect("tracker store lock poisoned")
            .trackers
            .get(key)
            .cloned()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("tracker store lock poisoned")
            .trackers
            .len()
    }

    /// True when no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch(order: &mut VecDeque<PolicyKey>, key: &PolicyKey) {
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.clone());
    }
}

impl Default for TrackerStore {
    fn default() -> Self {
        Self::new()
    }
}
