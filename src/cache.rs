//! Time-limited cache of materialized views.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{config::TtlSource, view::Rows};

/// Source of "now" for cache expiry.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;
}

/// Monotonic wall clock.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

/// `(corpus, definition path, view name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub corpus: String,
    pub definition: String,
    pub view: String,
}

impl CacheKey {
    pub fn new(
        corpus: impl Into<String>,
        definition: impl Into<String>,
        view: impl Into<String>,
    ) -> Self {
        Self {
            corpus: corpus.into(),
            definition: definition.into(),
            view: view.into(),
        }
    }
}

/// One process-wide cache shared by every corpus.
///
/// Each entry expires after its corpus's TTL. Expired entries are swept on
/// every read and write; there is no background thread.
pub struct ViewCache {
    entries: Mutex<HashMap<CacheKey, (Rows, Duration)>>,
    ttl: Arc<dyn TtlSource>,
    clock: Arc<dyn Clock>,
}

impl ViewCache {
    pub fn new(ttl: Arc<dyn TtlSource>) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(ttl: Arc<dyn TtlSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Cached rows, or `None` on a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Rows> {
        let mut entries = self.entries.lock();
        self.prune_locked(&mut entries);
        entries.get(key).map(|(rows, _)| Arc::clone(rows))
    }

    pub fn put(&self, key: CacheKey, rows: Rows) {
        let stored_at = self.clock.now();
        let mut entries = self.entries.lock();
        self.prune_locked(&mut entries);
        entries.insert(key, (rows, stored_at));
    }

    /// Drop every entry older than its corpus's TTL.
    pub fn prune(&self) {
        self.prune_locked(&mut self.entries.lock());
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune_locked(&self, entries: &mut HashMap<CacheKey, (Rows, Duration)>) {
        let now = self.clock.now();
        let before = entries.len();
        entries.retain(|key, (_, stored_at)| {
            now.saturating_sub(*stored_at) < self.ttl.ttl(&key.corpus)
        });
        let pruned = before - entries.len();
        if pruned > 0 {
            tracing::debug!(pruned, "expired cached views");
        }
    }
}

impl std::fmt::Debug for ViewCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}
