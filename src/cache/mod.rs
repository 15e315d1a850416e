//! Bounded decode cache for storage units.
//!
//! Units are decoded lazily on a fixed worker pool and kept as shared text. The cache
//! only ever grows up to its capacity: once full, newly decoded units are handed to
//! the caller but not stored, and nothing is evicted until [`FrameCache::clear`].

mod decoder;


pub use decoder::{FrameUnits, InlineUnits, UnitDecoder};

use crate::error::DecodeUnitError;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, warn};

/// Storage unit number: a chunk id for inline storage, a frame number otherwise.
pub type UnitId = u32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub decodes: u64,
    pub failures: u64,
}

/// Outcome of [`FrameCache::resolve`]. Every requested unit lands in exactly one map.
#[derive(Debug, Default)]
pub struct Resolved {
    pub texts: HashMap<UnitId, Arc<str>>,
    pub misses: HashMap<UnitId, DecodeUnitError>,
}

struct Shared {
    entries: RwLock<HashMap<UnitId, Arc<str>>>,
    capacity: usize,
    decoder: Arc<dyn UnitDecoder>,
    hits: AtomicU64,
    misses: AtomicU64,
    decodes: AtomicU64,
    failures: AtomicU64,
}

impl Shared {
    /// Decode one unit on the calling thread, caching the text while there is room.
    fn decode(&self, unit: UnitId) -> Result<Arc<str>, DecodeUnitError> {
        self.decodes.fetch_add(1, Ordering::Relaxed);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.decoder.decode(unit)))
            .unwrap_or(Err(DecodeUnitError::Panicked(unit)));

        match outcome {
            Ok(text) => Ok(self.insert(unit, text)),
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    fn insert(&self, unit: UnitId, text: String) -> Arc<str> {
        let text: Arc<str> = Arc::from(text);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(&unit) {
            return Arc::clone(existing);
        }
        if entries.len() < self.capacity {
            entries.insert(unit, Arc::clone(&text));
        }
        text
    }
}

pub struct FrameCache {
    shared: Arc<Shared>,
    pool: ThreadPool,
}

impl fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCache")
            .field("stats", &self.stats())
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}

impl FrameCache {
    pub fn new(
        decoder: Arc<dyn UnitDecoder>,
        capacity: usize,
        workers: usize,
    ) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("nsm-decode-{i}"))
            .build()?;
        Ok(Self {
            shared: Arc::new(Shared {
                entries: RwLock::new(HashMap::new()),
                capacity,
                decoder,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                decodes: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
            pool,
        })
    }

    /// Cached texts for `units`, decoding whatever is missing on the worker pool.
    ///
    /// Units still running when `deadline` passes are reported as
    /// [`DecodeUnitError::DeadlineExceeded`]; their workers keep going in the
    /// background and may still fill the cache. Duplicate ids are resolved once.
    pub fn resolve(&self, units: &[UnitId], deadline: Option<Instant>) -> Resolved {
        let mut resolved = Resolved::default();
        let pending = self.split_cached(units, &mut resolved);
        if pending.is_empty() {
            return resolved;
        }

        self.shared.misses.fetch_add(pending.len() as u64, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        for &unit in &pending {
            let shared = Arc::clone(&self.shared);
            let tx = tx.clone();
            self.pool.spawn(move || {
                // The receiver is gone once the caller gave up waiting.
                let _ = tx.send((unit, shared.decode(unit)));
            });
        }
        drop(tx);

        let mut outstanding: HashSet<UnitId> = pending.into_iter().collect();
        while !outstanding.is_empty() {
            let received = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    rx.recv_timeout(deadline - now)
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok((unit, outcome)) => {
                    outstanding.remove(&unit);
                    match outcome {
                        Ok(text) => {
                            resolved.texts.insert(unit, text);
                        }
                        Err(err) => {
                            warn!(unit, error = %err, "unit decode failed");
                            resolved.misses.insert(unit, err);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    for unit in outstanding.drain() {
                        resolved.misses.insert(unit, DecodeUnitError::WorkerLost(unit));
                    }
                }
            }
        }

        if !outstanding.is_empty() {
            warn!(units = outstanding.len(), "decode deadline exceeded");
            for unit in outstanding {
                resolved.misses.insert(unit, DecodeUnitError::DeadlineExceeded(unit));
            }
        }
        resolved
    }

    /// Serve cached units into `resolved`; return the rest, deduplicated, in request order.
    fn split_cached(&self, units: &[UnitId], resolved: &mut Resolved) -> Vec<UnitId> {
        let entries = self.shared.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut seen = HashSet::with_capacity(units.len());
        let mut pending = Vec::new();
        for &unit in units {
            if !seen.insert(unit) {
                continue;
            }
            match entries.get(&unit) {
                Some(text) => {
                    self.shared.hits.fetch_add(1, Ordering::Relaxed);
                    resolved.texts.insert(unit, Arc::clone(text));
                }
                None => pending.push(unit),
            }
        }
        pending
    }

    /// Start decoding `units` in the background without waiting for them.
    pub fn prefetch(&self, units: &[UnitId]) {
        let mut scratch = Resolved::default();
        let pending = self.split_cached(units, &mut scratch);
        debug!(requested = units.len(), queued = pending.len(), "prefetching units");
        for unit in pending {
            let shared = Arc::clone(&self.shared);
            self.pool.spawn(move || {
                let _ = shared.decode(unit);
            });
        }
    }

    pub fn contains(&self, unit: UnitId) -> bool {
        self.shared
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&unit)
    }

    pub fn len(&self) -> usize {
        self.shared.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn clear(&self) {
        self.shared
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("frame cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.shared.capacity,
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            decodes: self.shared.decodes.load(Ordering::Relaxed),
            failures: self.shared.failures.load(Ordering::Relaxed),
        }
    }
}
