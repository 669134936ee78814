//! Result cache for expensive derived values.
//!
//! Two flavors share one instance: a general string-keyed cache, and a
//! per-record cache whose entries are also invalidated when the fingerprint
//! of their dependency collection changes (e.g. "last visit for patient X"
//! given the current appointments).
//!
//! Eviction is by insertion order, not access order: once `max_size` entries
//! are stored, the oldest-inserted one goes before a new key is added.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::fingerprint::{fingerprint, Fingerprint, Summarize};
use crate::interface::{ChairsideError, Result};
use crate::runtime::runtime_handle;

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MAX_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_age_ms: u64,
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_ms: DEFAULT_MAX_AGE.as_millis() as u64,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    /// Stale entries are swept every half `max_age`
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis((self.max_age_ms / 2).max(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_age_ms == 0 {
            return Err(ChairsideError::InvalidConfig("cache max_age_ms must be positive".into()));
        }
        if self.max_size == 0 {
            return Err(ChairsideError::InvalidConfig("cache max_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Hit/miss counters. Diagnostic only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub derived_entries: usize,
}

impl CacheStats {
    /// Percentage of lookups served from cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

struct Slot<V> {
    value: V,
    inserted_at: i64,
    seq: u64,
}

/// Key/value store bounded by count, remembering insertion order
struct BoundedStore<V> {
    entries: HashMap<String, Slot<V>>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> BoundedStore<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn get(&self, key: &str) -> Option<&Slot<V>> {
        self.entries.get(key)
    }

    /// Insert as the newest entry; returns evicted keys
    fn insert(&mut self, key: String, value: V, now: i64, max_size: usize) -> Vec<String> {
        self.remove(&key);

        let mut evicted = Vec::new();
        while self.entries.len() >= max_size {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            evicted.push(oldest);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(key, Slot { value, inserted_at: now, seq });
        evicted
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(slot) => {
                self.order.remove(&slot.seq);
                true
            }
            None => false,
        }
    }

    fn sweep(&mut self, now: i64, max_age_ms: i64) -> usize {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, slot)| !is_fresh(slot.inserted_at, now, max_age_ms))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.remove(key);
        }
        stale.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn is_fresh(inserted_at: i64, now: i64, max_age_ms: i64) -> bool {
    now - inserted_at < max_age_ms
}

struct DerivedValue<D> {
    value: D,
    fingerprint: Fingerprint,
}

struct CacheState<V, D> {
    general: BoundedStore<V>,
    derived: BoundedStore<DerivedValue<D>>,
    hits: u64,
    misses: u64,
}

impl<V, D> CacheState<V, D> {
    fn sweep(&mut self, now: i64, max_age_ms: i64) -> usize {
        self.general.sweep(now, max_age_ms) + self.derived.sweep(now, max_age_ms)
    }
}

/// Memoizes computed values of type `V` by key, and record-derived values of
/// type `D` by record id plus dependency fingerprint.
pub struct ResultCache<V, D = V> {
    state: Arc<Mutex<CacheState<V, D>>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V, D> ResultCache<V, D>
where
    V: Clone + Send + 'static,
    D: Clone + Send + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                general: BoundedStore::new(),
                derived: BoundedStore::new(),
                hits: 0,
                misses: 0,
            })),
            config,
            clock,
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn max_age_ms(&self) -> i64 {
        self.config.max_age_ms as i64
    }

    /// Cached value for `key` if present and fresh, otherwise `compute()`.
    ///
    /// The lock is not held while computing, so `compute` may use the cache.
    pub fn get_cached(&self, key: &str, compute: impl FnOnce() -> V) -> V {
        let now = self.clock.now_millis();
        {
            let mut state = self.state.lock();
            let fresh = state
                .general
                .get(key)
                .filter(|slot| is_fresh(slot.inserted_at, now, self.max_age_ms()))
                .map(|slot| slot.value.clone());
            if let Some(value) = fresh {
                state.hits += 1;
                return value;
            }
            state.misses += 1;
        }

        let value = compute();
        let evicted = self.state.lock().general.insert(
            key.to_string(),
            value.clone(),
            self.clock.now_millis(),
            self.config.max_size,
        );
        if !evicted.is_empty() {
            tracing::debug!(?evicted, "result cache evicted oldest entries");
        }
        value
    }

    /// Cached derived value for `record_id`, recomputed when stale or when
    /// `dependencies` no longer fingerprint the same.
    pub fn get_record_derived_cached<I: Summarize>(
        &self,
        record_id: &str,
        dependencies: &[I],
        derive: impl FnOnce(&[I]) -> D,
    ) -> D {
        let now = self.clock.now_millis();
        let current = fingerprint(dependencies);
        {
            let mut state = self.state.lock();
            let fresh = state
                .derived
                .get(record_id)
                .filter(|slot| is_fresh(slot.inserted_at, now, self.max_age_ms()))
                .filter(|slot| slot.value.fingerprint == current)
                .map(|slot| slot.value.value.clone());
            if let Some(value) = fresh {
                state.hits += 1;
                return value;
            }
            state.misses += 1;
        }

        let value = derive(dependencies);
        let evicted = self.state.lock().derived.insert(
            record_id.to_string(),
            DerivedValue {
                value: value.clone(),
                fingerprint: current,
            },
            self.clock.now_millis(),
            self.config.max_size,
        );
        if !evicted.is_empty() {
            tracing::debug!(?evicted, "derived cache evicted oldest entries");
        }
        value
    }

    /// Drop every stale entry from both flavors; returns how many went.
    pub fn sweep_expired(&self) -> usize {
        self.state.lock().sweep(self.clock.now_millis(), self.max_age_ms())
    }

    /// Start the periodic sweep on the current (or fallback) runtime.
    /// Calling it again restarts the timer. The task stops when the cache is
    /// dropped.
    pub fn start_sweeper(&self) {
        let weak: Weak<Mutex<CacheState<V, D>>> = Arc::downgrade(&self.state);
        let clock = Arc::clone(&self.clock);
        let max_age_ms = self.max_age_ms();
        let period = self.config.sweep_interval();

        let handle = runtime_handle().spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(state) = weak.upgrade() else {
                    break;
                };
                let removed = state.lock().sweep(clock.now_millis(), max_age_ms);
                if removed > 0 {
                    tracing::debug!(removed, "swept stale cache entries");
                }
            }
        });

        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Reset everything, counters included. Idempotent.
    pub fn clear_cache(&self) {
        let mut state = self.state.lock();
        state.general.clear();
        state.derived.clear();
        state.hits = 0;
        state.misses = 0;
    }

    /// Remove the cached values stored under `key` in either flavor.
    pub fn clear_key(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let general = state.general.remove(key);
        let derived = state.derived.remove(key);
        general || derived
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.general.len(),
            derived_entries: state.derived.len(),
        }
    }
}

impl<V, D> Drop for ResultCache<V, D> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}
