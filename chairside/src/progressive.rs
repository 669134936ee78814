//! Batch-wise reveal of a large list.
//!
//! Independent of [`crate::window`]; compose the two by windowing over
//! [`ProgressiveLoader::visible_items`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::interface::{ChairsideError, Result};
use crate::runtime::runtime_handle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressiveConfig {
    pub initial_batch_size: usize,
    pub batch_size: usize,
    /// Simulated latency of one `load_more`
    pub load_delay_ms: u64,
}

impl Default for ProgressiveConfig {
    fn default() -> Self {
        Self {
            initial_batch_size: 20,
            batch_size: 20,
            load_delay_ms: 100,
        }
    }
}

impl ProgressiveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ChairsideError::InvalidConfig("progressive batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct LoadState {
    loaded: usize,
    loading: bool,
    /// Bumped by reset/load_all so an in-flight batch does not land afterwards
    epoch: u64,
}

pub struct ProgressiveLoader<T> {
    items: Arc<Vec<T>>,
    config: ProgressiveConfig,
    state: Arc<Mutex<LoadState>>,
}

/// Clears the loading flag if a `load_more` future is dropped mid-delay.
struct LoadingGuard {
    state: Arc<Mutex<LoadState>>,
    epoch: u64,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.epoch == self.epoch {
            state.loading = false;
        }
    }
}

impl<T> ProgressiveLoader<T> {
    pub fn new(items: Arc<Vec<T>>, config: ProgressiveConfig) -> Self {
        let loaded = config.initial_batch_size.min(items.len());
        Self {
            items,
            config,
            state: Arc::new(Mutex::new(LoadState {
                loaded,
                loading: false,
                epoch: 0,
            })),
        }
    }

    /// Reveal the next batch after the configured delay.
    ///
    /// Returns `false` without waiting when a load is already running or
    /// everything is loaded.
    pub async fn load_more(&self) -> bool {
        let epoch = {
            let mut state = self.state.lock();
            if state.loading || state.loaded >= self.items.len() {
                return false;
            }
            state.loading = true;
            state.epoch
        };
        let _guard = LoadingGuard {
            state: Arc::clone(&self.state),
            epoch,
        };

        let delay = Duration::from_millis(self.config.load_delay_ms);
        if !delay.is_zero() {
            // The timer is created inside the task so it binds to a reactor
            if runtime_handle()
                .spawn(async move { tokio::time::sleep(delay).await })
                .await
                .is_err()
            {
                return false;
            }
        }

        let mut state = self.state.lock();
        if state.epoch != epoch {
            return false;
        }
        state.loaded = (state.loaded + self.config.batch_size).min(self.items.len());
        tracing::trace!(loaded = state.loaded, total = self.items.len(), "progressive batch loaded");
        true
    }

    /// Back to the initial batch. Cancels the effect of an in-flight load.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.loaded = self.config.initial_batch_size.min(self.items.len());
        state.loading = false;
        state.epoch += 1;
    }

    pub fn load_all(&self) {
        let mut state = self.state.lock();
        state.loaded = self.items.len();
        state.loading = false;
        state.epoch += 1;
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().loaded < self.items.len()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn loaded_count(&self) -> usize {
        self.state.lock().loaded
    }

    pub fn total_count(&self) -> usize {
        self.items.len()
    }

    /// Percentage of the list currently revealed; an empty list is complete.
    pub fn progress(&self) -> f64 {
        let total = self.items.len();
        if total == 0 {
            return 100.0;
        }
        self.state.lock().loaded as f64 / total as f64 * 100.0
    }

    pub fn visible_items(&self) -> &[T] {
        let loaded = self.state.lock().loaded;
        &self.items[..loaded]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(total: usize, delay_ms: u64) -> ProgressiveLoader<usize> {
        ProgressiveLoader::new(
            Arc::new((0..total).collect()),
            ProgressiveConfig {
                initial_batch_size: 20,
                batch_size: 20,
                load_delay_ms: delay_ms,
            },
        )
    }

    #[test]
    fn test_initial_batch() {
        let l = loader(55, 0);
        assert_eq!(l.visible_items().len(), 20);
        assert_eq!(l.visible_items()[19], 19);
        assert!(l.has_more());
        assert!(!l.is_loading());
    }

    #[test]
    fn test_initial_batch_clamped_to_short_list() {
        let l = loader(7, 0);
        assert_eq!(l.loaded_count(), 7);
        assert!(!l.has_more());
        assert_eq!(l.progress(), 100.0);
    }

    #[tokio::test]
    async fn test_load_more_is_monotonic_and_clamped() {
        let l = loader(55, 0);
        let mut previous = l.loaded_count();
        while l.has_more() {
            assert!(l.load_more().await);
            let now = l.loaded_count();
            assert!(now >= previous);
            assert!(now <= l.total_count());
            previous = now;
        }
        assert_eq!(previous, 55);
        // exhausted: silent no-op
        assert!(!l.load_more().await);
        assert_eq!(l.loaded_count(), 55);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_more_while_loading_is_noop() {
        let l = Arc::new(loader(100, 100));
        let background = {
            let l = Arc::clone(&l);
            tokio::spawn(async move { l.load_more().await })
        };
        tokio::task::yield_now().await;
        assert!(l.is_loading());
        assert!(!l.load_more().await);

        assert!(background.await.unwrap());
        assert_eq!(l.loaded_count(), 40);
        assert!(!l.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_in_flight_batch() {
        let l = Arc::new(loader(100, 100));
        l.load_all();
        l.reset();
        let background = {
            let l = Arc::clone(&l);
            tokio::spawn(async move { l.load_more().await })
        };
        tokio::task::yield_now().await;
        l.reset();
        assert!(!background.await.unwrap());
        assert_eq!(l.loaded_count(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_load_clears_loading_flag() {
        let l = loader(100, 100);
        let _ = tokio::time::timeout(Duration::from_millis(10), l.load_more()).await;
        assert!(!l.is_loading());
        assert_eq!(l.loaded_count(), 20);
    }

    #[test]
    fn test_load_all_and_progress() {
        let l = loader(80, 0);
        assert_eq!(l.progress(), 25.0);
        l.load_all();
        assert_eq!(l.loaded_count(), 80);
        assert_eq!(l.progress(), 100.0);
        assert!(!l.has_more());
        l.reset();
        assert_eq!(l.loaded_count(), 20);
    }

    #[test]
    fn test_empty_list() {
        let l = loader(0, 0);
        assert!(l.visible_items().is_empty());
        assert!(!l.has_more());
        assert_eq!(l.progress(), 100.0);
    }

    #[test]
    fn test_works_without_runtime() {
        let l = loader(30, 50);
        assert!(futures::executor::block_on(l.load_more()));
        assert_eq!(l.loaded_count(), 30);
        assert!(!futures::executor::block_on(l.load_more()));
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = ProgressiveConfig { batch_size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ChairsideError::InvalidConfig(_))));
    }
}
