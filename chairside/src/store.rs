//! Collection store: one record source, its search index, and the search
//! entry points the UI calls.
//!
//! The index is rebuilt lazily whenever the source hands out a snapshot with
//! a new identity. Async searches run on a blocking thread; dropping the
//! awaiting future cancels them through a DropGuard.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::indexer::SearchIndex;
use crate::interface::{ChairsideError, OwnedMatch, RecordSource, Result};
use crate::models::FieldExtractor;
use crate::runtime::{runtime_handle, DropGuard};
use crate::search::SearchOptions;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

pub struct CollectionStore<T> {
    source: Arc<dyn RecordSource<T>>,
    extractor: FieldExtractor<T>,
    index: RwLock<Arc<SearchIndex<T>>>,
    options: SearchOptions,
    debounce: Duration,
    /// Latest debounced query; older ones give up when they wake
    query_generation: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> CollectionStore<T> {
    pub fn new(source: Arc<dyn RecordSource<T>>, extractor: FieldExtractor<T>) -> Self {
        let index = SearchIndex::build(source.snapshot(), &extractor);
        Self {
            source,
            extractor,
            index: RwLock::new(Arc::new(index)),
            options: SearchOptions::default(),
            debounce: DEFAULT_DEBOUNCE,
            query_generation: AtomicU64::new(0),
        }
    }

    pub fn from_config(source: Arc<dyn RecordSource<T>>, extractor: FieldExtractor<T>, config: &CoreConfig) -> Self {
        Self::new(source, extractor)
            .with_options(config.search.clone())
            .with_debounce(Duration::from_millis(config.debounce_ms))
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Index for the source's current snapshot, rebuilt if the snapshot changed
    pub fn index(&self) -> Arc<SearchIndex<T>> {
        let snapshot = self.source.snapshot();
        {
            let current = self.index.read();
            if current.is_built_from(&snapshot) {
                return Arc::clone(&current);
            }
        }

        let mut slot = self.index.write();
        // Another caller may have rebuilt while we waited for the lock
        if !slot.is_built_from(&snapshot) {
            *slot = Arc::new(SearchIndex::build(snapshot, &self.extractor));
        }
        Arc::clone(&slot)
    }

    pub fn record_count(&self) -> usize {
        self.index().len()
    }

    /// Search on the calling thread
    pub fn search_sync(&self, query: &str) -> Vec<OwnedMatch<T>> {
        self.search_sync_with(query, &self.options)
    }

    pub fn search_sync_with(&self, query: &str, options: &SearchOptions) -> Vec<OwnedMatch<T>> {
        self.index()
            .search(query, options)
            .into_iter()
            .map(OwnedMatch::from)
            .collect()
    }

    /// Search on a blocking thread.
    ///
    /// Dropping the returned future cancels the search; a search that notices
    /// the cancellation reports `Cancelled`.
    pub async fn search(&self, query: String) -> Result<Vec<OwnedMatch<T>>> {
        self.search_with(query, self.options.clone()).await
    }

    pub async fn search_with(&self, query: String, options: SearchOptions) -> Result<Vec<OwnedMatch<T>>> {
        let index = self.index();

        let token = CancellationToken::new();
        let _guard = DropGuard::new(token.clone());

        let handle = runtime_handle().spawn_blocking(move || {
            let hits = index.search_interruptible(&query, &options, &token)?;
            Ok::<_, ChairsideError>(hits.into_iter().map(OwnedMatch::from).collect())
        });

        match handle.await {
            Ok(result) => result,
            Err(_join_error) => Err(ChairsideError::Cancelled),
        }
    }

    /// Wait out the debounce interval, then search unless a newer debounced
    /// query arrived meanwhile. Superseded queries return `Ok(None)`.
    pub async fn search_debounced(&self, query: String) -> Result<Option<Vec<OwnedMatch<T>>>> {
        let generation = self.query_generation.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.debounce.is_zero() {
            let delay = self.debounce;
            runtime_handle()
                .spawn(async move { tokio::time::sleep(delay).await })
                .await
                .map_err(|_| ChairsideError::Cancelled)?;
        }

        if self.query_generation.load(Ordering::SeqCst) != generation {
            tracing::trace!(%query, "debounced query superseded");
            return Ok(None);
        }
        self.search(query).await.map(Some)
    }
}
