//! Chairside Core - client-side data access for the clinic screens
//!
//! Builds search indexes over record collections, scores and ranks queries,
//! memoizes derived values with fingerprint invalidation, computes the rows a
//! virtualized list must render, reveals long lists in batches, and offloads
//! lab-request computations to a worker thread with an identical inline path.

pub mod background;
pub mod cache;
pub mod clock;
pub mod config;
pub mod fingerprint;
pub mod indexer;
pub mod interface;
pub mod lab;
pub mod logging;
pub mod models;
pub mod progressive;
pub mod ranking;
mod runtime;
pub mod search;
mod store;
pub mod window;

pub use background::{BackgroundShim, WorkerRequest, WorkerResponse};
pub use cache::{CacheConfig, CacheStats, ResultCache};
pub use config::CoreConfig;
pub use indexer::SearchIndex;
pub use interface::*;
pub use models::FieldExtractor;
pub use progressive::ProgressiveLoader;
pub use search::SearchOptions;
pub use store::CollectionStore;
pub use window::{compute_window, ListGeometry, ViewportWindow, VirtualList};
