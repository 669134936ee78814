//! Tokio runtime access for timers and blocking work.
//!
//! UI shells may call into the core from a thread with no tokio context, so
//! every component that spawns goes through `runtime_handle()`, which falls
//! back to a shared lazily-built runtime.

use once_cell::sync::Lazy;

/// Global fallback Tokio runtime for calls made outside any runtime context.
/// Shared across all instances and never dropped.
static FALLBACK_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("chairside-rt")
        .enable_all()
        .build()
        .expect("Failed to create fallback tokio runtime")
});

/// Current runtime if there is one, otherwise the global fallback
pub(crate) fn runtime_handle() -> tokio::runtime::Handle {
    tokio::runtime::Handle::try_current().unwrap_or_else(|_| FALLBACK_RUNTIME.handle().clone())
}

/// RAII guard that cancels a token when dropped.
/// Dropping an in-flight search future drops this guard, which lets the
/// blocking search thread notice and stop early.
pub(crate) struct DropGuard {
    token: tokio_util::sync::CancellationToken,
}

impl DropGuard {
    pub(crate) fn new(token: tokio_util::sync::CancellationToken) -> Self {
        Self { token }
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
