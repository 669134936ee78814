//! stderr logging for binaries, benches and debugging sessions.
//!
//! The library only emits `tracing` events; nothing is printed until a host
//! installs a subscriber. `CHAIRSIDE_LOG` takes an `EnvFilter` directive
//! string and defaults to `info`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV_VAR: &str = "CHAIRSIDE_LOG";
const DEFAULT_DIRECTIVES: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn try_init() -> bool {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(layer)
        .try_init()
        .is_ok()
}

/// Like [`try_init`], ignoring an already installed subscriber
pub fn init() {
    if try_init() {
        tracing::debug!(filter_env = LOG_ENV_VAR, "chairside logging initialized");
    }
}
