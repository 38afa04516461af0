//! Log output for the `deliberate` binary and anything else embedding the
//! structures.
//!
//! Structures only emit `tracing` events; nothing is printed until a host
//! installs a subscriber through [`init_tracing`].

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives read ahead of `RUST_LOG`, e.g. `deliberate_core=debug`.
pub const LOG_ENV: &str = "DELIBERATE_LOG";

/// Install the process-wide subscriber.
///
/// Filtering comes from `DELIBERATE_LOG`, then `RUST_LOG`, then `level`.
/// With `json` every event is one JSON object per line. If a subscriber is
/// already installed the call does nothing.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(build_filter(level));
    let installed = if json {
        registry.with(fmt::layer().with_target(false).json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}
