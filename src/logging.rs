//! `tracing`-based structured logging init (spec.md's ambient logging
//! concern). The teacher declares `tracing-subscriber` with its
//! `env-filter` and `json` features but never wires up a subscriber in
//! its own `src/`; this builds the `EnvFilter`-from-directive-string +
//! optional newline-delimited-JSON formatter those features are for.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LoggingSettings;

/// Install a global `tracing` subscriber from `settings`. Safe to call at
/// most once per process; a second call is a silent no-op rather than a
/// panic, so library consumers that already installed their own
/// subscriber aren't disrupted.
pub fn init(settings: &LoggingSettings) {
    let filter = EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(filter);
    let result = if settings.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed, skipping re-init");
    }
}
