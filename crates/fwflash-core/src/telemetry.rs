//! Tracing setup for the fwflash binary.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events pass the default filter at the requested level.
const FWFLASH_TARGETS: &[&str] = &["fwflash", "fwflash_core", "fwflash_transport", "fwflash_pipeline"];

/// Default filter: our crates at `level`, everything else at `warn`.
pub fn default_filter(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(FWFLASH_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` replaces the default filter when set. Only the first call in a
/// process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));
    let registry = tracing_subscriber::registry().with(filter);
    let layer = fmt::layer()
        .with_target(level >= Level::DEBUG)
        .with_writer(std::io::stderr);

    let installed = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
