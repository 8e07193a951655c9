//! Process-wide `tracing` setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies. Output is
//! plain text or JSON lines depending on [`Config::log_json`].

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Installs the global subscriber.
///
/// Returns `false` if one was already installed (the call is then a no-op).
pub fn init(cfg: &Config) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if cfg.log_json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    match installed {
        Ok(()) => {
            tracing::debug!(level = %cfg.log_level, json = cfg.log_json, "logging initialized");
            true
        }
        Err(_) => false,
    }
}
