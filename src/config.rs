//! # Runtime configuration.
//!
//! Provides [`Config`], the centralized settings for the dashboard runtime.
//!
//! Values come from built-in defaults layered with `GOSEI_*` environment
//! variables (see [`Config::load`]), e.g. `GOSEI_PORT=9000` or
//! `GOSEI_HEARTBEAT_SECS=15`.
//!
//! ## Sentinel values
//! - `sample_interval_secs = 0` → periodic sampling disabled
//! - capacities of `0` are clamped to 1 by the accessors

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::RuntimeError;

/// Which action executor the dashboard wires in when none is injected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// In-memory executor driving the simulated runtime.
    Simulated,
    /// `docker compose` subprocesses; requires an injected runtime and directory.
    Compose,
}

/// Global configuration for the dashboard runtime.
///
/// All fields are public; prefer the accessors, which turn raw numbers into
/// durations and clamp capacities.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP surface binds to.
    pub host: String,
    /// Port the HTTP surface listens on.
    pub port: u16,

    /// Idle interval after which a serving loop writes a heartbeat.
    pub heartbeat_secs: u64,
    /// Per-client mailbox capacity. Events beyond it are dropped for that client.
    pub mailbox_capacity: usize,
    /// Broker intake queue capacity. Broadcasts beyond it are dropped entirely.
    pub intake_capacity: usize,

    /// Fixed delay before the watcher resubscribes to the runtime feed.
    pub watch_retry_secs: u64,
    /// Buffer between an action and the output relay.
    pub output_buffer: usize,
    /// Maximum time shutdown waits for in-flight operations.
    pub grace_secs: u64,
    /// Resource sampling period (`0` = disabled).
    pub sample_interval_secs: u64,
    /// Number of historical log lines sent before following.
    pub log_tail: usize,

    /// Executor wired by the binary.
    pub executor: ExecutorKind,

    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl Config {
    /// Loads defaults overlaid with `GOSEI_*` environment variables.
    pub fn load() -> Result<Self, RuntimeError> {
        let cfg = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("GOSEI")
                    .prefix_separator("_")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Config>()?;
        Ok(cfg)
    }

    /// Socket address for the HTTP listener.
    pub fn bind_addr(&self) -> Result<SocketAddr, RuntimeError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                RuntimeError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })
    }

    #[inline]
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    #[inline]
    pub fn mailbox_capacity_clamped(&self) -> usize {
        self.mailbox_capacity.max(1)
    }

    #[inline]
    pub fn intake_capacity_clamped(&self) -> usize {
        self.intake_capacity.max(1)
    }

    #[inline]
    pub fn output_buffer_clamped(&self) -> usize {
        self.output_buffer.max(1)
    }

    #[inline]
    pub fn watch_retry(&self) -> Duration {
        Duration::from_secs(self.watch_retry_secs)
    }

    #[inline]
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    /// Returns the sampling period as an `Option`.
    ///
    /// - `None` → sampling disabled
    /// - `Some(d)` → sample every `d`
    #[inline]
    pub fn sample_interval(&self) -> Option<Duration> {
        if self.sample_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.sample_interval_secs))
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - listen on `127.0.0.1:8080`
    /// - heartbeat every 30s, mailbox 64, broker intake 256
    /// - watcher retry after 5s, output buffer 100
    /// - shutdown grace 30s, sampling every 10s, log tail 100
    /// - simulated executor, `info` logs in plain text
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            heartbeat_secs: 30,
            mailbox_capacity: 64,
            intake_capacity: 256,
            watch_retry_secs: 5,
            output_buffer: 100,
            grace_secs: 30,
            sample_interval_secs: 10,
            log_tail: 100,
            executor: ExecutorKind::Simulated,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.heartbeat(), Duration::from_secs(30));
        assert_eq!(cfg.watch_retry(), Duration::from_secs(5));
        assert_eq!(cfg.sample_interval(), Some(Duration::from_secs(10)));
        assert_eq!(cfg.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn zero_values_are_clamped_or_disable() {
        let cfg = Config {
            mailbox_capacity: 0,
            intake_capacity: 0,
            output_buffer: 0,
            sample_interval_secs: 0,
            heartbeat_secs: 0,
            ..Config::default()
        };
        assert_eq!(cfg.mailbox_capacity_clamped(), 1);
        assert_eq!(cfg.intake_capacity_clamped(), 1);
        assert_eq!(cfg.output_buffer_clamped(), 1);
        assert_eq!(cfg.sample_interval(), None);
        assert_eq!(cfg.heartbeat(), Duration::from_secs(1));
    }

    #[test]
    fn executor_kind_parses_lowercase() {
        let kind: ExecutorKind = serde_json::from_str("\"compose\"").unwrap();
        assert_eq!(kind, ExecutorKind::Compose);
    }
}
