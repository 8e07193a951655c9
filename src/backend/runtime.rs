//! # Runtime client contract.
//!
//! [`RuntimeClient`] is the shape the core needs from a container runtime.
//! Component ids are opaque strings; lookups accept unambiguous prefixes when
//! the implementation supports it.
//!
//! ## Event feed
//! [`RuntimeClient::watch`] returns an [`EventFeed`]: a pair of receivers, one
//! for component events and one for feed errors. The feed ends when either
//! receiver yields `None` or the error receiver yields an error; the consumer
//! is expected to resubscribe by calling `watch` again.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;

/// Stream of raw log lines (may include the runtime's multiplexing header).
pub type LogStream = BoxStream<'static, Result<String, BackendError>>;

/// Snapshot of one component as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Runtime state (`running`, `exited`, ...).
    pub state: String,
    /// Human-readable status (`Up 2 hours`).
    pub status: String,
    /// Owning group, if the component belongs to one.
    pub group: Option<String>,
    /// Service name inside the group.
    pub service: Option<String>,
    pub created: DateTime<Utc>,
}

impl Component {
    #[inline]
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// One raw event from the live feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeEvent {
    pub id: String,
    /// Vendor action string (`start`, `die`, `health_status: healthy`, ...).
    pub action: String,
    pub name: String,
    pub group: Option<String>,
    pub service: Option<String>,
    pub at: DateTime<Utc>,
}

/// Point-in-time resource usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    pub id: String,
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
}

/// Paired success/error channels of one feed subscription.
pub struct EventFeed {
    /// Component events in runtime order.
    pub events: mpsc::Receiver<RuntimeEvent>,
    /// Feed failures; any value ends the subscription.
    pub errors: mpsc::Receiver<BackendError>,
}

/// Contract for container runtime access.
#[async_trait]
pub trait RuntimeClient: Send + Sync + 'static {
    /// Lists components, optionally restricted to one group.
    async fn list_components(&self, group: Option<&str>) -> Result<Vec<Component>, BackendError>;

    /// Returns one component by id (or id prefix).
    async fn get_component(&self, id: &str) -> Result<Component, BackendError>;

    async fn start_component(&self, id: &str) -> Result<(), BackendError>;

    async fn stop_component(&self, id: &str, timeout: Duration) -> Result<(), BackendError>;

    async fn restart_component(&self, id: &str, timeout: Duration) -> Result<(), BackendError>;

    /// Returns the last `tail` log lines, then keeps following when `follow`
    /// is set until `cancel` fires.
    async fn logs(
        &self,
        id: &str,
        tail: usize,
        follow: bool,
        cancel: CancellationToken,
    ) -> Result<LogStream, BackendError>;

    /// Point-in-time usage of one component.
    async fn usage(&self, id: &str) -> Result<ResourceUsage, BackendError>;

    /// Opens a live component-event subscription.
    ///
    /// The subscription stops producing when `cancel` fires.
    fn watch(&self, cancel: CancellationToken) -> EventFeed;
}
