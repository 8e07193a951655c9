//! # Aggregate group status.
//!
//! [`Reconciler::reconcile`] recomputes one group's [`GroupStatus`] from a
//! fresh member query, stores it and broadcasts `group:status`.
//!
//! ## Rules
//! - Query failure → `unknown`, previous counts kept, event still published.
//! - Otherwise `running = #members in state running`, `total = #members`,
//!   status from [`GroupState::from_counts`].
//! - `last_updated` only moves when `(status, running, total)` changes, so
//!   reconciling an unchanged snapshot yields an identical record.
//! - Writers for the same group are serialized (query, store and publish
//!   happen under that group's gate); different groups reconcile concurrently
//!   and readers never wait on a query.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::backend::RuntimeClient;
use crate::broker::Broker;
use crate::events::{Event, GroupState, GroupStatus};

/// Status store plus the logic that refreshes it.
pub struct Reconciler {
    runtime: Arc<dyn RuntimeClient>,
    broker: Broker,
    store: RwLock<HashMap<String, GroupStatus>>,
    gates: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(runtime: Arc<dyn RuntimeClient>, broker: Broker) -> Self {
        Self {
            runtime,
            broker,
            store: RwLock::new(HashMap::new()),
            gates: StdMutex::new(HashMap::new()),
        }
    }

    fn gate(&self, group_id: &str) -> Arc<Mutex<()>> {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(group_id.to_string())
            .or_default()
            .clone()
    }

    /// Refreshes `group_id`, publishes the record and returns it.
    pub async fn reconcile(&self, group_id: &str) -> GroupStatus {
        let gate = self.gate(group_id);
        let _serialized = gate.lock().await;

        let members = self.runtime.list_components(Some(group_id)).await;
        let prev = self.store.read().await.get(group_id).cloned();
        let (prev_running, prev_total) = prev.as_ref().map_or((0, 0), |p| (p.running, p.total));

        let (status, running, total) = match members {
            Ok(members) => {
                let total = members.len();
                let running = members.iter().filter(|c| c.is_running()).count();
                (GroupState::from_counts(running, total), running, total)
            }
            Err(e) => {
                warn!(group = group_id, error = %e, label = e.as_label(), "member query failed; status unknown");
                (GroupState::Unknown, prev_running, prev_total)
            }
        };

        let last_updated = match &prev {
            Some(p) if (p.status, p.running, p.total) == (status, running, total) => p.last_updated,
            _ => Utc::now(),
        };
        let record = GroupStatus {
            group_id: group_id.to_string(),
            status,
            running,
            total,
            last_updated,
        };

        self.store
            .write()
            .await
            .insert(group_id.to_string(), record.clone());
        debug!(group = group_id, status = status.as_str(), running, total, "group reconciled");
        self.broker.broadcast(Event::group_status(record.clone()));
        record
    }

    /// Last stored record, if the group was ever reconciled.
    pub async fn get(&self, group_id: &str) -> Option<GroupStatus> {
        self.store.read().await.get(group_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        Component, EventFeed, LogStream, ResourceUsage, SimulatedRuntime,
    };
    use crate::error::BackendError;
    use crate::events::{EventKind, Payload};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Runtime whose member query for one group never returns.
    struct Stalled {
        inner: SimulatedRuntime,
        group: &'static str,
    }

    #[async_trait]
    impl RuntimeClient for Stalled {
        async fn list_components(&self, group: Option<&str>) -> Result<Vec<Component>, BackendError> {
            if group == Some(self.group) {
                std::future::pending::<()>().await;
            }
            self.inner.list_components(group).await
        }

        async fn get_component(&self, id: &str) -> Result<Component, BackendError> {
            self.inner.get_component(id).await
        }

        async fn start_component(&self, id: &str) -> Result<(), BackendError> {
            self.inner.start_component(id).await
        }

        async fn stop_component(&self, id: &str, timeout: Duration) -> Result<(), BackendError> {
            self.inner.stop_component(id, timeout).await
        }

        async fn restart_component(&self, id: &str, timeout: Duration) -> Result<(), BackendError> {
            self.inner.restart_component(id, timeout).await
        }

        async fn logs(
            &self,
            id: &str,
            tail: usize,
            follow: bool,
            cancel: CancellationToken,
        ) -> Result<LogStream, BackendError> {
            self.inner.logs(id, tail, follow, cancel).await
        }

        async fn usage(&self, id: &str) -> Result<ResourceUsage, BackendError> {
            self.inner.usage(id).await
        }

        fn watch(&self, cancel: CancellationToken) -> EventFeed {
            self.inner.watch(cancel)
        }
    }

    fn seeded(running: usize, stopped: usize) -> Arc<SimulatedRuntime> {
        let rt = SimulatedRuntime::new();
        for i in 0..running {
            rt.insert(SimulatedRuntime::component("shop", &format!("up{i}"), "img", true));
        }
        for i in 0..stopped {
            rt.insert(SimulatedRuntime::component("shop", &format!("down{i}"), "img", false));
        }
        Arc::new(rt)
    }

    #[tokio::test]
    async fn three_of_five_is_partial() {
        let (broker, _h) = Broker::spawn(16, 8, CancellationToken::new());
        let mut mailbox = broker.register().await.unwrap();
        let reconciler = Reconciler::new(seeded(3, 2), broker);

        let record = reconciler.reconcile("shop").await;
        assert_eq!(record.status, GroupState::Partial);
        assert_eq!((record.running, record.total), (3, 5));

        let ev = mailbox.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::GroupStatus);
        assert_eq!(ev.payload, Payload::GroupStatus(record));
    }

    #[tokio::test]
    async fn stopped_running_and_empty() {
        let (broker, _h) = Broker::spawn(16, 8, CancellationToken::new());

        let all_down = Reconciler::new(seeded(0, 4), broker.clone());
        assert_eq!(all_down.reconcile("shop").await.status, GroupState::Stopped);

        let all_up = Reconciler::new(seeded(4, 0), broker.clone());
        assert_eq!(all_up.reconcile("shop").await.status, GroupState::Running);

        let empty = Reconciler::new(seeded(0, 0), broker);
        let record = empty.reconcile("shop").await;
        assert_eq!(record.status, GroupState::Stopped);
        assert_eq!((record.running, record.total), (0, 0));
    }

    #[tokio::test]
    async fn query_failure_is_unknown_with_counts_kept() {
        let (broker, _h) = Broker::spawn(16, 8, CancellationToken::new());
        let mut mailbox = broker.register().await.unwrap();
        let rt = seeded(2, 1);
        let reconciler = Reconciler::new(rt.clone(), broker);

        reconciler.reconcile("shop").await;
        rt.set_unavailable(true);
        let record = reconciler.reconcile("shop").await;
        assert_eq!(record.status, GroupState::Unknown);
        assert_eq!((record.running, record.total), (2, 3));

        // Both reconciliations publish.
        mailbox.recv().await.unwrap();
        let ev = mailbox.recv().await.unwrap();
        assert_eq!(ev.payload, Payload::GroupStatus(record.clone()));
        assert_eq!(reconciler.get("shop").await, Some(record));
    }

    #[tokio::test]
    async fn unchanged_snapshot_is_idempotent() {
        let (broker, _h) = Broker::spawn(16, 8, CancellationToken::new());
        let mut mailbox = broker.register().await.unwrap();
        let reconciler = Reconciler::new(seeded(1, 1), broker);

        let first = reconciler.reconcile("shop").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = reconciler.reconcile("shop").await;
        assert_eq!(first, second);

        let a = mailbox.recv().await.unwrap();
        let b = mailbox.recv().await.unwrap();
        assert_eq!(a.data_json().unwrap(), b.data_json().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_query_does_not_block_other_groups() {
        let (broker, _h) = Broker::spawn(16, 8, CancellationToken::new());
        let inner = SimulatedRuntime::new();
        inner.insert(SimulatedRuntime::component("b", "web", "nginx", true));
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(Stalled { inner, group: "a" }),
            broker,
        ));

        let stuck = tokio::spawn({
            let reconciler = reconciler.clone();
            async move { reconciler.reconcile("a").await }
        });
        tokio::task::yield_now().await;

        let record = tokio::time::timeout(Duration::from_secs(1), reconciler.reconcile("b"))
            .await
            .expect("group b waited on group a");
        assert_eq!(record.status, GroupState::Running);
        assert_eq!(reconciler.get("b").await, Some(record));
        assert!(!stuck.is_finished());
        stuck.abort();
    }
}
