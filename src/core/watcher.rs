//! # Runtime event watcher.
//!
//! Consumes the runtime's component-event feed for the life of the process.
//!
//! ```text
//! loop {
//!     feed = runtime.watch()
//!     for each event:
//!         normalize ─► component:status ─► Broker
//!         group set ─► reconciler.reconcile(group)
//!     feed closed / failed ─► backoff.wait() ─► resubscribe
//! }   (until cancel)
//! ```
//!
//! Actions outside the normalization table are published verbatim as the
//! component state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::reconciler::Reconciler;
use crate::backend::{EventFeed, RuntimeClient, RuntimeEvent};
use crate::broker::Broker;
use crate::error::BackendError;
use crate::events::{ComponentState, ComponentStatus, Event};
use crate::policies::BackoffPolicy;

/// Length of component ids on the wire.
pub(crate) const SHORT_ID: usize = 12;

pub(crate) fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID).collect()
}

enum FeedEnd {
    Shutdown,
    Closed,
    Failed(BackendError),
}

/// Long-lived consumer of the runtime event feed.
pub struct Watcher {
    runtime: Arc<dyn RuntimeClient>,
    broker: Broker,
    reconciler: Arc<Reconciler>,
    backoff: BackoffPolicy,
}

impl Watcher {
    pub fn new(
        runtime: Arc<dyn RuntimeClient>,
        broker: Broker,
        reconciler: Arc<Reconciler>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            runtime,
            broker,
            reconciler,
            backoff,
        }
    }

    /// Watches until `cancel` fires, resubscribing after every feed failure.
    pub async fn run(self, cancel: CancellationToken) {
        let mut attempt = 0u32;
        loop {
            let feed = self.runtime.watch(cancel.child_token());
            info!("watching runtime events");

            let (end, handled) = self.consume(feed, &cancel).await;
            if handled > 0 {
                attempt = 0;
            }
            match end {
                FeedEnd::Shutdown => break,
                FeedEnd::Closed => warn!(events = handled, "runtime event feed closed"),
                FeedEnd::Failed(e) => {
                    warn!(events = handled, error = %e, label = e.as_label(), "runtime event feed failed")
                }
            }

            let delay = self.backoff.next(attempt);
            info!(?delay, attempt, "reconnecting to runtime events");
            if !self.backoff.wait(attempt, &cancel).await {
                break;
            }
            attempt = attempt.saturating_add(1);
        }
        info!("watcher stopped");
    }

    async fn consume(&self, mut feed: EventFeed, cancel: &CancellationToken) -> (FeedEnd, u64) {
        let mut handled = 0u64;
        let mut errors_open = true;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return (FeedEnd::Shutdown, handled),
                err = feed.errors.recv(), if errors_open => match err {
                    Some(e) => return (FeedEnd::Failed(e), handled),
                    None => errors_open = false,
                },
                ev = feed.events.recv() => match ev {
                    Some(ev) => {
                        self.handle(ev).await;
                        handled += 1;
                    }
                    None => return (FeedEnd::Closed, handled),
                },
            }
        }
    }

    async fn handle(&self, ev: RuntimeEvent) {
        let state = ComponentState::from_action(&ev.action);
        self.broker.broadcast(Event::component_status(ComponentStatus {
            id: short_id(&ev.id),
            name: ev.name,
            action: ev.action,
            state,
            group_id: ev.group.clone(),
            service: ev.service,
        }));
        if let Some(group) = ev.group.as_deref() {
            self.reconciler.reconcile(group).await;
        }
    }
}
