//! # Periodic resource sampling.
//!
//! Every interval, and only while at least one client is connected, the
//! [`Sampler`] queries usage for every running member of every known group and
//! broadcasts `component:stats`. Individual failures are skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::watcher::short_id;
use crate::backend::{GroupDirectory, RuntimeClient};
use crate::broker::Broker;
use crate::events::{ComponentStats, Event};

pub struct Sampler {
    runtime: Arc<dyn RuntimeClient>,
    directory: Arc<dyn GroupDirectory>,
    broker: Broker,
    interval: Duration,
}

impl Sampler {
    pub fn new(
        runtime: Arc<dyn RuntimeClient>,
        directory: Arc<dyn GroupDirectory>,
        broker: Broker,
        interval: Duration,
    ) -> Self {
        Self {
            runtime,
            directory,
            broker,
            interval,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.broker.client_count() > 0 {
                        let n = self.sample_once().await;
                        debug!(components = n, "usage sampled");
                    }
                }
            }
        }
        info!("sampler stopped");
    }

    /// Samples every running member once; returns how many were published.
    pub async fn sample_once(&self) -> usize {
        let mut published = 0;
        for group in self.directory.list_groups().await {
            let members = match self.runtime.list_components(Some(&group.id)).await {
                Ok(m) => m,
                Err(e) => {
                    debug!(group = %group.id, error = %e, "member query failed; group skipped");
                    continue;
                }
            };
            for c in members.iter().filter(|c| c.is_running()) {
                match self.runtime.usage(&c.id).await {
                    Ok(u) => {
                        self.broker.broadcast(Event::component_stats(ComponentStats {
                            id: short_id(&u.id),
                            cpu_percent: u.cpu_percent,
                            memory_usage: u.memory_usage,
                            memory_limit: u.memory_limit,
                            memory_percent: u.memory_percent,
                            network_rx: u.network_rx,
                            network_tx: u.network_tx,
                        }));
                        published += 1;
                    }
                    Err(e) => debug!(component = %c.name, error = %e, "usage query failed"),
                }
            }
        }
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryDirectory, SimulatedRuntime};
    use crate::events::EventKind;
    use std::path::Path;

    fn demo() -> (Arc<SimulatedRuntime>, Arc<InMemoryDirectory>) {
        let rt = Arc::new(SimulatedRuntime::demo());
        let dir = Arc::new(InMemoryDirectory::new(SimulatedRuntime::demo_groups(Path::new("/srv"))));
        (rt, dir)
    }

    #[tokio::test]
    async fn samples_only_running_members() {
        let (rt, dir) = demo();
        rt.set_group_state("monitoring", "stop");
        let (broker, _h) = Broker::spawn(64, 64, CancellationToken::new());
        let mut mailbox = broker.register().await.unwrap();

        let sampler = Sampler::new(rt, dir, broker, Duration::from_secs(10));
        assert_eq!(sampler.sample_once().await, 3);

        for _ in 0..3 {
            let ev = mailbox.recv().await.unwrap();
            assert_eq!(ev.kind, EventKind::ComponentStats);
        }
    }

    #[tokio::test]
    async fn query_failures_are_skipped() {
        let (rt, dir) = demo();
        rt.set_unavailable(true);
        let (broker, _h) = Broker::spawn(64, 64, CancellationToken::new());
        let sampler = Sampler::new(rt, dir, broker, Duration::from_secs(10));
        assert_eq!(sampler.sample_once().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_without_clients() {
        let (rt, dir) = demo();
        let (broker, _h) = Broker::spawn(64, 64, CancellationToken::new());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            Sampler::new(rt, dir, broker.clone(), Duration::from_secs(10)).run(cancel.clone()),
        );

        time::sleep(Duration::from_secs(25)).await;
        let mut mailbox = broker.register().await.unwrap();
        time::sleep(Duration::from_secs(10)).await;

        let ev = mailbox.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ComponentStats);
        assert_eq!(broker.dropped_events(), 0);

        cancel.cancel();
        task.await.unwrap();
    }
}
