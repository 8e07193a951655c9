//! # Broker control loop.
//!
//! The [`Broker`] handle is cheap to clone. Every call turns into a command on
//! one bounded intake queue; the control loop applies commands strictly in
//! arrival order, so a client registered before a broadcast always sees it and
//! a client unregistered before a broadcast never does.
//!
//! ## Rules
//! - `broadcast` never blocks: a saturated intake drops the event with a warning.
//! - Fan-out uses `try_send`: a full mailbox drops the event for that client only.
//! - A mailbox whose receiver is gone is pruned during fan-out.
//! - After shutdown every mailbox is closed, `register` fails with
//!   [`BrokerError::Closed`] and `broadcast` is a no-op.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::BrokerError;
use crate::events::Event;

/// Session identifier handed to a subscriber in its `connected` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receiving end of one client's queue.
#[derive(Debug)]
pub struct Mailbox {
    id: ClientId,
    rx: mpsc::Receiver<Arc<Event>>,
}

impl Mailbox {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Next event; `None` once the broker has removed this client.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    pub(crate) fn receiver(&mut self) -> &mut mpsc::Receiver<Arc<Event>> {
        &mut self.rx
    }
}

enum Command {
    Register {
        id: ClientId,
        tx: mpsc::Sender<Arc<Event>>,
    },
    Unregister(ClientId),
    Broadcast(Arc<Event>),
}

struct Client {
    tx: mpsc::Sender<Arc<Event>>,
    connected_at: DateTime<Utc>,
    dropped: u64,
}

/// Handle to the broker control loop.
#[derive(Clone)]
pub struct Broker {
    intake: mpsc::Sender<Command>,
    clients: Arc<AtomicUsize>,
    dropped: Arc<AtomicU64>,
    mailbox_capacity: usize,
}

impl Broker {
    /// Spawns the control loop.
    ///
    /// The loop stops when `cancel` fires or every handle is dropped.
    pub fn spawn(
        intake_capacity: usize,
        mailbox_capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (intake, rx) = mpsc::channel(intake_capacity.max(1));
        let clients = Arc::new(AtomicUsize::new(0));
        let handle = tokio::spawn(control_loop(rx, Arc::clone(&clients), cancel));
        let broker = Self {
            intake,
            clients,
            dropped: Arc::new(AtomicU64::new(0)),
            mailbox_capacity: mailbox_capacity.max(1),
        };
        (broker, handle)
    }

    /// Adds a client and returns its mailbox.
    ///
    /// Effective for every broadcast submitted after this call returns.
    pub async fn register(&self) -> Result<Mailbox, BrokerError> {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        self.intake
            .send(Command::Register { id, tx })
            .await
            .map_err(|_| BrokerError::Closed)?;
        Ok(Mailbox { id, rx })
    }

    /// Removes a client and closes its mailbox. Unknown ids are ignored.
    pub async fn unregister(&self, id: ClientId) {
        let _ = self.intake.send(Command::Unregister(id)).await;
    }

    /// Queues `event` for every registered client without waiting.
    pub fn broadcast(&self, event: Event) {
        match self.intake.try_send(Command::Broadcast(Arc::new(event))) {
            Ok(()) => {}
            Err(TrySendError::Full(Command::Broadcast(ev))) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = ev.kind.as_str(), seq = ev.seq, "broker intake saturated; event dropped");
            }
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    /// Events dropped because the intake was saturated.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// True once the control loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.intake.is_closed()
    }
}

async fn control_loop(
    mut rx: mpsc::Receiver<Command>,
    gauge: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    let mut clients: HashMap<ClientId, Client> = HashMap::new();

    loop {
        let cmd = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            cmd = rx.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };

        match cmd {
            Command::Register { id, tx } => {
                clients.insert(
                    id,
                    Client {
                        tx,
                        connected_at: Utc::now(),
                        dropped: 0,
                    },
                );
                gauge.store(clients.len(), Ordering::Relaxed);
                info!(client_id = %id, clients = clients.len(), "client connected");
            }
            Command::Unregister(id) => {
                if let Some(client) = clients.remove(&id) {
                    gauge.store(clients.len(), Ordering::Relaxed);
                    let secs = (Utc::now() - client.connected_at).num_seconds();
                    info!(
                        client_id = %id,
                        clients = clients.len(),
                        dropped = client.dropped,
                        connected_secs = secs,
                        "client disconnected"
                    );
                }
            }
            Command::Broadcast(ev) => {
                let before = clients.len();
                clients.retain(|id, client| match client.tx.try_send(Arc::clone(&ev)) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        client.dropped += 1;
                        debug!(
                            client_id = %id,
                            kind = ev.kind.as_str(),
                            group = ev.group_id().unwrap_or("-"),
                            "mailbox full; event dropped"
                        );
                        true
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(client_id = %id, "mailbox closed; client pruned");
                        false
                    }
                });
                if clients.len() != before {
                    gauge.store(clients.len(), Ordering::Relaxed);
                }
            }
        }
    }

    rx.close();
    let remaining = clients.len();
    clients.clear();
    gauge.store(0, Ordering::Relaxed);
    info!(clients = remaining, "broker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn ev(name: &str) -> Event {
        Event::connected(name)
    }

    fn client_of(ev: &Event) -> String {
        ev.data_json().unwrap()
    }

    #[tokio::test]
    async fn membership_follows_register_and_unregister() {
        let (broker, _h) = Broker::spawn(16, 8, CancellationToken::new());

        let mut a = broker.register().await.unwrap();
        let mut b = broker.register().await.unwrap();
        broker.broadcast(ev("e1"));
        broker.unregister(a.id()).await;
        broker.unregister(a.id()).await;
        broker.broadcast(ev("e2"));
        let c = broker.register().await.unwrap();
        broker.unregister(c.id()).await;
        let mut d = broker.register().await.unwrap();
        broker.broadcast(ev("e3"));

        assert_eq!(client_of(&d.recv().await.unwrap()), r#"{"clientId":"e3"}"#);
        assert_eq!(broker.client_count(), 2);

        assert_eq!(client_of(&a.recv().await.unwrap()), r#"{"clientId":"e1"}"#);
        assert!(a.recv().await.is_none());

        assert_eq!(client_of(&b.recv().await.unwrap()), r#"{"clientId":"e1"}"#);
        assert_eq!(client_of(&b.recv().await.unwrap()), r#"{"clientId":"e2"}"#);
        assert_eq!(client_of(&b.recv().await.unwrap()), r#"{"clientId":"e3"}"#);
    }

    #[tokio::test]
    async fn full_mailbox_drops_for_that_client_only() {
        let (broker, _h) = Broker::spawn(16, 2, CancellationToken::new());
        let mut slow = broker.register().await.unwrap();
        let mut fast = broker.register().await.unwrap();

        for i in 0..5 {
            broker.broadcast(ev(&format!("e{i}")));
            let got = fast.recv().await.unwrap();
            assert_eq!(client_of(&got), format!(r#"{{"clientId":"e{i}"}}"#));
        }

        assert_eq!(client_of(&slow.recv().await.unwrap()), r#"{"clientId":"e0"}"#);
        assert_eq!(client_of(&slow.recv().await.unwrap()), r#"{"clientId":"e1"}"#);

        broker.broadcast(ev("e5"));
        assert_eq!(client_of(&fast.recv().await.unwrap()), r#"{"clientId":"e5"}"#);
        assert_eq!(client_of(&slow.recv().await.unwrap()), r#"{"clientId":"e5"}"#);
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned() {
        let (broker, _h) = Broker::spawn(16, 4, CancellationToken::new());
        let gone = broker.register().await.unwrap();
        let mut kept = broker.register().await.unwrap();
        drop(gone);

        broker.broadcast(ev("x"));
        assert_eq!(kept.recv().await.unwrap().kind, EventKind::Connected);
        assert_eq!(broker.client_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_mailboxes_and_rejects_registers() {
        let cancel = CancellationToken::new();
        let (broker, handle) = Broker::spawn(16, 4, cancel.clone());
        let mut a = broker.register().await.unwrap();

        cancel.cancel();
        handle.await.unwrap();

        assert!(a.recv().await.is_none());
        assert!(broker.is_closed());
        assert_eq!(broker.register().await.unwrap_err(), BrokerError::Closed);
        broker.broadcast(ev("late"));
        assert_eq!(broker.client_count(), 0);
    }

    #[tokio::test]
    async fn saturated_intake_drops_broadcasts() {
        let cancel = CancellationToken::new();
        let (broker, handle) = Broker::spawn(1, 4, cancel.clone());
        // Stop the loop first so nothing drains the intake.
        cancel.cancel();
        handle.await.unwrap();
        // Closed intake: silent no-op, not counted.
        broker.broadcast(ev("a"));
        assert_eq!(broker.dropped_events(), 0);

        let (tx, _rx) = mpsc::channel(1);
        let stalled = Broker {
            intake: tx,
            clients: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            mailbox_capacity: 1,
        };
        stalled.broadcast(ev("fits"));
        stalled.broadcast(ev("overflow"));
        stalled.broadcast(ev("overflow"));
        assert_eq!(stalled.dropped_events(), 2);
    }
}
