//! # Serving one client.
//!
//! [`serve`] registers a client, writes the `connected` handshake and then
//! forwards mailbox events to a [`Transport`] until one side goes away.
//!
//! ```text
//! register ─► Frame::Event(connected) ─► loop {
//!                 cancel fired        → Disconnect::Cancelled
//!                 mailbox event       → Frame::Event, idle timer reset
//!                 mailbox closed      → Disconnect::MailboxClosed
//!                 idle timer elapsed  → Frame::Heartbeat
//!                 transport error     → Disconnect::TransportClosed
//!             } ─► unregister
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::broker::Broker;
use crate::error::{BrokerError, TransportError};
use crate::events::Event;

/// Unit written to a transport.
#[derive(Debug, Clone)]
pub enum Frame {
    Event(Arc<Event>),
    /// Idle keepalive; carries no data.
    Heartbeat,
}

/// Output side of one subscriber session.
#[async_trait]
pub trait Transport: Send {
    /// Writes one frame; an error ends the session.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;
}

/// Why a serving loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The session's cancellation token fired.
    Cancelled,
    /// The broker closed the mailbox (unregister or shutdown).
    MailboxClosed,
    /// The transport refused a write.
    TransportClosed,
}

/// Serves one broker client over `transport` until disconnect.
///
/// Returns [`BrokerError::Closed`] if the broker has already shut down.
pub async fn serve<T: Transport>(
    broker: &Broker,
    mut transport: T,
    heartbeat: Duration,
    cancel: CancellationToken,
) -> Result<Disconnect, BrokerError> {
    let mut mailbox = broker.register().await?;
    let id = mailbox.id();

    let reason = match transport
        .send(Frame::Event(Arc::new(Event::connected(id.to_string()))))
        .await
    {
        Ok(()) => pump(mailbox.receiver(), &mut transport, heartbeat, &cancel).await,
        Err(_) => Disconnect::TransportClosed,
    };

    broker.unregister(id).await;
    debug!(client_id = %id, ?reason, "serving loop ended");
    Ok(reason)
}

/// Forwards `rx` to `transport`, writing a heartbeat after each `heartbeat`
/// of silence.
pub async fn pump<T: Transport + ?Sized>(
    rx: &mut mpsc::Receiver<Arc<Event>>,
    transport: &mut T,
    heartbeat: Duration,
    cancel: &CancellationToken,
) -> Disconnect {
    let heartbeat = heartbeat.max(Duration::from_millis(1));
    let mut idle = time::interval_at(Instant::now() + heartbeat, heartbeat);
    idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Disconnect::Cancelled,
            ev = rx.recv() => match ev {
                Some(ev) => {
                    idle.reset();
                    Frame::Event(ev)
                }
                None => return Disconnect::MailboxClosed,
            },
            _ = idle.tick() => Frame::Heartbeat,
        };

        if transport.send(frame).await.is_err() {
            return Disconnect::TransportClosed;
        }
    }
}
