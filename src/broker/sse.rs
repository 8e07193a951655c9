//! Server-sent-events transport for axum.
//!
//! Frames are pushed into a small channel that backs the `Sse` response
//! body. Events become `event: <kind>` / `data: <json>` records; heartbeats
//! become the comment line `: keepalive`.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::response::sse::{Event as SseEvent, Sse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::serve::{Frame, Transport};
use crate::error::TransportError;

type SseItem = Result<SseEvent, Infallible>;

/// Transport writing into an axum `Sse` response.
pub struct SseTransport {
    tx: mpsc::Sender<SseItem>,
}

impl SseTransport {
    /// Creates the transport and the response that drains it.
    pub fn channel(buffer: usize) -> (Self, Sse<ReceiverStream<SseItem>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, Sse::new(ReceiverStream::new(rx)))
    }

    /// Child of `parent` that also fires as soon as the response body is
    /// dropped (the subscriber disconnected).
    pub fn session_token(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        let tx = self.tx.clone();
        let guard = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tx.closed() => guard.cancel(),
                _ = guard.cancelled() => {}
            }
        });
        token
    }
}

/// Renders a frame as an SSE record; `None` if the payload cannot be encoded.
pub(crate) fn render(frame: &Frame) -> Option<SseEvent> {
    match frame {
        Frame::Heartbeat => Some(SseEvent::default().comment("keepalive")),
        Frame::Event(ev) => match ev.data_json() {
            Ok(data) => Some(SseEvent::default().event(ev.kind.as_str()).data(data)),
            Err(e) => {
                warn!(kind = ev.kind.as_str(), error = %e, "event payload not encodable; skipped");
                None
            }
        },
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let Some(record) = render(&frame) else {
            return Ok(());
        };
        self.tx
            .send(Ok(record))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use std::sync::Arc;

    #[tokio::test]
    async fn dropped_response_fires_session_token() {
        let (mut transport, body) = SseTransport::channel(4);
        let parent = CancellationToken::new();
        let token = transport.session_token(&parent);
        assert!(!token.is_cancelled());

        drop(body);
        token.cancelled().await;
        assert!(!parent.is_cancelled());
        assert_eq!(
            transport.send(Frame::Heartbeat).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn parent_cancel_propagates() {
        let (transport, _body) = SseTransport::channel(4);
        let parent = CancellationToken::new();
        let token = transport.session_token(&parent);
        parent.cancel();
        token.cancelled().await;
    }

    #[test]
    fn renders_named_events_and_comments() {
        let frame = Frame::Event(Arc::new(Event::connected("abc")));
        assert!(render(&frame).is_some());
        assert!(render(&Frame::Heartbeat).is_some());
    }
}
