//! # Component log tailing.
//!
//! [`LogTail::open`] follows one component's log and turns every non-blank
//! line into a `log` event on a private queue. The queue is served with the
//! same [`pump`](crate::broker::pump) as broker mailboxes, so log sessions get
//! heartbeats too.
//!
//! Runtime log streams may prefix each line with an 8-byte multiplexing
//! header (`[stream, 0, 0, 0, len₀, len₁, len₂, len₃]`); it is stripped and
//! its stream byte decides stdout/stderr.
//!
//! [`LogTail::snapshot`] returns the last lines without following; a leading
//! RFC 3339 timestamp becomes the line's timestamp.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::watcher::short_id;
use crate::backend::RuntimeClient;
use crate::error::BackendError;
use crate::events::{Event, LogLine, OutputStream};

const HEADER_LEN: usize = 8;

/// Splits off the multiplexing header, if present.
pub fn demux(raw: &str) -> (OutputStream, &str) {
    let b = raw.as_bytes();
    if b.len() >= HEADER_LEN && b[0] <= 2 && b[1..4] == [0, 0, 0] {
        if let Some(rest) = raw.get(HEADER_LEN..) {
            let stream = if b[0] == 2 {
                OutputStream::Stderr
            } else {
                OutputStream::Stdout
            };
            return (stream, rest);
        }
    }
    (OutputStream::Stdout, raw)
}

/// Splits a leading RFC 3339 timestamp off `line`, falling back to now.
fn split_timestamp(line: &str) -> (DateTime<Utc>, &str) {
    if let Some((head, rest)) = line.split_once(' ') {
        if let Ok(at) = DateTime::parse_from_rfc3339(head) {
            return (at.with_timezone(&Utc), rest);
        }
    }
    (Utc::now(), line)
}

#[derive(Clone)]
pub struct LogTail {
    runtime: Arc<dyn RuntimeClient>,
    tail: usize,
    buffer: usize,
}

impl LogTail {
    pub fn new(runtime: Arc<dyn RuntimeClient>, tail: usize, buffer: usize) -> Self {
        Self {
            runtime,
            tail,
            buffer: buffer.max(1),
        }
    }

    /// Starts following `id`; the queue closes when the log ends, the reader
    /// goes away or `cancel` fires.
    pub async fn open(
        &self,
        id: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Arc<Event>>, BackendError> {
        let component = self.runtime.get_component(id).await?;
        let mut lines = self
            .runtime
            .logs(&component.id, self.tail, true, cancel.clone())
            .await?;
        let component_id = short_id(&component.id);
        let name = component.name.trim_start_matches('/').to_string();

        let (tx, rx) = mpsc::channel(self.buffer);
        tokio::spawn(async move {
            loop {
                let raw = tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = lines.next() => match item {
                        Some(Ok(raw)) => raw,
                        Some(Err(e)) => {
                            debug!(component = %name, error = %e, "log stream failed");
                            break;
                        }
                        None => break,
                    },
                };
                let (stream, line) = demux(&raw);
                let line = line.trim_end();
                if line.trim().is_empty() {
                    continue;
                }
                let ev = Event::log(LogLine {
                    component_id: component_id.clone(),
                    component: name.clone(),
                    line: line.to_string(),
                    stream,
                    timestamp: Utc::now(),
                });
                if tx.send(Arc::new(ev)).await.is_err() {
                    break;
                }
            }
            debug!(component = %name, "log tail ended");
        });
        Ok(rx)
    }

    /// Last `tail` lines of `id` (the configured tail when `None`).
    pub async fn snapshot(&self, id: &str, tail: Option<usize>) -> Result<Vec<LogLine>, BackendError> {
        let component = self.runtime.get_component(id).await?;
        let raw: Vec<Result<String, BackendError>> = self
            .runtime
            .logs(&component.id, tail.unwrap_or(self.tail), false, CancellationToken::new())
            .await?
            .collect()
            .await;
        let component_id = short_id(&component.id);
        let name = component.name.trim_start_matches('/').to_string();

        let mut out = Vec::with_capacity(raw.len());
        for item in raw {
            let raw = item?;
            let (stream, line) = demux(&raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (timestamp, line) = split_timestamp(line);
            out.push(LogLine {
                component_id: component_id.clone(),
                component: name.clone(),
                line: line.to_string(),
                stream,
                timestamp,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedRuntime;
    use crate::events::Payload;

    #[test]
    fn strips_header_and_picks_stream() {
        let raw = "\u{2}\0\0\0\0\0\0\u{5}oops!";
        assert_eq!(demux(raw), (OutputStream::Stderr, "oops!"));

        let raw = "\u{1}\0\0\0\0\0\0\u{3}hey";
        assert_eq!(demux(raw), (OutputStream::Stdout, "hey"));

        assert_eq!(demux("plain line"), (OutputStream::Stdout, "plain line"));
        assert_eq!(demux("short"), (OutputStream::Stdout, "short"));
    }

    #[tokio::test(start_paused = true)]
    async fn history_then_follow() {
        let rt = Arc::new(SimulatedRuntime::new());
        let c = SimulatedRuntime::component("shop", "web", "nginx", true);
        let id = c.id.clone();
        rt.insert(c);

        let tail = LogTail::new(rt, 3, 16);
        let cancel = CancellationToken::new();
        let mut rx = tail.open(&id[..8], cancel.clone()).await.unwrap();

        for _ in 0..4 {
            let ev = rx.recv().await.unwrap();
            match &ev.payload {
                Payload::Log(l) => {
                    assert_eq!(l.component, "shop-web-1");
                    assert_eq!(l.component_id, &id[..12]);
                    assert!(!l.line.is_empty());
                }
                other => panic!("unexpected payload {other:?}"),
            }
        }

        cancel.cancel();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn snapshot_returns_tail_without_following() {
        let rt = Arc::new(SimulatedRuntime::new());
        let c = SimulatedRuntime::component("shop", "db", "postgres", true);
        let id = c.id.clone();
        rt.insert(c);

        let tail = LogTail::new(rt, 100, 16);
        let lines = tail.snapshot(&id, Some(5)).await.unwrap();
        assert_eq!(lines.len(), 5);
        for l in &lines {
            assert_eq!(l.component_id, &id[..12]);
            assert!(l.line.starts_with("[INFO] shop-db-1:"), "{}", l.line);
        }
    }

    #[test]
    fn leading_timestamp_is_split_off() {
        let (at, rest) = split_timestamp("2024-05-01T10:00:00.250Z ready to accept connections");
        assert_eq!(at.to_rfc3339(), "2024-05-01T10:00:00.250+00:00");
        assert_eq!(rest, "ready to accept connections");

        let (_, rest) = split_timestamp("no timestamp here");
        assert_eq!(rest, "no timestamp here");
    }

    #[tokio::test]
    async fn unknown_component_fails() {
        let tail = LogTail::new(Arc::new(SimulatedRuntime::new()), 3, 16);
        let err = tail.open("nope", CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.as_label(), "backend_not_found");
    }
}
