//! # Events distributed to dashboard viewers.
//!
//! The [`EventKind`] enum is the closed set of names on the wire:
//! - **Session**: `connected`
//! - **Runtime state**: `component:status`, `group:status`, `component:stats`
//! - **Operations**: `operation:output`, `operation:complete`
//! - **Logs**: `log`
//!
//! The [`Event`] struct pairs a kind with its [`Payload`], a timestamp and a
//! sequence number. Events are immutable; the broker shares them as
//! `Arc<Event>` across mailboxes.
//!
//! ## Ordering guarantees
//! Each event has a process-wide sequence number (`seq`) that increases
//! monotonically in creation order. Delivery order across independent
//! producers is broker-arrival order, not `seq` order.
//!
//! ## Example
//! ```rust
//! use gosei::events::{Event, EventKind, OperationComplete};
//!
//! let ev = Event::operation_complete(OperationComplete {
//!     operation_id: "op-1".into(),
//!     group_id: "webapp".into(),
//!     operation: "up".into(),
//!     success: true,
//!     message: "Operation completed successfully".into(),
//! });
//!
//! assert_eq!(ev.kind, EventKind::OperationComplete);
//! assert_eq!(ev.kind.as_str(), "operation:complete");
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};

use super::payload::{
    ComponentStats, ComponentStatus, Connected, GroupStatus, LogLine, OperationComplete,
    OperationOutput, Payload,
};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of dashboard events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Session handshake, first frame of every stream.
    ///
    /// Payload: [`Connected`]
    Connected,

    /// A component changed state according to the runtime feed.
    ///
    /// Payload: [`ComponentStatus`]
    ComponentStatus,

    /// A group's aggregate status was recomputed.
    ///
    /// Payload: [`GroupStatus`]
    GroupStatus,

    /// One output line of a running operation.
    ///
    /// Payload: [`OperationOutput`]
    OperationOutput,

    /// Terminal record of an operation (exactly one per operation).
    ///
    /// Payload: [`OperationComplete`]
    OperationComplete,

    /// One line of a followed component log.
    ///
    /// Payload: [`LogLine`]
    Log,

    /// Periodic resource usage sample.
    ///
    /// Payload: [`ComponentStats`]
    ComponentStats,
}

impl EventKind {
    /// Wire name used as the stream's `event:` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::ComponentStatus => "component:status",
            EventKind::GroupStatus => "group:status",
            EventKind::OperationOutput => "operation:output",
            EventKind::OperationComplete => "operation:complete",
            EventKind::Log => "log",
            EventKind::ComponentStats => "component:stats",
        }
    }
}

/// Immutable dashboard event.
///
/// - `seq`: monotonic global sequence
/// - `at`: wall-clock creation time
/// - `kind` and `payload` always agree (enforced by the constructors)
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Creation timestamp.
    pub at: DateTime<Utc>,
    /// Event classification.
    pub kind: EventKind,
    /// JSON body.
    pub payload: Payload,
}

impl Event {
    fn new(kind: EventKind, payload: Payload) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: Utc::now(),
            kind,
            payload,
        }
    }

    #[inline]
    pub fn connected(client_id: impl Into<String>) -> Self {
        Self::new(
            EventKind::Connected,
            Payload::Connected(Connected {
                client_id: client_id.into(),
            }),
        )
    }

    #[inline]
    pub fn component_status(status: ComponentStatus) -> Self {
        Self::new(EventKind::ComponentStatus, Payload::ComponentStatus(status))
    }

    #[inline]
    pub fn group_status(status: GroupStatus) -> Self {
        Self::new(EventKind::GroupStatus, Payload::GroupStatus(status))
    }

    #[inline]
    pub fn operation_output(output: OperationOutput) -> Self {
        Self::new(EventKind::OperationOutput, Payload::OperationOutput(output))
    }

    #[inline]
    pub fn operation_complete(complete: OperationComplete) -> Self {
        Self::new(
            EventKind::OperationComplete,
            Payload::OperationComplete(complete),
        )
    }

    #[inline]
    pub fn log(line: LogLine) -> Self {
        Self::new(EventKind::Log, Payload::Log(line))
    }

    #[inline]
    pub fn component_stats(stats: ComponentStats) -> Self {
        Self::new(EventKind::ComponentStats, Payload::ComponentStats(stats))
    }

    /// Serializes the payload as the JSON body of the stream frame.
    pub fn data_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.payload)
    }

    /// Correlation key of the group this event concerns, if any.
    pub fn group_id(&self) -> Option<&str> {
        match &self.payload {
            Payload::ComponentStatus(p) => p.group_id.as_deref(),
            Payload::GroupStatus(p) => Some(&p.group_id),
            Payload::OperationOutput(p) => Some(&p.group_id),
            Payload::OperationComplete(p) => Some(&p.group_id),
            Payload::Connected(_) | Payload::Log(_) | Payload::ComponentStats(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::connected("a");
        let b = Event::connected("b");
        assert!(b.seq > a.seq);
    }

    #[test]
    fn connected_carries_session_id() {
        let ev = Event::connected("client-42");
        assert_eq!(ev.kind.as_str(), "connected");
        assert_eq!(ev.data_json().unwrap(), r#"{"clientId":"client-42"}"#);
        assert_eq!(ev.group_id(), None);
    }

    #[test]
    fn group_correlation() {
        let ev = Event::operation_complete(OperationComplete {
            operation_id: "op-1".into(),
            group_id: "webapp".into(),
            operation: "up".into(),
            success: true,
            message: "done".into(),
        });
        assert_eq!(ev.group_id(), Some("webapp"));
    }
}
