//! Dashboard events: kinds, payloads and the immutable [`Event`] envelope.
//!
//! This module groups the event **data model** distributed by the
//! [`Broker`](crate::Broker). Producers (watcher, runner, reconciler, sampler,
//! log tail) build events with the typed constructors on [`Event`]; consumers
//! only ever see `Arc<Event>` and never mutate it.
//!
//! ## Contents
//! - [`EventKind`]: closed set of wire event names
//! - [`Payload`] and its structs: the JSON body carried by each kind
//! - [`Event`]: `seq` + timestamp + kind + payload

mod event;
mod payload;

pub use event::{Event, EventKind};
pub use payload::{
    ComponentState, ComponentStats, ComponentStatus, Connected, GroupState, GroupStatus, LogLine,
    OperationComplete, OperationOutput, OutputStream, Payload,
};
