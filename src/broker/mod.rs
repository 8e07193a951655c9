//! # Event broker and client serving.
//!
//! ```text
//! Watcher ────┐                                  ┌──► [mailbox A] ──► serve() ──► Transport A
//! Runner  ────┼──► Broker::broadcast ──► [intake] ┼──► [mailbox B] ──► serve() ──► Transport B
//! Reconciler ─┤      (try_send)         control   └──► [mailbox N] ──► serve() ──► Transport N
//! Sampler ────┘                          loop
//! ```
//!
//! - [`Broker`]: membership table owned by one control loop; register,
//!   unregister and fan-out are serialized through a single command queue.
//! - [`serve`]: drains one client's [`Mailbox`] onto a [`Transport`], writing a
//!   heartbeat after each idle interval.
//! - [`SseTransport`]: the axum server-sent-events transport.

mod broker;
mod serve;
mod sse;

pub use broker::{Broker, ClientId, Mailbox};
pub use serve::{pump, serve, Disconnect, Frame, Transport};
pub use sse::SseTransport;
