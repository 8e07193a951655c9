//! # gosei
//!
//! **gosei** is the live core of a container-group dashboard. It watches a
//! container runtime, runs group operations, keeps an aggregate status per
//! group and pushes every change to connected viewers as a server-sent event
//! stream.
//!
//! ## Architecture
//! ```text
//!   runtime event feed          HTTP: POST /api/groups/:id/:op
//!          │                                 │
//!          ▼                                 ▼
//!   ┌──────────────┐              ┌────────────────────┐
//!   │   Watcher    │              │  OperationRunner   │──► ActionExecutor
//!   │ (resubscribe │              │ (one task per op)  │     (compose / simulated)
//!   │  on failure) │              └─────────┬──────────┘
//!   └──────┬───────┘                        │ operation:output / :complete
//!          │ component:status               │
//!          ├──────────► Reconciler ◄────────┤ (after the terminal event)
//!          │          (group:status)        │
//!          ▼                 │              ▼
//! ┌──────────────────────────┴───────────────────────────────────────┐
//! │                  Broker (single control loop)                    │
//! │        register / unregister / broadcast, per-client mailboxes   │
//! └──────┬──────────────────────┬───────────────────────┬────────────┘
//!        ▼                      ▼                       ▼
//!    [mailbox]              [mailbox]               [mailbox]
//!        │                      │                       │
//!   serve() → SSE          serve() → SSE           serve() → SSE
//!   (heartbeat on idle)
//! ```
//!
//! A [`Sampler`] adds `component:stats` while viewers are connected, and a
//! [`LogTail`] serves per-component log streams through the same serving loop.
//!
//! ## Wire events
//! `connected`, `component:status`, `group:status`, `operation:output`,
//! `operation:complete`, `log`, `component:stats`; see [`events`].
//!
//! ## Example
//! ```rust
//! use gosei::{Config, Dashboard};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config { sample_interval_secs: 0, ..Config::default() };
//!     // No collaborators set: simulated runtime with the demo groups.
//!     let dashboard = Dashboard::builder(cfg).build()?;
//!     dashboard.start();
//!
//!     let groups = dashboard.groups().await;
//!     assert_eq!(groups.len(), 2);
//!
//!     dashboard.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
mod broker;
mod config;
mod core;
mod error;
pub mod events;
pub mod http;
pub mod logging;
mod policies;

pub use broker::{pump, serve, Broker, ClientId, Disconnect, Frame, Mailbox, SseTransport, Transport};
pub use config::{Config, ExecutorKind};
pub use core::{
    demux, wait_for_shutdown_signal, Dashboard, DashboardBuilder, GroupView, LogTail,
    OperationKind, OperationRunner, Reconciler, Sampler, Watcher,
};
pub use error::{BackendError, BrokerError, RuntimeError, TransportError, UnknownOperation};
pub use policies::BackoffPolicy;
