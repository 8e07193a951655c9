//! Dashboard core: the loops that turn runtime activity into events.
//!
//! - [`reconciler`]: aggregate group status, published as `group:status`;
//! - [`runner`]: operations (one task each) with streamed output;
//! - [`watcher`]: the runtime event feed, resubscribed after failures;
//! - [`sampler`]: periodic `component:stats` while clients are connected;
//! - [`logs`]: per-session log tails;
//! - [`dashboard`] / [`builder`]: wiring and lifecycle;
//! - [`shutdown`]: termination signal handling for the binary.

mod builder;
mod dashboard;
mod logs;
mod reconciler;
mod runner;
mod sampler;
mod shutdown;
mod watcher;

pub use builder::DashboardBuilder;
pub use dashboard::{Dashboard, GroupView};
pub use logs::{demux, LogTail};
pub use reconciler::Reconciler;
pub use runner::{OperationKind, OperationRunner};
pub use sampler::Sampler;
pub use shutdown::wait_for_shutdown_signal;
pub use watcher::Watcher;
