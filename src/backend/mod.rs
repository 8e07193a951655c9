//! # Collaborators consumed by the core.
//!
//! The core never talks to a container runtime directly. It depends on three
//! traits, each of which can be backed by a live system or by the in-memory
//! simulation:
//!
//! - [`RuntimeClient`]: component queries, lifecycle calls, logs, usage and
//!   the live component-event feed ([`EventFeed`]);
//! - [`ActionExecutor`]: runs one [`Verb`] against a group and streams its
//!   output;
//! - [`GroupDirectory`]: the read-only list of known groups.
//!
//! ## Implementations
//! - [`SimulatedRuntime`] / [`SimulatedExecutor`]: no runtime required
//!   (demo and tests);
//! - [`ComposeExecutor`]: `docker compose` subprocesses;
//! - [`InMemoryDirectory`]: groups held in memory.

mod compose;
mod directory;
mod executor;
mod runtime;
mod simulated;

pub use compose::ComposeExecutor;
pub use directory::{Group, GroupDirectory, InMemoryDirectory};
pub use executor::{ActionExecutor, ActionOutcome, OutputLine, Verb};
pub use runtime::{Component, EventFeed, LogStream, ResourceUsage, RuntimeClient, RuntimeEvent};
pub use simulated::{SimulatedExecutor, SimulatedRuntime};
