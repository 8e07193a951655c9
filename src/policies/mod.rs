//! Retry policies.
//!
//! The watcher resubscribes to the runtime feed after every failure; the
//! delay between attempts comes from a [`BackoffPolicy`].
//!
//! ```text
//! Watcher ── feed ended ──► backoff.wait(attempt, &cancel) ──► watch() again
//! ```
//!
//! `BackoffPolicy::fixed(d)` (factor 1.0) is the default used by the watcher.

mod backoff;

pub use backoff::BackoffPolicy;
