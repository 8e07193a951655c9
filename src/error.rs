//! Error types used by the gosei core and its collaborators.
//!
//! - [`BackendError`]: failures reported by the runtime client, the action
//!   executor or the group directory.
//! - [`BrokerError`]: the broker refused a request (it has shut down).
//! - [`TransportError`]: the subscriber side of a stream went away.
//! - [`UnknownOperation`]: an operation name outside the supported set.
//! - [`RuntimeError`]: process-level failures (config, bind, shutdown grace).
//!
//! Every enum exposes `as_label()`, a short stable snake_case label for logs.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by external collaborators.
///
/// These never cross the core's external boundary as-is: the runner folds them
/// into a completion message, the reconciler degrades them into `unknown`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BackendError {
    /// The requested entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("component", "group", ...).
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The backing system could not be reached or answered with an error.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Local I/O failure (spawning a process, reading a pipe, ...).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The call was aborted through its cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// Anything else, carried as a message.
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Shorthand for [`BackendError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        BackendError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use gosei::BackendError;
    ///
    /// let err = BackendError::not_found("component", "abc123");
    /// assert_eq!(err.as_label(), "backend_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BackendError::NotFound { .. } => "backend_not_found",
            BackendError::Unavailable(_) => "backend_unavailable",
            BackendError::Io(_) => "backend_io",
            BackendError::Cancelled => "backend_cancelled",
            BackendError::Other(_) => "backend_other",
        }
    }
}

/// Errors returned by [`Broker`](crate::Broker) handle calls.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker control loop has stopped; no new clients are accepted.
    #[error("broker is closed")]
    Closed,
}

/// Errors returned by a [`Transport`](crate::Transport) write.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The subscriber disconnected.
    #[error("transport closed")]
    Closed,
}

/// Returned when parsing an [`OperationKind`](crate::OperationKind) fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

/// # Errors produced by the process runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded while operations were still running.
    #[error("shutdown timeout {grace:?} exceeded; {pending} operation(s) still running")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Number of operations that had not finished.
        pending: usize,
    },

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// Listener or signal registration failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use gosei::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), pending: 2 };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Config(_) => "runtime_config",
            RuntimeError::Io(_) => "runtime_io",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, pending } => {
                format!("grace exceeded after {grace:?}; pending operations={pending}")
            }
            RuntimeError::Config(e) => format!("config: {e}"),
            RuntimeError::Io(e) => format!("io: {e}"),
        }
    }
}
