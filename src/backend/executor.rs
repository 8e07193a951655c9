//! # Action executor contract.
//!
//! An [`ActionExecutor`] runs one primitive [`Verb`] against a group's working
//! location. Output lines are pushed into the provided channel as they are
//! produced; the return value is the action's own verdict.
//!
//! Returning `Err` means the action could not be carried out at all (missing
//! manifest, spawn failure, cancellation). A completed action that failed is
//! `Ok(ActionOutcome { success: false, .. })`.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::directory::Group;
use crate::error::BackendError;
use crate::events::OutputStream;

/// Primitive verbs understood by executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Up,
    Down,
    Pull,
    Restart,
    /// Recreate every component even when its configuration is unchanged.
    Recreate,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Up => "up",
            Verb::Down => "down",
            Verb::Pull => "pull",
            Verb::Restart => "restart",
            Verb::Recreate => "recreate",
        }
    }

    /// Arguments passed after `compose -f <file>`.
    pub fn compose_args(&self) -> &'static [&'static str] {
        match self {
            Verb::Up => &["up", "-d", "--remove-orphans"],
            Verb::Down => &["down", "--remove-orphans"],
            Verb::Pull => &["pull"],
            Verb::Restart => &["restart"],
            Verb::Recreate => &["up", "-d", "--remove-orphans", "--force-recreate"],
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line produced by an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub line: String,
    pub stream: OutputStream,
}

impl OutputLine {
    pub fn stdout(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            stream: OutputStream::Stdout,
        }
    }

    pub fn stderr(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            stream: OutputStream::Stderr,
        }
    }
}

/// Verdict reported by an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Contract for running workload actions.
#[async_trait]
pub trait ActionExecutor: Send + Sync + 'static {
    /// Executes `verb` for `group`, streaming lines into `output`.
    ///
    /// Implementations must stop promptly and return
    /// [`BackendError::Cancelled`] once `cancel` fires.
    async fn execute(
        &self,
        verb: Verb,
        group: &Group,
        output: mpsc::Sender<OutputLine>,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, BackendError>;
}
