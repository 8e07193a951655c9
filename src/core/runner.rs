//! # Operation runner.
//!
//! [`OperationRunner::launch`] accepts an operation and returns its id at
//! once; the work runs on its own task.
//!
//! ## Flow
//! ```text
//! launch(kind, group) ─► operation id
//!     └─► task:
//!           executor.execute(verb₀) ─► executor.execute(verb₁) ...   (stop at first failure)
//!              │ output lines
//!              ▼
//!           relay ─► operation:output ─► Broker       (arrival order)
//!           ───────────────────────────────────────────
//!           operation:complete {success, message}      (exactly once)
//!           reconciler.reconcile(group) ─► group:status
//! ```
//!
//! ## Rules
//! - `update` expands to `pull`, `recreate`; a failed `pull` ends the operation
//!   with pull's message and `recreate` never runs.
//! - Executor errors are folded into the terminal event; cancellation of
//!   unfinished work yields `operation cancelled`.
//! - Each operation gets a child cancellation token; operations never cancel
//!   each other. Operations on the same group are not serialized.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use uuid::Uuid;

use super::reconciler::Reconciler;
use crate::backend::{ActionExecutor, ActionOutcome, Group, OutputLine, Verb};
use crate::broker::Broker;
use crate::error::{BackendError, UnknownOperation};
use crate::events::{Event, OperationComplete, OperationOutput};

/// Operations a client can request for a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Up,
    Down,
    Pull,
    Restart,
    /// Pull then recreate.
    Update,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Up => "up",
            OperationKind::Down => "down",
            OperationKind::Pull => "pull",
            OperationKind::Restart => "restart",
            OperationKind::Update => "update",
        }
    }

    /// Executor verbs, run in order.
    pub fn steps(&self) -> &'static [Verb] {
        match self {
            OperationKind::Up => &[Verb::Up],
            OperationKind::Down => &[Verb::Down],
            OperationKind::Pull => &[Verb::Pull],
            OperationKind::Restart => &[Verb::Restart],
            OperationKind::Update => &[Verb::Pull, Verb::Recreate],
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(OperationKind::Up),
            "down" => Ok(OperationKind::Down),
            "pull" => Ok(OperationKind::Pull),
            "restart" => Ok(OperationKind::Restart),
            "update" => Ok(OperationKind::Update),
            other => Err(UnknownOperation(other.to_string())),
        }
    }
}

/// Launches operations and tracks the in-flight ones.
#[derive(Clone)]
pub struct OperationRunner {
    executor: Arc<dyn ActionExecutor>,
    broker: Broker,
    reconciler: Arc<Reconciler>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    output_buffer: usize,
}

impl OperationRunner {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        broker: Broker,
        reconciler: Arc<Reconciler>,
        output_buffer: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executor,
            broker,
            reconciler,
            tracker: TaskTracker::new(),
            cancel,
            output_buffer: output_buffer.max(1),
        }
    }

    /// Starts `kind` against `group` and returns the operation id.
    pub fn launch(&self, kind: OperationKind, group: Group) -> String {
        let operation_id = Uuid::new_v4().to_string();
        let op = Operation {
            id: operation_id.clone(),
            kind,
            group,
            cancel: self.cancel.child_token(),
        };
        let this = self.clone();
        self.tracker.spawn(async move { this.run(op).await });
        operation_id
    }

    /// Number of operations still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Closes the tracker and waits until every operation has finished.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    async fn run(&self, op: Operation) {
        info!(operation_id = %op.id, group = %op.group.id, kind = %op.kind, "operation started");

        let (tx, mut rx) = mpsc::channel::<OutputLine>(self.output_buffer);
        let relay = async {
            while let Some(out) = rx.recv().await {
                self.broker.broadcast(Event::operation_output(OperationOutput {
                    operation_id: op.id.clone(),
                    group_id: op.group.id.clone(),
                    operation: op.kind.as_str().to_string(),
                    line: out.line,
                    stream: out.stream,
                }));
            }
        };
        let exec = async {
            // Work that finished on the same poll keeps its real outcome.
            tokio::select! {
                biased;
                res = run_steps(self.executor.as_ref(), &op, tx) => res,
                _ = op.cancel.cancelled() => Err(BackendError::Cancelled),
            }
        };
        let (result, ()) = tokio::join!(exec, relay);

        let (success, message) = match result {
            Ok(ActionOutcome { success, message }) => (success, message),
            Err(BackendError::Cancelled) => (false, "operation cancelled".to_string()),
            Err(e) => (false, e.to_string()),
        };
        if success {
            info!(operation_id = %op.id, group = %op.group.id, kind = %op.kind, "operation finished");
        } else {
            warn!(operation_id = %op.id, group = %op.group.id, kind = %op.kind, %message, "operation failed");
        }

        self.broker
            .broadcast(Event::operation_complete(OperationComplete {
                operation_id: op.id.clone(),
                group_id: op.group.id.clone(),
                operation: op.kind.as_str().to_string(),
                success,
                message,
            }));
        self.reconciler.reconcile(&op.group.id).await;
    }
}

struct Operation {
    id: String,
    kind: OperationKind,
    group: Group,
    cancel: CancellationToken,
}

/// Runs every step of `op`, stopping at the first unsuccessful one.
async fn run_steps(
    executor: &dyn ActionExecutor,
    op: &Operation,
    output: mpsc::Sender<OutputLine>,
) -> Result<ActionOutcome, BackendError> {
    let mut last = ActionOutcome::ok("Operation completed successfully");
    for verb in op.kind.steps() {
        let outcome = executor
            .execute(*verb, &op.group, output.clone(), op.cancel.clone())
            .await?;
        if !outcome.success {
            return Ok(outcome);
        }
        last = outcome;
    }
    Ok(last)
}
