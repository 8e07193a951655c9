//! # Dashboard: wiring and lifecycle.
//!
//! The [`Dashboard`] owns the broker, the reconciler, the operation runner,
//! the log tail and the collaborators. [`Dashboard::start`] spawns the
//! long-lived loops; [`Dashboard::shutdown`] stops them.
//!
//! ```text
//! start():
//!   Watcher::run(cancel.child)  ─┐
//!   Sampler::run(cancel.child)  ─┴─► background handles
//!
//! shutdown():
//!   cancel ─► watcher, sampler, sessions, operations (child tokens)
//!          └─► wait (≤ grace): operations emit their terminal events,
//!                              background loops exit
//!                 ├─ Ok      → broker stopped, mailboxes closed
//!                 └─ timeout → broker stopped, RuntimeError::GraceExceeded
//! ```
//!
//! The broker is stopped last so terminal events of cancelled operations still
//! reach connected clients.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::builder::DashboardBuilder;
use super::logs::LogTail;
use super::reconciler::Reconciler;
use super::runner::{OperationKind, OperationRunner};
use super::sampler::Sampler;
use super::watcher::Watcher;
use crate::backend::{Group, GroupDirectory, RuntimeClient};
use crate::broker::Broker;
use crate::config::Config;
use crate::error::RuntimeError;
use crate::events::GroupStatus;
use crate::policies::BackoffPolicy;

/// A directory entry paired with its current aggregate status.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    #[serde(flatten)]
    pub group: Group,
    pub status: GroupStatus,
}

pub struct Dashboard {
    cfg: Config,
    broker: Broker,
    broker_task: Mutex<Option<JoinHandle<()>>>,
    broker_cancel: CancellationToken,
    runtime: Arc<dyn RuntimeClient>,
    directory: Arc<dyn GroupDirectory>,
    reconciler: Arc<Reconciler>,
    runner: OperationRunner,
    log_tail: LogTail,
    background: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl Dashboard {
    pub fn builder(cfg: Config) -> DashboardBuilder {
        DashboardBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: Config,
        broker: Broker,
        broker_task: JoinHandle<()>,
        broker_cancel: CancellationToken,
        runtime: Arc<dyn RuntimeClient>,
        directory: Arc<dyn GroupDirectory>,
        reconciler: Arc<Reconciler>,
        runner: OperationRunner,
        log_tail: LogTail,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            broker,
            broker_task: Mutex::new(Some(broker_task)),
            broker_cancel,
            runtime,
            directory,
            reconciler,
            runner,
            log_tail,
            background: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            cancel,
        }
    }

    /// Spawns the watcher and, if enabled, the sampler. Later calls are no-ops.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut handles = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let watcher = Watcher::new(
            self.runtime.clone(),
            self.broker.clone(),
            self.reconciler.clone(),
            BackoffPolicy::fixed(self.cfg.watch_retry()),
        );
        handles.push(tokio::spawn(watcher.run(self.cancel.child_token())));

        if let Some(every) = self.cfg.sample_interval() {
            let sampler = Sampler::new(
                self.runtime.clone(),
                self.directory.clone(),
                self.broker.clone(),
                every,
            );
            handles.push(tokio::spawn(sampler.run(self.cancel.child_token())));
        }
        info!(executor = ?self.cfg.executor, "dashboard started");
    }

    /// Cancels everything and waits up to the configured grace period.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        info!(in_flight = self.runner.in_flight(), "shutdown requested");
        self.cancel.cancel();

        let background: Vec<JoinHandle<()>> = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let grace = self.cfg.grace();
        let drained = tokio::time::timeout(grace, async {
            self.runner.wait().await;
            for h in background {
                let _ = h.await;
            }
        })
        .await;

        self.broker_cancel.cancel();
        let broker_task = self
            .broker_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = broker_task {
            let _ = task.await;
        }

        match drained {
            Ok(()) => {
                info!("all tasks stopped within grace");
                Ok(())
            }
            Err(_) => {
                let pending = self.runner.in_flight();
                warn!(?grace, pending, "grace exceeded");
                Err(RuntimeError::GraceExceeded { grace, pending })
            }
        }
    }

    /// Looks up `group_id` and launches `kind` against it.
    ///
    /// Returns `None` for an unknown group.
    pub async fn launch(&self, kind: OperationKind, group_id: &str) -> Option<String> {
        let group = self.directory.get_group(group_id).await?;
        Some(self.runner.launch(kind, group))
    }

    /// Every known group with a freshly reconciled status.
    pub async fn groups(&self) -> Vec<GroupView> {
        let mut out = Vec::new();
        for group in self.directory.list_groups().await {
            let status = self.reconciler.reconcile(&group.id).await;
            out.push(GroupView { group, status });
        }
        out
    }

    /// One group with a freshly reconciled status.
    pub async fn group(&self, group_id: &str) -> Option<GroupView> {
        let group = self.directory.get_group(group_id).await?;
        let status = self.reconciler.reconcile(&group.id).await;
        Some(GroupView { group, status })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn runtime(&self) -> &Arc<dyn RuntimeClient> {
        &self.runtime
    }

    pub fn log_tail(&self) -> &LogTail {
        &self.log_tail
    }

    /// Token for one subscriber session; fires on shutdown.
    pub fn session_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }
}
