use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::dashboard::Dashboard;
use super::logs::LogTail;
use super::reconciler::Reconciler;
use super::runner::OperationRunner;
use crate::backend::{
    ActionExecutor, ComposeExecutor, GroupDirectory, InMemoryDirectory, RuntimeClient,
    SimulatedExecutor, SimulatedRuntime,
};
use crate::broker::Broker;
use crate::config::{Config, ExecutorKind};
use crate::error::RuntimeError;

/// Builder for a [`Dashboard`].
///
/// Collaborators left unset fall back to the simulated backend: the demo
/// runtime, its groups, and the executor selected by [`Config::executor`].
///
/// [`ExecutorKind::Compose`] acts on real groups, so it is only accepted
/// together with an injected runtime and directory; `build` rejects it
/// otherwise instead of pairing it with simulated state.
pub struct DashboardBuilder {
    cfg: Config,
    runtime: Option<Arc<dyn RuntimeClient>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    directory: Option<Arc<dyn GroupDirectory>>,
    groups_root: PathBuf,
}

impl DashboardBuilder {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            runtime: None,
            executor: None,
            directory: None,
            groups_root: PathBuf::from("."),
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn RuntimeClient>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn GroupDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Parent directory of the demo groups' working locations.
    pub fn with_groups_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.groups_root = root.into();
        self
    }

    /// Wires every part and spawns the broker. Must run inside a tokio runtime.
    pub fn build(self) -> Result<Arc<Dashboard>, RuntimeError> {
        let cfg = self.cfg;

        let compose = self.executor.is_none() && matches!(cfg.executor, ExecutorKind::Compose);
        if compose && (self.runtime.is_none() || self.directory.is_none()) {
            return Err(RuntimeError::Config(config::ConfigError::Message(
                "executor `compose` needs an injected runtime client and group directory".into(),
            )));
        }

        let (runtime, simulated): (Arc<dyn RuntimeClient>, Option<Arc<SimulatedRuntime>>) =
            match self.runtime {
                Some(rt) => (rt, None),
                None => {
                    let sim = Arc::new(SimulatedRuntime::demo());
                    (sim.clone(), Some(sim))
                }
            };

        let directory: Arc<dyn GroupDirectory> = match (self.directory, &simulated) {
            (Some(dir), _) => dir,
            (None, Some(_)) => Arc::new(InMemoryDirectory::new(SimulatedRuntime::demo_groups(
                &self.groups_root,
            ))),
            (None, None) => Arc::new(InMemoryDirectory::default()),
        };

        let executor: Arc<dyn ActionExecutor> = match (self.executor, cfg.executor) {
            (Some(exec), _) => exec,
            (None, ExecutorKind::Compose) => Arc::new(ComposeExecutor::default()),
            (None, ExecutorKind::Simulated) => {
                let sim = simulated.unwrap_or_else(|| Arc::new(SimulatedRuntime::new()));
                Arc::new(SimulatedExecutor::new(sim))
            }
        };

        let cancel = CancellationToken::new();
        let broker_cancel = CancellationToken::new();
        let (broker, broker_task) = Broker::spawn(
            cfg.intake_capacity_clamped(),
            cfg.mailbox_capacity_clamped(),
            broker_cancel.clone(),
        );

        let reconciler = Arc::new(Reconciler::new(runtime.clone(), broker.clone()));
        let runner = OperationRunner::new(
            executor,
            broker.clone(),
            reconciler.clone(),
            cfg.output_buffer_clamped(),
            cancel.child_token(),
        );
        let log_tail = LogTail::new(runtime.clone(), cfg.log_tail, cfg.mailbox_capacity_clamped());

        Ok(Arc::new(Dashboard::new_internal(
            cfg,
            broker,
            broker_task,
            broker_cancel,
            runtime,
            directory,
            reconciler,
            runner,
            log_tail,
            cancel,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Group;

    fn compose_cfg() -> Config {
        Config {
            executor: ExecutorKind::Compose,
            sample_interval_secs: 0,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn compose_without_real_collaborators_is_rejected() {
        let err = DashboardBuilder::new(compose_cfg()).build().err().unwrap();
        assert_eq!(err.as_label(), "runtime_config");

        let rt: Arc<dyn RuntimeClient> = Arc::new(SimulatedRuntime::new());
        let err = DashboardBuilder::new(compose_cfg())
            .with_runtime(rt)
            .build()
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "runtime_config");
    }

    #[tokio::test]
    async fn compose_with_injected_collaborators_builds() {
        let dir = InMemoryDirectory::new([Group::new("shop", "/srv/shop", vec!["web".into()])]);
        let dash = DashboardBuilder::new(compose_cfg())
            .with_runtime(Arc::new(SimulatedRuntime::new()))
            .with_directory(Arc::new(dir))
            .build()
            .unwrap();
        assert_eq!(dash.groups().await.len(), 1);
        dash.shutdown().await.unwrap();
    }
}
