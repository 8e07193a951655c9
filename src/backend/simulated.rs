//! # In-memory runtime and executor.
//!
//! [`SimulatedRuntime`] keeps a table of components and fans state changes out
//! to every open [`EventFeed`]. [`SimulatedExecutor`] produces compose-like
//! progress output and applies the verb's effect to the runtime, so the whole
//! pipeline (operation, feed event, reconciliation) can run without a
//! container engine.
//!
//! Test hooks:
//! - [`SimulatedRuntime::fail_feeds`] / [`SimulatedRuntime::close_feeds`] end
//!   every open subscription;
//! - [`SimulatedRuntime::set_unavailable`] makes queries fail;
//! - [`SimulatedRuntime::emit`] pushes a raw event without touching state;
//! - [`SimulatedExecutor::fail_on`] makes one verb report failure.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::directory::Group;
use super::executor::{ActionExecutor, ActionOutcome, OutputLine, Verb};
use super::runtime::{Component, EventFeed, LogStream, ResourceUsage, RuntimeClient, RuntimeEvent};
use crate::error::BackendError;
use crate::events::ComponentState;

const FEED_CAPACITY: usize = 64;
const LOG_FOLLOW_PERIOD: Duration = Duration::from_secs(2);
const MEMORY_LIMIT: u64 = 1024 * 1024 * 1024;

const LOG_MESSAGES: [&str; 8] = [
    "Request received",
    "Processing data",
    "Connection established",
    "Health check passed",
    "Cache hit",
    "Query executed",
    "Worker heartbeat",
    "Response sent",
];

struct Feed {
    events: mpsc::Sender<RuntimeEvent>,
    errors: mpsc::Sender<BackendError>,
    cancel: CancellationToken,
}

impl Feed {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.events.is_closed()
    }
}

#[derive(Default)]
struct SimState {
    components: BTreeMap<String, Component>,
    feeds: Vec<Feed>,
    subscriptions: usize,
    unavailable: bool,
}

impl SimState {
    fn find(&self, id: &str) -> Option<&Component> {
        if let Some(c) = self.components.get(id) {
            return Some(c);
        }
        let mut by_prefix = self.components.values().filter(|c| c.id.starts_with(id));
        match (by_prefix.next(), by_prefix.next()) {
            (Some(c), None) => Some(c),
            _ => self.components.values().find(|c| c.name == id),
        }
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.unavailable {
            Err(BackendError::Unavailable("simulated runtime offline".into()))
        } else {
            Ok(())
        }
    }

    fn broadcast(&mut self, ev: RuntimeEvent) {
        self.feeds.retain(Feed::is_live);
        for feed in &self.feeds {
            if feed.events.try_send(ev.clone()).is_err() {
                debug!(id = %ev.id, action = %ev.action, "simulated feed full; event dropped");
            }
        }
    }

    /// Applies `action` to one component and publishes it.
    fn apply(&mut self, id: &str, action: &str) -> Option<()> {
        let c = self.components.get_mut(id)?;
        let state = ComponentState::from_action(action);
        if state.is_known() {
            c.state = state.as_str().to_string();
            c.status = match state {
                ComponentState::Running => "Up Less than a second".to_string(),
                ComponentState::Exited => "Exited (0) Less than a second ago".to_string(),
                _ => state.as_str().to_string(),
            };
        }
        let ev = RuntimeEvent {
            id: c.id.clone(),
            action: action.to_string(),
            name: c.name.clone(),
            group: c.group.clone(),
            service: c.service.clone(),
            at: Utc::now(),
        };
        self.broadcast(ev);
        Some(())
    }
}

/// Component table with live feeds.
#[derive(Default)]
pub struct SimulatedRuntime {
    state: Mutex<SimState>,
}

impl SimulatedRuntime {
    /// Empty runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime pre-populated with two running groups:
    /// `webapp` (web, api, db) and `monitoring` (prometheus, grafana).
    pub fn demo() -> Self {
        let rt = Self::new();
        for (group, service, image) in [
            ("webapp", "web", "nginx:alpine"),
            ("webapp", "api", "node:18-alpine"),
            ("webapp", "db", "postgres:15"),
            ("monitoring", "prometheus", "prom/prometheus:latest"),
            ("monitoring", "grafana", "grafana/grafana:latest"),
        ] {
            rt.insert(Self::component(group, service, image, true));
        }
        rt
    }

    /// Groups matching [`SimulatedRuntime::demo`].
    pub fn demo_groups(root: &std::path::Path) -> Vec<Group> {
        vec![
            Group::new(
                "webapp",
                root.join("webapp"),
                vec!["web".into(), "api".into(), "db".into()],
            ),
            Group::new(
                "monitoring",
                root.join("monitoring"),
                vec!["prometheus".into(), "grafana".into()],
            ),
        ]
    }

    /// Builds a group member named `<group>-<service>-1` with a random id.
    pub fn component(group: &str, service: &str, image: &str, running: bool) -> Component {
        let mut rng = rand::rng();
        let id = format!(
            "{:016x}{:016x}{:016x}{:016x}",
            rng.random::<u64>(),
            rng.random::<u64>(),
            rng.random::<u64>(),
            rng.random::<u64>()
        );
        Component {
            id,
            name: format!("{group}-{service}-1"),
            image: image.to_string(),
            state: if running { "running" } else { "exited" }.to_string(),
            status: if running { "Up 2 hours" } else { "Exited (0) 1 hour ago" }.to_string(),
            group: Some(group.to_string()),
            service: Some(service.to_string()),
            created: Utc::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces a component without publishing an event.
    pub fn insert(&self, component: Component) {
        self.lock()
            .components
            .insert(component.id.clone(), component);
    }

    /// Applies `action` to one component and publishes the event.
    pub fn set_state(&self, id: &str, action: &str) -> Result<(), BackendError> {
        let mut st = self.lock();
        let full = st
            .find(id)
            .map(|c| c.id.clone())
            .ok_or_else(|| BackendError::not_found("component", id))?;
        st.apply(&full, action);
        Ok(())
    }

    /// Applies `action` to every member of `group`.
    pub fn set_group_state(&self, group: &str, action: &str) {
        let mut st = self.lock();
        let ids: Vec<String> = st
            .components
            .values()
            .filter(|c| c.group.as_deref() == Some(group))
            .map(|c| c.id.clone())
            .collect();
        for id in ids {
            st.apply(&id, action);
        }
    }

    /// Creates missing members of `group` (stopped) for each service.
    fn ensure_members(&self, group: &str, services: &[String]) {
        let mut st = self.lock();
        let present: BTreeSet<String> = st
            .components
            .values()
            .filter(|c| c.group.as_deref() == Some(group))
            .filter_map(|c| c.service.clone())
            .collect();
        for service in services.iter().filter(|s| !present.contains(*s)) {
            let c = Self::component(group, service, &format!("{service}:latest"), false);
            st.components.insert(c.id.clone(), c);
        }
    }

    fn services_of(&self, group: &str) -> Vec<String> {
        let st = self.lock();
        let set: BTreeSet<String> = st
            .components
            .values()
            .filter(|c| c.group.as_deref() == Some(group))
            .filter_map(|c| c.service.clone())
            .collect();
        set.into_iter().collect()
    }

    /// Publishes a raw event; component state is left untouched.
    pub fn emit(&self, event: RuntimeEvent) {
        self.lock().broadcast(event);
    }

    /// Sends `message` on every open error channel and ends every feed.
    pub fn fail_feeds(&self, message: &str) {
        let mut st = self.lock();
        for feed in st.feeds.drain(..) {
            let _ = feed
                .errors
                .try_send(BackendError::Unavailable(message.to_string()));
        }
    }

    /// Ends every feed without an error.
    pub fn close_feeds(&self) {
        self.lock().feeds.clear();
    }

    /// Number of `watch` calls so far.
    pub fn subscriptions(&self) -> usize {
        self.lock().subscriptions
    }

    /// Makes every query fail with [`BackendError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }
}

#[async_trait]
impl RuntimeClient for SimulatedRuntime {
    async fn list_components(&self, group: Option<&str>) -> Result<Vec<Component>, BackendError> {
        let st = self.lock();
        st.check()?;
        Ok(st
            .components
            .values()
            .filter(|c| group.is_none() || c.group.as_deref() == group)
            .cloned()
            .collect())
    }

    async fn get_component(&self, id: &str) -> Result<Component, BackendError> {
        let st = self.lock();
        st.check()?;
        st.find(id)
            .cloned()
            .ok_or_else(|| BackendError::not_found("component", id))
    }

    async fn start_component(&self, id: &str) -> Result<(), BackendError> {
        self.lock().check()?;
        self.set_state(id, "start")
    }

    async fn stop_component(&self, id: &str, _timeout: Duration) -> Result<(), BackendError> {
        self.lock().check()?;
        self.set_state(id, "stop")
    }

    async fn restart_component(&self, id: &str, _timeout: Duration) -> Result<(), BackendError> {
        self.lock().check()?;
        self.set_state(id, "restart")?;
        self.set_state(id, "start")
    }

    async fn logs(
        &self,
        id: &str,
        tail: usize,
        follow: bool,
        cancel: CancellationToken,
    ) -> Result<LogStream, BackendError> {
        let name = self.get_component(id).await?.name;
        let history: Vec<Result<String, BackendError>> = (0..tail)
            .map(|i| Ok(log_line(&name, i)))
            .collect();
        let history = stream::iter(history);
        if !follow {
            return Ok(history.boxed());
        }

        let ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + LOG_FOLLOW_PERIOD,
            LOG_FOLLOW_PERIOD,
        );
        let live = stream::unfold(
            (ticker, cancel, name, tail),
            |(mut ticker, cancel, name, n)| async move {
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    _ = ticker.tick() => {
                        let line = log_line(&name, n);
                        Some((Ok(line), (ticker, cancel, name, n + 1)))
                    }
                }
            },
        );
        Ok(history.chain(live).boxed())
    }

    async fn usage(&self, id: &str) -> Result<ResourceUsage, BackendError> {
        let c = self.get_component(id).await?;
        if !c.is_running() {
            return Ok(ResourceUsage {
                id: c.id,
                memory_limit: MEMORY_LIMIT,
                ..ResourceUsage::default()
            });
        }
        let mut rng = rand::rng();
        let memory_usage = rng.random_range(50..500u64) * 1024 * 1024;
        Ok(ResourceUsage {
            id: c.id,
            cpu_percent: rng.random_range(0.0..50.0),
            memory_usage,
            memory_limit: MEMORY_LIMIT,
            memory_percent: memory_usage as f64 / MEMORY_LIMIT as f64 * 100.0,
            network_rx: rng.random_range(0..10_000_000),
            network_tx: rng.random_range(0..5_000_000),
        })
    }

    fn watch(&self, cancel: CancellationToken) -> EventFeed {
        let (ev_tx, ev_rx) = mpsc::channel(FEED_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(1);
        let mut st = self.lock();
        st.subscriptions += 1;
        st.feeds.push(Feed {
            events: ev_tx,
            errors: err_tx,
            cancel,
        });
        EventFeed {
            events: ev_rx,
            errors: err_rx,
        }
    }
}

fn log_line(name: &str, n: usize) -> String {
    let msg = LOG_MESSAGES[n % LOG_MESSAGES.len()];
    format!(
        "{} [INFO] {name}: {msg}",
        Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ")
    )
}

/// Executor that prints compose-like progress and mutates a [`SimulatedRuntime`].
pub struct SimulatedExecutor {
    runtime: Arc<SimulatedRuntime>,
    step_delay: Duration,
    failures: Mutex<HashMap<Verb, String>>,
}

impl SimulatedExecutor {
    pub fn new(runtime: Arc<SimulatedRuntime>) -> Self {
        Self {
            runtime,
            step_delay: Duration::from_millis(200),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Pause between output lines.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Makes `verb` report failure with `message`.
    pub fn fail_on(&self, verb: Verb, message: impl Into<String>) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(verb, message.into());
    }

    async fn say(
        &self,
        output: &mpsc::Sender<OutputLine>,
        cancel: &CancellationToken,
        line: String,
    ) -> Result<(), BackendError> {
        let _ = output.send(OutputLine::stdout(line)).await;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BackendError::Cancelled),
            _ = tokio::time::sleep(self.step_delay) => Ok(()),
        }
    }
}

#[async_trait]
impl ActionExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        verb: Verb,
        group: &Group,
        output: mpsc::Sender<OutputLine>,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, BackendError> {
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&verb)
            .cloned();
        if let Some(message) = failure {
            let _ = output.send(OutputLine::stderr(format!("Error: {message}"))).await;
            return Ok(ActionOutcome::failed(message));
        }

        let services = if group.services.is_empty() {
            self.runtime.services_of(&group.id)
        } else {
            group.services.clone()
        };
        let total = services.len();
        let g = &group.id;

        match verb {
            Verb::Up => {
                self.runtime.ensure_members(g, &services);
                self.say(&output, &cancel, format!("[+] Running 0/{total}")).await?;
                for (i, svc) in services.iter().enumerate() {
                    self.say(&output, &cancel, format!(" ✔ Container {g}-{svc}-1  Starting")).await?;
                    self.say(&output, &cancel, format!(" ✔ Container {g}-{svc}-1  Started")).await?;
                    self.say(&output, &cancel, format!("[+] Running {}/{total}", i + 1)).await?;
                }
                self.runtime.set_group_state(g, "start");
                Ok(ActionOutcome::ok("Started successfully"))
            }
            Verb::Down => {
                self.say(&output, &cancel, format!("[+] Running 0/{total}")).await?;
                for svc in &services {
                    self.say(&output, &cancel, format!(" ✔ Container {g}-{svc}-1  Stopping")).await?;
                    self.say(&output, &cancel, format!(" ✔ Container {g}-{svc}-1  Stopped")).await?;
                }
                self.say(&output, &cancel, format!(" ✔ Network {g}_default  Removed")).await?;
                self.runtime.set_group_state(g, "stop");
                Ok(ActionOutcome::ok("Stopped successfully"))
            }
            Verb::Pull => {
                for svc in &services {
                    self.say(&output, &cancel, format!("[+] Pulling {svc}")).await?;
                    for pct in (0..=100).step_by(25) {
                        self.say(&output, &cancel, format!(" {svc} Downloading [{pct}%]")).await?;
                    }
                    self.say(&output, &cancel, format!(" ✔ {svc} Pulled")).await?;
                }
                Ok(ActionOutcome::ok("Pulled successfully"))
            }
            Verb::Restart => {
                self.say(&output, &cancel, format!("[+] Restarting {total} services")).await?;
                for svc in &services {
                    self.say(&output, &cancel, format!(" ✔ Container {g}-{svc}-1  Restarting")).await?;
                    self.say(&output, &cancel, format!(" ✔ Container {g}-{svc}-1  Restarted")).await?;
                }
                self.runtime.set_group_state(g, "start");
                Ok(ActionOutcome::ok("Restarted successfully"))
            }
            Verb::Recreate => {
                self.runtime.ensure_members(g, &services);
                self.say(&output, &cancel, "[+] Recreating containers...".to_string()).await?;
                for svc in &services {
                    self.say(&output, &cancel, format!(" ✔ Container {g}-{svc}-1  Recreating")).await?;
                    self.say(&output, &cancel, format!(" ✔ Container {g}-{svc}-1  Recreated")).await?;
                }
                self.runtime.set_group_state(g, "start");
                Ok(ActionOutcome::ok("Recreated successfully"))
            }
        }
    }
}
