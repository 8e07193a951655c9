//! # HTTP surface.
//!
//! | Route                                     | Purpose                                  |
//! |-------------------------------------------|------------------------------------------|
//! | `GET  /api/events`                        | broker-backed event stream (SSE)         |
//! | `GET  /api/groups`                        | groups with reconciled status            |
//! | `GET  /api/groups/:id`                    | one group                                |
//! | `POST /api/groups/:id/:operation`         | launch an operation (`202 Accepted`)     |
//! | `GET  /api/components`                    | components, `?group=` to filter          |
//! | `GET  /api/components/:id`                | one component                            |
//! | `POST /api/components/:id/:action`        | start / stop / restart one component     |
//! | `GET  /api/components/:id/logs`           | last log lines as JSON, `?tail=`         |
//! | `GET  /api/components/:id/logs/stream`    | log tail (SSE)                           |
//! | `GET  /api/components/:id/stats`          | point-in-time resource usage             |
//! | `GET  /api/system/health`                 | liveness                                 |
//! | `GET  /api/system/version`                | build version and platform               |
//!
//! Error bodies are `{"error": "<message>"}` and never carry internal detail.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::broker::{pump, serve, SseTransport};
use crate::core::{Dashboard, OperationKind};
use crate::error::BackendError;

/// Component stop/restart timeout passed to the runtime.
const COMPONENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the router over a shared dashboard.
pub fn router(dashboard: Arc<Dashboard>) -> Router {
    Router::new()
        .route("/api/events", get(events))
        .route("/api/groups", get(list_groups))
        .route("/api/groups/:id", get(get_group))
        .route("/api/groups/:id/:operation", post(launch_operation))
        .route("/api/components", get(list_components))
        .route("/api/components/:id", get(get_component))
        .route("/api/components/:id/logs", get(component_logs))
        .route("/api/components/:id/logs/stream", get(stream_logs))
        .route("/api/components/:id/stats", get(component_stats))
        .route("/api/components/:id/:action", post(component_action))
        .route("/api/system/health", get(health))
        .route("/api/system/version", get(version))
        .with_state(dashboard)
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn backend_error(e: &BackendError) -> Response {
    match e {
        BackendError::NotFound { kind, .. } => error(StatusCode::NOT_FOUND, format!("{kind} not found")),
        _ => {
            warn!(error = %e, label = e.as_label(), "backend call failed");
            error(StatusCode::BAD_GATEWAY, "runtime unavailable")
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    }))
}

async fn events(State(dash): State<Arc<Dashboard>>) -> Response {
    let (transport, body) = SseTransport::channel(dash.config().mailbox_capacity_clamped());
    let cancel = transport.session_token(&dash.session_token());
    let broker = dash.broker().clone();
    let heartbeat = dash.config().heartbeat();

    tokio::spawn(async move {
        if let Err(e) = serve(&broker, transport, heartbeat, cancel).await {
            debug!(error = %e, "event stream rejected");
        }
    });
    body.into_response()
}

async fn list_groups(State(dash): State<Arc<Dashboard>>) -> Response {
    Json(dash.groups().await).into_response()
}

async fn get_group(State(dash): State<Arc<Dashboard>>, Path(id): Path<String>) -> Response {
    match dash.group(&id).await {
        Some(view) => Json(view).into_response(),
        None => error(StatusCode::NOT_FOUND, "group not found"),
    }
}

async fn launch_operation(
    State(dash): State<Arc<Dashboard>>,
    Path((id, operation)): Path<(String, String)>,
) -> Response {
    let kind: OperationKind = match operation.parse() {
        Ok(kind) => kind,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
    };
    match dash.launch(kind, &id).await {
        Some(operation_id) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "started",
                "operation": kind.as_str(),
                "groupId": id,
                "operationId": operation_id,
            })),
        )
            .into_response(),
        None => error(StatusCode::NOT_FOUND, "group not found"),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ComponentFilter {
    group: Option<String>,
}

async fn list_components(
    State(dash): State<Arc<Dashboard>>,
    Query(filter): Query<ComponentFilter>,
) -> Response {
    match dash.runtime().list_components(filter.group.as_deref()).await {
        Ok(components) => Json(components).into_response(),
        Err(e) => backend_error(&e),
    }
}

async fn get_component(State(dash): State<Arc<Dashboard>>, Path(id): Path<String>) -> Response {
    match dash.runtime().get_component(&id).await {
        Ok(component) => Json(component).into_response(),
        Err(e) => backend_error(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct TailQuery {
    tail: Option<usize>,
}

async fn component_logs(
    State(dash): State<Arc<Dashboard>>,
    Path(id): Path<String>,
    Query(q): Query<TailQuery>,
) -> Response {
    match dash.log_tail().snapshot(&id, q.tail).await {
        Ok(lines) => Json(json!({ "componentId": id, "lines": lines })).into_response(),
        Err(e) => backend_error(&e),
    }
}

async fn component_stats(State(dash): State<Arc<Dashboard>>, Path(id): Path<String>) -> Response {
    match dash.runtime().usage(&id).await {
        Ok(usage) => Json(usage).into_response(),
        Err(e) => backend_error(&e),
    }
}

async fn component_action(
    State(dash): State<Arc<Dashboard>>,
    Path((id, action)): Path<(String, String)>,
) -> Response {
    let rt = dash.runtime();
    let res = match action.as_str() {
        "start" => rt.start_component(&id).await,
        "stop" => rt.stop_component(&id, COMPONENT_TIMEOUT).await,
        "restart" => rt.restart_component(&id, COMPONENT_TIMEOUT).await,
        other => return error(StatusCode::BAD_REQUEST, format!("unknown action: {other}")),
    };
    match res {
        Ok(()) => Json(json!({ "status": "ok", "action": action, "id": id })).into_response(),
        Err(e) => backend_error(&e),
    }
}

async fn stream_logs(State(dash): State<Arc<Dashboard>>, Path(id): Path<String>) -> Response {
    let (mut transport, body) = SseTransport::channel(dash.config().mailbox_capacity_clamped());
    let cancel = transport.session_token(&dash.session_token());

    let mut lines = match dash.log_tail().open(&id, cancel.clone()).await {
        Ok(rx) => rx,
        Err(e) => {
            cancel.cancel();
            return backend_error(&e);
        }
    };
    let heartbeat = dash.config().heartbeat();
    tokio::spawn(async move {
        let reason = pump(&mut lines, &mut transport, heartbeat, &cancel).await;
        cancel.cancel();
        debug!(component = %id, ?reason, "log stream ended");
    });
    body.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryDirectory, RuntimeClient, SimulatedExecutor, SimulatedRuntime};
    use crate::config::Config;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Arc<Dashboard>, Arc<SimulatedRuntime>) {
        let rt = Arc::new(SimulatedRuntime::demo());
        let dash = Dashboard::builder(Config {
            sample_interval_secs: 0,
            ..Config::default()
        })
        .with_runtime(rt.clone())
        .with_executor(Arc::new(
            SimulatedExecutor::new(rt.clone()).with_step_delay(Duration::from_millis(1)),
        ))
        .with_directory(Arc::new(InMemoryDirectory::new(SimulatedRuntime::demo_groups(
            std::path::Path::new("/srv"),
        ))))
        .build()
        .unwrap();
        (dash, rt)
    }

    async fn call(dash: &Arc<Dashboard>, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let res = router(dash.clone())
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn launch_returns_accepted_with_ids() {
        let (dash, _rt) = app();
        let (status, body) = call(&dash, "POST", "/api/groups/webapp/update").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "started");
        assert_eq!(body["operation"], "update");
        assert_eq!(body["groupId"], "webapp");
        assert!(body["operationId"].as_str().is_some_and(|s| !s.is_empty()));
    }

    #[tokio::test]
    async fn launch_rejects_unknown_group_and_operation() {
        let (dash, _rt) = app();
        let (status, _) = call(&dash, "POST", "/api/groups/nope/up").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&dash, "POST", "/api/groups/webapp/explode").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown operation: explode");
    }

    #[tokio::test]
    async fn groups_carry_reconciled_status() {
        let (dash, rt) = app();
        rt.set_group_state("webapp", "stop");

        let (status, body) = call(&dash, "GET", "/api/groups").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(2));

        let (status, body) = call(&dash, "GET", "/api/groups/webapp").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "webapp");
        assert_eq!(body["status"]["status"], "stopped");
        assert_eq!(body["status"]["total"], 3);

        let (status, _) = call(&dash, "GET", "/api/groups/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn component_actions_hit_the_runtime() {
        let (dash, rt) = app();
        let web = rt
            .list_components(Some("webapp"))
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.service.as_deref() == Some("web"))
            .unwrap();

        let (status, _) = call(&dash, "POST", &format!("/api/components/{}/stop", &web.id[..12])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rt.get_component(&web.id).await.unwrap().state, "exited");

        let (status, _) = call(&dash, "POST", "/api/components/missing/start").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&dash, "POST", &format!("/api/components/{}/explode", web.id)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_and_stream_content_type() {
        let (dash, _rt) = app();
        let (status, body) = call(&dash, "GET", "/api/system/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let res = router(dash.clone())
            .oneshot(Request::builder().uri("/api/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let (status, _) = call(&dash, "GET", "/api/components/missing/logs/stream").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn component_reads() {
        let (dash, rt) = app();
        let db = rt
            .list_components(Some("webapp"))
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.service.as_deref() == Some("db"))
            .unwrap();
        let short = &db.id[..12];

        let (status, body) = call(&dash, "GET", "/api/components").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(5));

        let (_, body) = call(&dash, "GET", "/api/components?group=monitoring").await;
        assert_eq!(body.as_array().map(Vec::len), Some(2));

        let (status, body) = call(&dash, "GET", &format!("/api/components/{short}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], db.id);
        assert_eq!(body["group"], "webapp");

        let (status, body) = call(&dash, "GET", &format!("/api/components/{short}/logs?tail=4")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["componentId"], short);
        assert_eq!(body["lines"].as_array().map(Vec::len), Some(4));
        assert!(body["lines"][0]["line"].as_str().is_some_and(|l| l.contains("[INFO]")));

        let (status, body) = call(&dash, "GET", &format!("/api/components/{short}/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], db.id);
        assert!(body["memoryLimit"].as_u64().is_some_and(|m| m > 0));

        for uri in [
            "/api/components/missing",
            "/api/components/missing/logs",
            "/api/components/missing/stats",
        ] {
            let (status, body) = call(&dash, "GET", uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn reads_map_outage_to_bad_gateway() {
        let (dash, rt) = app();
        rt.set_unavailable(true);
        let (status, body) = call(&dash, "GET", "/api/components").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "runtime unavailable");
    }

    #[tokio::test]
    async fn version_reports_package() {
        let (dash, _rt) = app();
        let (status, body) = call(&dash, "GET", "/api/system/version").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["os"].is_string());
    }
}
