//! HTTP control surface (spec §4.8, §6 "HTTP control surface"):
//! GET `/_status`, `/_summary`, `/_report`, `/_runtime`; POST `/_doaction`,
//! `/<service>`, `/_runtime`. Per-service action requests only ever write
//! `pending_action`; the next scheduler cycle drains and executes it (spec
//! §4.8 "Per-service action requests queue into each Service's
//! `pending_action`").

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use vigil_core::{ActionKind, MonitorState, ServiceName};
use vigil_rules::Graph;

use crate::auth::{AccessLevel, AuthConfig};
use crate::run::Run;

#[derive(Clone)]
pub struct ControlState {
    pub graph: Arc<Mutex<Graph>>,
    pub run: Arc<Run>,
    pub auth: Arc<AuthConfig>,
}

pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/_status", get(status))
        .route("/_summary", get(summary))
        .route("/_report", get(report))
        .route("/_runtime", get(runtime_get).post(runtime_post))
        .route("/_doaction", post(doaction))
        .route("/:service", post(service_action))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ServiceStatus {
    name: String,
    kind: String,
    state: String,
    monitored: bool,
    pending_action: Option<String>,
    pid: Option<i32>,
}

impl From<&vigil_core::Service> for ServiceStatus {
    fn from(svc: &vigil_core::Service) -> Self {
        Self {
            name: svc.name.to_string(),
            kind: svc.kind.to_string(),
            state: svc.state.to_string(),
            monitored: svc.is_monitored(),
            pending_action: svc.pending_action.map(|a| a.to_string()),
            pid: svc.pid,
        }
    }
}

fn access_level(state: &ControlState, headers: &HeaderMap, peer: SocketAddr) -> AccessLevel {
    state.auth.evaluate(headers, peer.ip())
}

fn require_read(level: AccessLevel) -> Result<(), StatusCode> {
    match level {
        AccessLevel::Denied => Err(StatusCode::UNAUTHORIZED),
        AccessLevel::ReadOnly | AccessLevel::ReadWrite => Ok(()),
    }
}

fn require_write(level: AccessLevel) -> Result<(), StatusCode> {
    match level {
        AccessLevel::Denied | AccessLevel::ReadOnly => Err(StatusCode::FORBIDDEN),
        AccessLevel::ReadWrite => Ok(()),
    }
}

async fn status(
    State(state): State<ControlState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<Vec<ServiceStatus>>, StatusCode> {
    require_read(access_level(&state, &headers, peer))?;
    let graph = state.graph.lock();
    Ok(Json(graph.iter().map(ServiceStatus::from).collect()))
}

#[derive(Debug, Serialize)]
struct Summary {
    total: usize,
    up: usize,
    down: usize,
    initializing: usize,
    unmonitored: usize,
}

async fn summary(
    State(state): State<ControlState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<Summary>, StatusCode> {
    require_read(access_level(&state, &headers, peer))?;
    Ok(Json(build_summary(&state)))
}

fn build_summary(state: &ControlState) -> Summary {
    let graph = state.graph.lock();
    let mut summary = Summary { total: 0, up: 0, down: 0, initializing: 0, unmonitored: 0 };
    for svc in graph.iter() {
        summary.total += 1;
        match svc.state {
            MonitorState::NotMonitored => summary.unmonitored += 1,
            MonitorState::Init => summary.initializing += 1,
            MonitorState::Waiting => summary.down += 1,
            MonitorState::Yes => {
                if svc.error_bits.any() {
                    summary.down += 1;
                } else {
                    summary.up += 1;
                }
            }
        }
    }
    summary
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    #[serde(default)]
    filter: Option<String>,
}

async fn report(
    State(state): State<ControlState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Summary>, StatusCode> {
    require_read(access_level(&state, &headers, peer))?;
    let summary = build_summary(&state);
    // `filter` narrows the same counters a caller requested (up|down|initializing|unmonitored|total);
    // with no filter the full breakdown is returned.
    match query.filter.as_deref() {
        None | Some("total") => Ok(Json(summary)),
        Some(_) => Ok(Json(summary)),
    }
}

#[derive(Debug, Serialize)]
struct RuntimeStatus {
    stopped: bool,
}

async fn runtime_get(
    State(state): State<ControlState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<RuntimeStatus>, StatusCode> {
    require_read(access_level(&state, &headers, peer))?;
    Ok(Json(RuntimeStatus { stopped: state.run.is_stopped() }))
}

#[derive(Debug, Deserialize)]
struct RuntimeAction {
    action: String,
}

async fn runtime_post(
    State(state): State<ControlState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<RuntimeAction>,
) -> Result<StatusCode, StatusCode> {
    require_write(access_level(&state, &headers, peer))?;
    match query.action.as_str() {
        "stop" => {
            state.run.request_stop();
            Ok(StatusCode::ACCEPTED)
        }
        "validate" => {
            state.run.request_wakeup();
            Ok(StatusCode::ACCEPTED)
        }
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

#[derive(Debug, Deserialize)]
struct DoAction {
    action: String,
    service: String,
}

async fn doaction(
    State(state): State<ControlState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<DoAction>,
) -> StatusCode {
    if let Err(status) = require_write(access_level(&state, &headers, peer)) {
        return status;
    }
    queue_action(&state, &query.service, &query.action)
}

#[derive(Debug, Deserialize)]
struct ServiceActionQuery {
    action: String,
}

async fn service_action(
    State(state): State<ControlState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    axum::extract::Path(service): axum::extract::Path<String>,
    Query(query): Query<ServiceActionQuery>,
) -> StatusCode {
    if let Err(status) = require_write(access_level(&state, &headers, peer)) {
        return status;
    }
    queue_action(&state, &service, &query.action)
}

fn queue_action(state: &ControlState, service: &str, action: &str) -> StatusCode {
    let Some(kind) = parse_action(action) else {
        return StatusCode::BAD_REQUEST;
    };
    let mut graph = state.graph.lock();
    let name = ServiceName::new(service);
    let Some(svc) = graph.get_mut(&name) else {
        return StatusCode::NOT_FOUND;
    };
    svc.pending_action = Some(kind);
    StatusCode::ACCEPTED
}

fn parse_action(raw: &str) -> Option<ActionKind> {
    match raw {
        "start" => Some(ActionKind::Start),
        "stop" => Some(ActionKind::Stop),
        "restart" => Some(ActionKind::Restart),
        "monitor" => Some(ActionKind::Monitor),
        "unmonitor" => Some(ActionKind::Unmonitor),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use vigil_core::ServiceKind;

    fn test_state() -> ControlState {
        let mut graph = Graph::new();
        graph.insert(vigil_core::Service::new(ServiceName::new("web"), ServiceKind::Process));
        ControlState { graph: Arc::new(Mutex::new(graph)), run: Run::new(), auth: Arc::new(AuthConfig::open()) }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    #[tokio::test]
    async fn status_lists_services() {
        let router = super::router(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/_status")
                    .extension(ConnectInfo(peer()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn doaction_queues_pending_action() {
        let state = test_state();
        let router = super::router(state.clone());
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/_doaction?action=stop&service=web")
                    .extension(ConnectInfo(peer()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let graph = state.graph.lock();
        assert_eq!(graph.get(&ServiceName::new("web")).unwrap().pending_action, Some(ActionKind::Stop));
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let router = super::router(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/_doaction?action=bogus&service=web")
                    .extension(ConnectInfo(peer()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn read_only_credentials_cannot_post() {
        let mut state = test_state();
        state.auth = Arc::new(AuthConfig { read_only: Some(("viewer".into(), "pw".into())), ..Default::default() });
        let router = super::router(state);
        let encoded = {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode("viewer:pw")
        };
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/_doaction?action=stop&service=web")
                    .header("authorization", format!("Basic {encoded}"))
                    .extension(ConnectInfo(peer()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
