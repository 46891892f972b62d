//! JSON API over the agent HUD.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::dispatch::{parse_port, DispatchError};
use crate::hud::Hud;
use crate::logtail::{LogWindow, DEFAULT_LINES};
use crate::view::AgentListing;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        if err.is_validation() {
            ApiError::invalid(err.to_string())
        } else {
            ApiError::internal(err.to_string())
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// A port as clients send it in JSON bodies: a number or a numeric string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u64),
    Text(String),
}

impl PortValue {
    fn resolve(value: Option<PortValue>) -> Result<u16, DispatchError> {
        match value {
            Some(PortValue::Number(n)) => parse_port(Some(&n.to_string())),
            Some(PortValue::Text(s)) => parse_port(Some(&s)),
            None => parse_port(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    workdir: Option<String>,
}

#[derive(Debug, Serialize)]
struct StartResponse {
    success: bool,
    port: Option<u16>,
    url: Option<String>,
    output: String,
}

#[derive(Debug, Deserialize)]
struct PortQuery {
    port: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InputRequest {
    #[serde(default)]
    port: Option<PortValue>,
    /// Anything but a JSON string is rejected
    #[serde(default)]
    text: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct KeyRequest {
    #[serde(default)]
    port: Option<PortValue>,
    #[serde(default)]
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    port: Option<String>,
    lines: Option<String>,
    offset: Option<String>,
}

/// Routes are served both at the root and under `/api`
pub fn router(hud: Arc<Hud>) -> Router {
    let agents = Router::new()
        .route("/agents", get(list_agents).post(start_agent).delete(stop_agent))
        .route("/agents/input", post(send_input))
        .route("/agents/key", post(send_key))
        .route("/agents/log", get(read_log));

    Router::new()
        .merge(agents.clone())
        .nest("/api", agents)
        .route("/health", get(|| async { "ok" }))
        .with_state(hud)
}

async fn list_agents(State(hud): State<Arc<Hud>>) -> Json<AgentListing> {
    Json(hud.list_agents_for_display().await)
}

async fn start_agent(
    State(hud): State<Arc<Hud>>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<StartResponse>, ApiError> {
    let Json(req) = body?;
    let name = req.name.unwrap_or_default();

    let started = hud
        .dispatcher()
        .start_agent(&name, req.workdir.as_deref())
        .await
        .inspect_err(|e| error!(error = %e, name = %name, "start failed"))?;

    let url = match started.port {
        Some(port) => Some(hud.agent_url(&hud.mesh_address().await, port)),
        None => None,
    };

    Ok(Json(StartResponse {
        success: true,
        port: started.port,
        url,
        output: started.output,
    }))
}

async fn stop_agent(
    State(hud): State<Arc<Hud>>,
    Query(query): Query<PortQuery>,
) -> Result<Json<Value>, ApiError> {
    let port = parse_port(query.port.as_deref())?;
    hud.dispatcher()
        .stop_agent(port)
        .await
        .inspect_err(|e| error!(port, error = %e, "stop failed"))?;

    Ok(Json(json!({ "success": true, "port": port })))
}

async fn send_input(
    State(hud): State<Arc<Hud>>,
    body: Result<Json<InputRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    let port = PortValue::resolve(req.port)?;
    let text = match req.text {
        Some(Value::String(text)) => text,
        _ => return Err(DispatchError::MissingText.into()),
    };

    let output = hud.dispatcher().send_text(port, &text).await?;
    info!(port, bytes = text.len(), "input sent");

    Ok(Json(json!({
        "success": true,
        "port": port,
        "text": text,
        "output": output,
    })))
}

async fn send_key(
    State(hud): State<Arc<Hud>>,
    body: Result<Json<KeyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    let port = PortValue::resolve(req.port)?;
    let (key, output) = hud
        .dispatcher()
        .send_key(port, req.key.as_deref().unwrap_or_default())
        .await?;

    Ok(Json(json!({
        "success": true,
        "port": port,
        "key": key.as_str(),
        "output": output,
    })))
}

async fn read_log(
    State(hud): State<Arc<Hud>>,
    Query(query): Query<LogQuery>,
) -> Result<Json<LogWindow>, ApiError> {
    let port = parse_port(query.port.as_deref())?;
    let lines = lenient_int(query.lines.as_deref(), DEFAULT_LINES);
    let offset = lenient_int(query.offset.as_deref(), 0);

    let window = hud
        .read_log_window(port, lines, offset)
        .await
        .map_err(|e| {
            error!(port, error = %e, "log read failed");
            ApiError::internal(e.to_string())
        })?;

    Ok(Json(window))
}

fn lenient_int(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}
