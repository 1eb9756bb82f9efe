//! Management HTTP API.
//!
//! `GET /health` is open; the `/internal/bots/*` POSTs require the
//! `x-ret-bot-access-key` header whenever a key is configured. Bad requests
//! answer `4xx` with `{"error": "..."}` bodies; nothing here panics on
//! malformed input.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::process::ProcessSpawner;
use crate::Supervisor;

pub type SharedSupervisor = Arc<Mutex<Supervisor<ProcessSpawner>>>;

const ACCESS_KEY_HEADER: &str = "x-ret-bot-access-key";

type ApiError = (StatusCode, Json<Value>);

fn err(status: StatusCode, msg: &str) -> ApiError {
    (status, Json(json!({"error": msg})))
}

pub fn router(sup: SharedSupervisor) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/internal/bots/room-config", post(room_config))
        .route("/internal/bots/room-stop", post(room_stop))
        .route("/internal/bots/chat", post(chat))
        .with_state(sup)
}

async fn health(State(sup): State<SharedSupervisor>) -> Json<Value> {
    Json(sup.lock().await.health())
}

fn check_access_key(
    headers: &HeaderMap,
    configured: Option<&str>,
) -> Result<(), ApiError> {
    let Some(expected) = configured else {
        return Ok(());
    };
    let presented = headers.get(ACCESS_KEY_HEADER).and_then(|v| v.to_str().ok());
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(err(StatusCode::UNAUTHORIZED, "unauthorized"))
    }
}

fn require_hub_sid(body: &Value) -> Result<&str, ApiError> {
    body.get("hub_sid")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(StatusCode::BAD_REQUEST, "hub_sid must be a string"))
}

async fn room_config(
    State(sup): State<SharedSupervisor>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut sup = sup.lock().await;
    check_access_key(&headers, sup.cfg.bot_access_key.as_deref())?;
    let hub_sid = require_hub_sid(&body)?;
    let bots = body.get("bots").cloned().unwrap_or(Value::Null);
    let (bots, state) = sup.apply_room_config(hub_sid, &bots, Utc::now().timestamp_millis());
    Ok(Json(json!({
        "ok": true,
        "hub_sid": hub_sid,
        "bots": bots,
        "runner_state": state.as_str(),
    })))
}

async fn room_stop(
    State(sup): State<SharedSupervisor>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut sup = sup.lock().await;
    check_access_key(&headers, sup.cfg.bot_access_key.as_deref())?;
    let hub_sid = require_hub_sid(&body)?;
    let state = sup.room_stop(hub_sid);
    Ok(Json(json!({
        "ok": true,
        "hub_sid": hub_sid,
        "runner_state": state.as_str(),
    })))
}

/// Chat boundary: field validation and per-room rate limiting live here; the
/// actual responder is an external service and is not wired in this build,
/// so a well-formed request inside the rate window answers `chat_disabled`.
async fn chat(
    State(sup): State<SharedSupervisor>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut sup = sup.lock().await;
    check_access_key(&headers, sup.cfg.bot_access_key.as_deref())?;
    let hub_sid = require_hub_sid(&body)?;
    let bot_id = body.get("bot_id").and_then(Value::as_str);
    let message = body.get("message").and_then(Value::as_str);
    if bot_id.is_none() || message.is_none() {
        return Err(err(StatusCode::BAD_REQUEST, "bot_id and message are required"));
    }
    if !sup.chat_allowed(hub_sid, Utc::now().timestamp_millis()) {
        return Err(err(StatusCode::TOO_MANY_REQUESTS, "rate_limited"));
    }
    Err(err(StatusCode::SERVICE_UNAVAILABLE, "chat_disabled"))
}
