//! HTTP control surface for the auto-responder.
//!
//! Operators use it to control polling and edit rules. A dry-run endpoint
//! evaluates a message without sending anything.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::{Error, RuleError};
use crate::rules::RuleRecord;
use crate::scheduler::AutoResponder;

#[derive(Clone)]
struct AppState {
    responder: Arc<AutoResponder>,
}

pub fn control_routes(responder: Arc<AutoResponder>) -> Router {
    let state = AppState { responder };

    Router::new()
        .route("/health", get(health))
        .route("/api/auto-responder/status", get(status))
        .route("/api/auto-responder/start", post(start))
        .route("/api/auto-responder/stop", post(stop))
        .route("/api/auto-responder/rules", get(list_rules).post(add_rule))
        .route("/api/auto-responder/rules/reload", post(reload_rules))
        .route(
            "/api/auto-responder/rules/{index}",
            put(update_rule).delete(remove_rule),
        )
        .route("/api/auto-responder/rules/{index}/enabled", put(set_enabled))
        .route("/api/auto-responder/test", post(test_message))
        .with_state(state)
}

type ApiResponse = (StatusCode, Json<Value>);

fn error_response(err: &Error) -> ApiResponse {
    let status = match err {
        Error::Rule(RuleError::IndexOutOfRange { .. }) => StatusCode::NOT_FOUND,
        Error::Rule(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
        Error::Store(_) | Error::Channel(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, "Control request failed");
    }
    (status, Json(json!({"error": err.to_string()})))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "auto-responder"
    }))
}

// ── Lifecycle ───────────────────────────────────────────────────────────

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.responder.status().await)
}

async fn start(State(state): State<AppState>) -> impl IntoResponse {
    let started = state.responder.start().await;
    let message = if started {
        "Auto responder started"
    } else {
        "Auto responder is already running"
    };
    Json(json!({"started": started, "message": message}))
}

async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    let stopped = state.responder.stop().await;
    let message = if stopped {
        "Auto responder stopped"
    } else {
        "Auto responder is not running"
    };
    Json(json!({"stopped": stopped, "message": message}))
}

// ── Rules ───────────────────────────────────────────────────────────────

async fn list_rules(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.responder.engine().rules().await)
}

async fn add_rule(
    State(state): State<AppState>,
    Json(record): Json<RuleRecord>,
) -> impl IntoResponse {
    match state.responder.engine().add_rule(record).await {
        Ok(index) => (StatusCode::CREATED, Json(json!({"index": index}))),
        Err(e) => error_response(&e),
    }
}

async fn update_rule(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(record): Json<RuleRecord>,
) -> impl IntoResponse {
    match state.responder.engine().update_rule(index, record).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "updated"}))),
        Err(e) => error_response(&e),
    }
}

async fn remove_rule(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> impl IntoResponse {
    match state.responder.engine().remove_rule(index).await {
        Ok(removed) => (StatusCode::OK, Json(json!(removed))),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct EnabledRequest {
    enabled: bool,
}

async fn set_enabled(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(body): Json<EnabledRequest>,
) -> impl IntoResponse {
    match state
        .responder
        .engine()
        .set_enabled(index, body.enabled)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({"enabled": body.enabled}))),
        Err(e) => error_response(&e),
    }
}

async fn reload_rules(State(state): State<AppState>) -> impl IntoResponse {
    match state.responder.engine().reload().await {
        Ok(count) => {
            info!(count, "Rules reloaded via control API");
            (StatusCode::OK, Json(json!({"count": count})))
        }
        Err(e) => {
            warn!(error = %e, "Reload failed, rule set is now empty");
            let (status, Json(mut body)) = error_response(&e);
            body["count"] = json!(0);
            (status, Json(body))
        }
    }
}

// ── Dry run ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TestRequest {
    message: String,
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    chat_id: Option<String>,
}

async fn test_message(
    State(state): State<AppState>,
    Json(req): Json<TestRequest>,
) -> impl IntoResponse {
    let sender = req.sender.as_deref().filter(|s| !s.is_empty());
    let chat_id = req.chat_id.as_deref().filter(|c| !c.is_empty());

    match state
        .responder
        .engine()
        .evaluate(&req.message, sender, chat_id)
        .await
    {
        Ok(Some(hit)) => (
            StatusCode::OK,
            Json(json!({
                "matched": true,
                "rule_name": hit.rule_name,
                "response": hit.response,
            })),
        ),
        Ok(None) => (StatusCode::OK, Json(json!({"matched": false}))),
        Err(e) => error_response(&Error::Rule(e)),
    }
}
