//! HTTP control and status surface.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tower_http::cors::{Any, CorsLayer};

use tandem_engine::action::UnknownAction;
use tandem_engine::Action;

use crate::event_loop::{Input, StatusView};

#[derive(Clone)]
pub struct ApiState {
    pub view: watch::Receiver<StatusView>,
    pub input: mpsc::UnboundedSender<Input>,
}

// ── /status ──────────────────────────────────────────────────────────────────

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusView> {
    Json(state.view.borrow().clone())
}

// ── /action/{name} ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub accepted: Action,
}

pub async fn handle_action(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<ActionResponse>, (StatusCode, String)> {
    let action: Action = name
        .parse()
        .map_err(|e: UnknownAction| (StatusCode::NOT_FOUND, e.to_string()))?;
    state
        .input
        .send(Input::Action(action))
        .map_err(|_| (StatusCode::SERVICE_UNAVAILABLE, "event loop stopped".to_string()))?;
    tracing::info!(%action, "action requested");
    Ok(Json(ActionResponse { accepted: action }))
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(handle_status))
        .route("/action/{name}", post(handle_action))
        .with_state(state)
        .layer(cors)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
