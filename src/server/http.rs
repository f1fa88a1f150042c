use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use super::state::AppState;
use super::websocket::websocket_handler;
use crate::error::Result;
use crate::store::Snapshot;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/pipelines", get(pipelines))
        .route("/ws", get(websocket_handler))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Serves viewers on `listener` until the process exits.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    graphs: usize,
    last_refresh: Option<DateTime<Utc>>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        graphs: state.store.len().await,
        last_refresh: *state.last_refresh.read().await,
    })
}

async fn pipelines(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.store.snapshot().await)
}
