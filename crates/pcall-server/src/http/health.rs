//! Health check endpoint

use crate::socket::Io;
use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

pub(crate) fn health_routes(io: Io) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(io)
}

async fn health_check(State(io): State<Io>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "pcall-server",
        "connections": io.connection_count(),
    }))
}
