//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Reconciliation records waiting for an operator or a replay.
    pub pending_reconciliation: usize,
}

/// GET /health: liveness plus the size of the reconciliation backlog.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let pending_reconciliation = state.orchestrator.reconciliation().pending().await.len();
    Json(HealthResponse {
        status: "ok",
        pending_reconciliation,
    })
}
