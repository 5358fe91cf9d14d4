//! Operator endpoints for the reconciliation log.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use saga::ReconciliationRecord;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct ReplayResponse {
    /// Orders now durably stored, whether written now or found present.
    pub recovered: usize,
    pub inserted: Vec<String>,
    pub already_present: Vec<String>,
    pub still_pending: usize,
}

/// GET /admin/reconciliation: unresolved records, oldest first.
#[tracing::instrument(skip(state))]
pub async fn pending(State(state): State<Arc<AppState>>) -> Json<Vec<ReconciliationRecord>> {
    Json(state.orchestrator.reconciliation().pending().await)
}

/// POST /admin/reconciliation/replay: re-drive ambiguous order writes.
#[tracing::instrument(skip(state))]
pub async fn replay(State(state): State<Arc<AppState>>) -> Json<ReplayResponse> {
    let summary = state.orchestrator.replay_pending_orders().await;
    tracing::info!(
        inserted = summary.inserted.len(),
        already_present = summary.already_present.len(),
        still_pending = summary.still_pending,
        "reconciliation replay finished"
    );

    Json(ReplayResponse {
        recovered: summary.inserted.len() + summary.already_present.len(),
        inserted: summary.inserted.iter().map(ToString::to_string).collect(),
        already_present: summary
            .already_present
            .iter()
            .map(ToString::to_string)
            .collect(),
        still_pending: summary.still_pending,
    })
}
