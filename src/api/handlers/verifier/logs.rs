//! Admin endpoint exposing verifier activity and the audit trail.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::error;

use super::state::VerifierState;
use super::types::{AuditEventEntry, LogsResponse, VerifierActivityEntry};

/// List verifier sessions (most recent login first) and audit events.
#[utoipa::path(
    get,
    path = "/v1/verifier/logs",
    responses(
        (status = 200, description = "Verifier activity and audit events", body = LogsResponse),
        (status = 500, description = "Failed to read logs", body = String)
    ),
    tag = "verifier"
)]
pub async fn logs(state: Extension<Arc<VerifierState>>) -> impl IntoResponse {
    let verifiers = match state.store().list_activity().await {
        Ok(rows) => rows,
        Err(err) => {
            error!("Failed to list verifier activity: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read logs".to_string(),
            )
                .into_response();
        }
    };

    let events = match state.store().list_audit().await {
        Ok(rows) => rows,
        Err(err) => {
            error!("Failed to list audit events: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read logs".to_string(),
            )
                .into_response();
        }
    };

    let verifiers: Vec<VerifierActivityEntry> =
        verifiers.into_iter().map(VerifierActivityEntry::from).collect();
    let events: Vec<AuditEventEntry> = events.into_iter().map(AuditEventEntry::from).collect();

    (
        StatusCode::OK,
        Json(LogsResponse {
            count: verifiers.len(),
            verifiers,
            events,
        }),
    )
        .into_response()
}
