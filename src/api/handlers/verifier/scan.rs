//! Credential scan endpoint. One scan per session, enforced in the store.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::store::{AuditEntry, AuditKind, ScanConsumeOutcome};

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::VerifierState;
use super::types::{ScanRequest, ScanResponse, StudentProjection};
use super::utils::extract_client_ip;

fn degree_message(status: Option<&str>) -> &'static str {
    match status {
        Some("Generated") | Some("Verified") => "Degree found and verified",
        _ => "Degree is not generated yet",
    }
}

/// Perform the single credential scan a session is entitled to.
///
/// The session transitions to consumed before the directory lookup, so a
/// failed or empty lookup still spends the session.
#[utoipa::path(
    post,
    path = "/v1/verifier/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Scan result", body = ScanResponse),
        (status = 400, description = "Missing session or UID", body = String),
        (status = 401, description = "Invalid session", body = String),
        (status = 404, description = "Student not registered", body = String),
        (status = 409, description = "Scan already used", body = String),
        (status = 502, description = "Directory lookup failed", body = String)
    ),
    tag = "verifier"
)]
pub async fn scan(
    headers: HeaderMap,
    state: Extension<Arc<VerifierState>>,
    payload: Option<Json<ScanRequest>>,
) -> impl IntoResponse {
    let request: ScanRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let session_id = request.session_id.trim();
    let student_uid = request.student_uid.trim();
    if session_id.is_empty() {
        return (StatusCode::UNAUTHORIZED, "Invalid session".to_string()).into_response();
    }
    if student_uid.is_empty() {
        return (StatusCode::BAD_REQUEST, "UID required".to_string()).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Scan)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let now = Utc::now();
    let session = match state.store().mark_consumed(session_id, student_uid, now).await {
        Ok(ScanConsumeOutcome::Consumed(session)) => session,
        Ok(ScanConsumeOutcome::AlreadyConsumed) => {
            return (StatusCode::CONFLICT, "Scan already used".to_string()).into_response()
        }
        Ok(ScanConsumeOutcome::NotFound) => {
            return (StatusCode::UNAUTHORIZED, "Invalid session".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to consume scan: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Scan failed".to_string())
                .into_response();
        }
    };

    let lookup = state.students().find_by_uid(student_uid).await;

    let outcome = match &lookup {
        Ok(Some(_)) => "ok",
        Ok(None) => "student_not_registered",
        Err(_) => "lookup_failed",
    };
    let details = json!({ "student_uid": student_uid, "outcome": outcome }).to_string();
    let entry = AuditEntry::new(
        session.email.clone(),
        client_ip,
        AuditKind::ScanPerformed,
        details,
    );
    if let Err(err) = state.store().append_audit(entry).await {
        error!("Failed to append audit entry: {err}");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Scan failed".to_string()).into_response();
    }

    match lookup {
        Ok(Some(record)) => {
            let message = degree_message(record.degree_status.as_deref()).to_string();
            (
                StatusCode::OK,
                Json(ScanResponse {
                    message,
                    student: StudentProjection::from(record),
                }),
            )
                .into_response()
        }
        Ok(None) => {
            (StatusCode::NOT_FOUND, "Student not registered".to_string()).into_response()
        }
        Err(err) => {
            error!("Student directory lookup failed: {err}");
            (StatusCode::BAD_GATEWAY, "Scan failed".to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degree_message_by_status() {
        assert_eq!(degree_message(Some("Generated")), "Degree found and verified");
        assert_eq!(degree_message(Some("Verified")), "Degree found and verified");
        assert_eq!(degree_message(Some("Pending")), "Degree is not generated yet");
        assert_eq!(degree_message(None), "Degree is not generated yet");
    }
}
