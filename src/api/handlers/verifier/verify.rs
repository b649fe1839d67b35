//! OTP verification endpoint, mints a scan session on success.

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

use crate::store::{AuditEntry, AuditKind};

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::VerifierState;
use super::types::{VerifyOtpRequest, VerifyOtpResponse};
use super::utils::{extract_client_ip, extract_device_info, normalize_email, valid_email};

/// Verify a submitted OTP and mint a single-use scan session.
///
/// A missing challenge, a mismatched code, and a concurrently consumed
/// challenge all produce the same "Invalid code" response so callers can not
/// probe which emails hold outstanding codes.
#[utoipa::path(
    post,
    path = "/v1/verifier/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Session minted", body = VerifyOtpResponse),
        (status = 400, description = "Missing email or code", body = String),
        (status = 401, description = "Invalid or expired code", body = String),
        (status = 429, description = "Rate limited", body = String),
        (status = 500, description = "Verification failed", body = String)
    ),
    tag = "verifier"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    state: Extension<Arc<VerifierState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let request: VerifyOtpRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    let code = request.otp.trim();
    if !valid_email(&email) || code.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Email and OTP required".to_string(),
        )
            .into_response();
    }

    if state
        .rate_limiter()
        .check_email(&email, RateLimitAction::VerifyOtp)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let challenge = match state.store().get_challenge(&email).await {
        Ok(Some(challenge)) if challenge.consumed_at.is_none() => challenge,
        Ok(_) => return (StatusCode::UNAUTHORIZED, "Invalid code".to_string()).into_response(),
        Err(err) => {
            error!("Failed to load challenge: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    };

    if challenge.code != code {
        return (StatusCode::UNAUTHORIZED, "Invalid code".to_string()).into_response();
    }

    let now = Utc::now();
    if challenge.is_expired(now) {
        return (StatusCode::UNAUTHORIZED, "Code expired".to_string()).into_response();
    }

    // Compare-and-set: only one concurrent verify can consume the challenge.
    match state.store().consume_challenge(&email, code).await {
        Ok(true) => {}
        Ok(false) => {
            return (StatusCode::UNAUTHORIZED, "Invalid code".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to consume challenge: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    }

    let client_ip = extract_client_ip(&headers);
    let device_info = extract_device_info(&headers);
    let session = match state
        .store()
        .create_session(
            &email,
            client_ip.clone(),
            device_info.clone(),
            state.config().session_ttl(),
        )
        .await
    {
        Ok(session) => session,
        Err(err) => {
            error!("Failed to create session: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    };

    let details = json!({ "device_info": device_info }).to_string();
    let entry = AuditEntry::new(email.clone(), client_ip, AuditKind::LoginSuccess, details);
    if let Err(err) = state.store().append_audit(entry).await {
        error!("Failed to append audit entry: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Verification failed".to_string(),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(VerifyOtpResponse {
            message: "OTP verified".to_string(),
            session_id: session.session_id,
            email,
        }),
    )
        .into_response()
}
