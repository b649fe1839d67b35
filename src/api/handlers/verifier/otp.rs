//! OTP issuance endpoint.

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

use crate::api::email::EmailMessage;
use crate::store::{AuditEntry, AuditKind, OtpChallenge};

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::VerifierState;
use super::types::{SendOtpRequest, SendOtpResponse};
use super::utils::{
    extract_client_ip, extract_device_info, generate_otp_code, normalize_email, valid_email,
};

/// Issue a fresh OTP for a verifier email, superseding any outstanding code.
#[utoipa::path(
    post,
    path = "/v1/verifier/send-otp",
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "OTP sent", body = SendOtpResponse),
        (status = 400, description = "Missing or malformed email", body = String),
        (status = 429, description = "Rate limited", body = String),
        (status = 502, description = "Email dispatch failed", body = String)
    ),
    tag = "verifier"
)]
pub async fn send_otp(
    headers: HeaderMap,
    state: Extension<Arc<VerifierState>>,
    payload: Option<Json<SendOtpRequest>>,
) -> impl IntoResponse {
    let request: SendOtpRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    // Cooldown bounds how fast codes can be minted for one identity.
    if state
        .rate_limiter()
        .check_email(&email, RateLimitAction::SendOtp)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let challenge = OtpChallenge::new(generate_otp_code(), Utc::now(), state.config().otp_ttl());
    let code = challenge.code.clone();

    // Store first: a dispatch failure leaves the challenge in place so a
    // re-issue (or retry) can still complete the login.
    if let Err(err) = state.store().upsert_challenge(&email, challenge).await {
        error!("Failed to store challenge: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error sending OTP".to_string(),
        )
            .into_response();
    }

    let message = EmailMessage {
        to_email: email.clone(),
        subject: "Your Verifier OTP".to_string(),
        html_body: format!(
            "<p>Your OTP is <strong>{code}</strong>. It expires in {}.</p>",
            state.config().otp_ttl_display()
        ),
    };
    if let Err(err) = state.email().send(&message).await {
        // The error text stays server-side; the code never leaves via logs.
        error!(to_email = %email, "Failed to dispatch OTP email: {err}");
        return (StatusCode::BAD_GATEWAY, "Error sending OTP".to_string()).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    let details = json!({ "device_info": extract_device_info(&headers) }).to_string();
    let entry = AuditEntry::new(email.clone(), client_ip, AuditKind::OtpSent, details);
    if let Err(err) = state.store().append_audit(entry).await {
        error!("Failed to append audit entry: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error sending OTP".to_string(),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(SendOtpResponse {
            message: "OTP sent".to_string(),
            email,
        }),
    )
        .into_response()
}
