//! Request/response types for the verifier endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::store::{AuditEntry, AuditKind, VerifierActivity};
use crate::students::StudentRecord;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendOtpRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendOtpResponse {
    pub message: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpResponse {
    pub message: String,
    pub session_id: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ScanRequest {
    pub session_id: String,
    pub student_uid: String,
}

/// Minimal credential projection returned to verifiers. Never the full
/// record; the scan channel is single-use and low-friction by design.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct StudentProjection {
    pub name: String,
    pub program: Option<String>,
    pub batch: String,
    pub degree_status: String,
    pub degree_generated_date: Option<DateTime<Utc>>,
}

impl From<StudentRecord> for StudentProjection {
    fn from(record: StudentRecord) -> Self {
        Self {
            name: record.full_name,
            program: record.program,
            batch: record.batch.unwrap_or_else(|| "N/A".to_string()),
            degree_status: record.degree_status.unwrap_or_else(|| "Pending".to_string()),
            degree_generated_date: record.degree_generated_date,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ScanResponse {
    pub message: String,
    pub student: StudentProjection,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifierActivityEntry {
    pub email: String,
    pub ip: Option<String>,
    pub last_login: DateTime<Utc>,
    pub last_scan: Option<DateTime<Utc>>,
    pub scanned_student_uid: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<VerifierActivity> for VerifierActivityEntry {
    fn from(activity: VerifierActivity) -> Self {
        Self {
            email: activity.email,
            ip: activity.client_ip,
            last_login: activity.last_login,
            last_scan: activity.last_scan,
            scanned_student_uid: activity.scanned_student_uid,
            created_at: activity.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuditEventEntry {
    pub email: String,
    pub ip: Option<String>,
    pub kind: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl From<AuditEntry> for AuditEventEntry {
    fn from(entry: AuditEntry) -> Self {
        let kind = match entry.kind {
            AuditKind::OtpSent => "otp_sent",
            AuditKind::LoginSuccess => "login_success",
            AuditKind::ScanPerformed => "scan_performed",
        };
        Self {
            email: entry.email,
            ip: entry.client_ip,
            kind: kind.to_string(),
            details: entry.details,
            created_at: entry.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogsResponse {
    pub count: usize,
    pub verifiers: Vec<VerifierActivityEntry>,
    pub events: Vec<AuditEventEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn send_otp_request_round_trips() -> Result<()> {
        let request = SendOtpRequest {
            email: "verifier@example.com".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let decoded: SendOtpRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.email, "verifier@example.com");
        Ok(())
    }

    #[test]
    fn projection_applies_original_defaults() {
        let projection = StudentProjection::from(StudentRecord {
            uid: "uid-1".to_string(),
            full_name: "Ada Lovelace".to_string(),
            program: Some("BSCS".to_string()),
            batch: None,
            degree_status: None,
            degree_generated_date: None,
        });
        assert_eq!(projection.batch, "N/A");
        assert_eq!(projection.degree_status, "Pending");
    }

    #[test]
    fn audit_event_entry_maps_kind() {
        let entry = AuditEntry::new(
            "verifier@example.com".to_string(),
            Some("1.2.3.4".to_string()),
            AuditKind::ScanPerformed,
            String::new(),
        );
        let event = AuditEventEntry::from(entry);
        assert_eq!(event.kind, "scan_performed");
        assert_eq!(event.ip.as_deref(), Some("1.2.3.4"));
    }
}
