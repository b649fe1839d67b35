//! Verifier record store: challenges, sessions, and the audit trail.
//!
//! The store is the single shared mutable resource in the scan flow. Session
//! consumption goes through [`VerifierStore::mark_consumed`], an atomic
//! compare-and-set on `scan_state`, so two concurrent scans for the same
//! session cannot both succeed. Handlers hold no locks of their own.

pub mod memory;
pub mod postgres;

pub use memory::MemoryVerifierStore;
pub use postgres::PgVerifierStore;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

/// One issued OTP for a verifier email. A single row per email exists at any
/// time; re-issuing replaces it.
#[derive(Debug, Clone)]
pub struct OtpChallenge {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl OtpChallenge {
    #[must_use]
    pub fn new(code: String, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            code,
            issued_at,
            expires_at: issued_at + ttl,
            consumed_at: None,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Whether a session still authorizes a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Unused,
    Consumed,
}

impl ScanState {
    /// Parse the persisted `verifier_sessions.scan_state` textual value.
    pub(crate) fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "unused" => Ok(Self::Unused),
            "consumed" => Ok(Self::Consumed),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid verifier_sessions.scan_state value: {value}"),
            )))),
        }
    }

    pub(crate) const fn as_db(self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Consumed => "consumed",
        }
    }
}

/// The one scan a session paid for, once performed.
#[derive(Debug, Clone)]
pub struct ConsumedScan {
    pub student_uid: String,
    pub scanned_at: DateTime<Utc>,
}

/// An authenticated verifier login. Insert-only; the only mutation is the
/// `scan_state` transition.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub email: String,
    pub client_ip: Option<String>,
    pub device_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    pub scan_state: ScanState,
    pub consumed_scan: Option<ConsumedScan>,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Result of the scan compare-and-set. `NotFound` covers unknown and expired
/// sessions alike; callers surface both as an invalid session.
#[derive(Debug)]
pub enum ScanConsumeOutcome {
    Consumed(Session),
    AlreadyConsumed,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    OtpSent,
    LoginSuccess,
    ScanPerformed,
}

impl AuditKind {
    pub(crate) fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "otp_sent" => Ok(Self::OtpSent),
            "login_success" => Ok(Self::LoginSuccess),
            "scan_performed" => Ok(Self::ScanPerformed),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid verifier_audit.kind value: {value}"),
            )))),
        }
    }

    pub(crate) const fn as_db(self) -> &'static str {
        match self {
            Self::OtpSent => "otp_sent",
            Self::LoginSuccess => "login_success",
            Self::ScanPerformed => "scan_performed",
        }
    }
}

/// Append-only audit record. Never mutated or deleted by the service.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: Uuid,
    pub email: String,
    pub client_ip: Option<String>,
    pub kind: AuditKind,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(email: String, client_ip: Option<String>, kind: AuditKind, details: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            client_ip,
            kind,
            details,
            created_at: Utc::now(),
        }
    }
}

/// Per-session activity row for the admin listing.
#[derive(Debug, Clone)]
pub struct VerifierActivity {
    pub email: String,
    pub client_ip: Option<String>,
    pub last_login: DateTime<Utc>,
    pub last_scan: Option<DateTime<Utc>>,
    pub scanned_student_uid: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persistence contract for verifier state.
///
/// Challenge rows are upserted (one per email), sessions are insert-only, and
/// the audit trail is append-only. All operations may run concurrently.
#[async_trait]
pub trait VerifierStore: Send + Sync {
    /// Liveness probe for `/health`.
    async fn ping(&self) -> Result<()>;

    /// Install a new challenge for `email`, superseding any prior one.
    async fn upsert_challenge(&self, email: &str, challenge: OtpChallenge) -> Result<()>;

    /// Current challenge row for `email`, consumed or not.
    async fn get_challenge(&self, email: &str) -> Result<Option<OtpChallenge>>;

    /// Mark the challenge consumed if it is still live and the code matches.
    /// Returns `false` when another request already consumed it (or the code
    /// no longer matches the stored row).
    async fn consume_challenge(&self, email: &str, code: &str) -> Result<bool>;

    /// Insert a fresh session for `email` with a unique opaque id.
    async fn create_session(
        &self,
        email: &str,
        client_ip: Option<String>,
        device_info: Option<String>,
        ttl: Duration,
    ) -> Result<Session>;

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>>;

    /// Compare-and-set `scan_state` from `Unused` to `Consumed`, recording the
    /// scanned student uid. Expired sessions report [`ScanConsumeOutcome::NotFound`].
    async fn mark_consumed(
        &self,
        session_id: &str,
        student_uid: &str,
        now: DateTime<Utc>,
    ) -> Result<ScanConsumeOutcome>;

    async fn append_audit(&self, entry: AuditEntry) -> Result<()>;

    /// All audit entries, most recent first.
    async fn list_audit(&self) -> Result<Vec<AuditEntry>>;

    /// Per-session activity rows, most recent login first.
    async fn list_activity(&self) -> Result<Vec<VerifierActivity>>;
}

/// Create a new opaque session id.
///
/// The raw value is handed to the verifier and doubles as the lookup key;
/// 32 random bytes keep collisions out of reach, and the store retries on the
/// off chance one occurs.
pub(crate) fn generate_session_id() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session id")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_expiry_is_issued_plus_ttl() {
        let now = Utc::now();
        let challenge = OtpChallenge::new("123456".to_string(), now, Duration::minutes(5));
        assert_eq!(challenge.expires_at, now + Duration::minutes(5));
        assert!(!challenge.is_expired(now + Duration::minutes(5)));
        assert!(challenge.is_expired(now + Duration::minutes(5) + Duration::seconds(1)));
    }

    #[test]
    fn scan_state_round_trips_db_values() {
        assert_eq!(ScanState::from_db("unused").ok(), Some(ScanState::Unused));
        assert_eq!(
            ScanState::from_db("consumed").ok(),
            Some(ScanState::Consumed)
        );
        assert!(ScanState::from_db("bogus").is_err());
        assert_eq!(ScanState::Unused.as_db(), "unused");
        assert_eq!(ScanState::Consumed.as_db(), "consumed");
    }

    #[test]
    fn audit_kind_round_trips_db_values() {
        for kind in [
            AuditKind::OtpSent,
            AuditKind::LoginSuccess,
            AuditKind::ScanPerformed,
        ] {
            assert_eq!(AuditKind::from_db(kind.as_db()).ok(), Some(kind));
        }
        assert!(AuditKind::from_db("bogus").is_err());
    }

    #[test]
    fn generate_session_id_is_unique_and_decodable() {
        let first = generate_session_id().expect("session id");
        let second = generate_session_id().expect("session id");
        assert_ne!(first, second);
        let decoded = Base64UrlUnpadded::decode_vec(&first).expect("decode");
        assert_eq!(decoded.len(), 32);
    }
}
