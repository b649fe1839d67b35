//! In-memory store for local development and tests.
//!
//! A single `tokio::sync::Mutex` guards all state, so `mark_consumed` and
//! `consume_challenge` get their compare-and-set semantics from the lock:
//! the check and the write happen under one critical section.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{
    generate_session_id, AuditEntry, OtpChallenge, ScanConsumeOutcome, ScanState, Session,
    VerifierActivity, VerifierStore,
};

#[derive(Default)]
struct Inner {
    challenges: HashMap<String, OtpChallenge>,
    sessions: HashMap<String, Session>,
    audit: Vec<AuditEntry>,
}

#[derive(Default)]
pub struct MemoryVerifierStore {
    inner: Mutex<Inner>,
}

impl MemoryVerifierStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerifierStore for MemoryVerifierStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_challenge(&self, email: &str, challenge: OtpChallenge) -> Result<()> {
        let mut inner = self.inner.lock().await;
        // Replacing the row supersedes any outstanding code for this email.
        inner.challenges.insert(email.to_string(), challenge);
        Ok(())
    }

    async fn get_challenge(&self, email: &str) -> Result<Option<OtpChallenge>> {
        let inner = self.inner.lock().await;
        Ok(inner.challenges.get(email).cloned())
    }

    async fn consume_challenge(&self, email: &str, code: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.challenges.get_mut(email) {
            Some(challenge) if challenge.consumed_at.is_none() && challenge.code == code => {
                challenge.consumed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_session(
        &self,
        email: &str,
        client_ip: Option<String>,
        device_info: Option<String>,
        ttl: Duration,
    ) -> Result<Session> {
        let mut inner = self.inner.lock().await;
        for _ in 0..3 {
            let session_id = generate_session_id()?;
            if inner.sessions.contains_key(&session_id) {
                continue;
            }
            let now = Utc::now();
            let session = Session {
                session_id: session_id.clone(),
                email: email.to_string(),
                client_ip: client_ip.clone(),
                device_info: device_info.clone(),
                created_at: now,
                expires_at: now + ttl,
                last_login: now,
                scan_state: ScanState::Unused,
                consumed_scan: None,
            };
            inner.sessions.insert(session_id, session.clone());
            return Ok(session);
        }
        Err(anyhow!("failed to generate unique session id"))
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let inner = self.inner.lock().await;
        Ok(inner.sessions.get(session_id).cloned())
    }

    async fn mark_consumed(
        &self,
        session_id: &str,
        student_uid: &str,
        now: DateTime<Utc>,
    ) -> Result<ScanConsumeOutcome> {
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.sessions.get_mut(session_id) else {
            return Ok(ScanConsumeOutcome::NotFound);
        };
        if session.scan_state == ScanState::Consumed {
            return Ok(ScanConsumeOutcome::AlreadyConsumed);
        }
        if session.is_expired(now) {
            // Stale unused sessions stop authorizing scans without a sweeper.
            return Ok(ScanConsumeOutcome::NotFound);
        }
        session.scan_state = ScanState::Consumed;
        session.consumed_scan = Some(super::ConsumedScan {
            student_uid: student_uid.to_string(),
            scanned_at: now,
        });
        Ok(ScanConsumeOutcome::Consumed(session.clone()))
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.audit.push(entry);
        Ok(())
    }

    async fn list_audit(&self) -> Result<Vec<AuditEntry>> {
        let inner = self.inner.lock().await;
        let mut entries = inner.audit.clone();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn list_activity(&self) -> Result<Vec<VerifierActivity>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<VerifierActivity> = inner
            .sessions
            .values()
            .map(|session| VerifierActivity {
                email: session.email.clone(),
                client_ip: session.client_ip.clone(),
                last_login: session.last_login,
                last_scan: session.consumed_scan.as_ref().map(|scan| scan.scanned_at),
                scanned_student_uid: session
                    .consumed_scan
                    .as_ref()
                    .map(|scan| scan.student_uid.clone()),
                created_at: session.created_at,
            })
            .collect();
        rows.sort_by(|a, b| b.last_login.cmp(&a.last_login));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn challenge(code: &str) -> OtpChallenge {
        OtpChallenge::new(code.to_string(), Utc::now(), Duration::minutes(5))
    }

    #[tokio::test]
    async fn upsert_supersedes_previous_challenge() -> Result<()> {
        let store = MemoryVerifierStore::new();
        store
            .upsert_challenge("a@example.com", challenge("111111"))
            .await?;
        store
            .upsert_challenge("a@example.com", challenge("222222"))
            .await?;

        let current = store.get_challenge("a@example.com").await?;
        assert_eq!(current.map(|c| c.code), Some("222222".to_string()));
        // The first code is gone entirely, not just deprioritized.
        assert!(!store.consume_challenge("a@example.com", "111111").await?);
        Ok(())
    }

    #[tokio::test]
    async fn consume_challenge_is_single_shot() -> Result<()> {
        let store = MemoryVerifierStore::new();
        store
            .upsert_challenge("a@example.com", challenge("123456"))
            .await?;

        assert!(store.consume_challenge("a@example.com", "123456").await?);
        assert!(!store.consume_challenge("a@example.com", "123456").await?);
        Ok(())
    }

    #[tokio::test]
    async fn mark_consumed_transitions_once() -> Result<()> {
        let store = MemoryVerifierStore::new();
        let session = store
            .create_session("a@example.com", None, None, Duration::minutes(30))
            .await?;

        let now = Utc::now();
        let first = store
            .mark_consumed(&session.session_id, "uid-1", now)
            .await?;
        assert!(matches!(first, ScanConsumeOutcome::Consumed(_)));

        let second = store
            .mark_consumed(&session.session_id, "uid-2", now)
            .await?;
        assert!(matches!(second, ScanConsumeOutcome::AlreadyConsumed));

        let stored = store.get_session(&session.session_id).await?;
        let scan = stored.and_then(|s| s.consumed_scan);
        assert_eq!(scan.map(|s| s.student_uid), Some("uid-1".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn expired_session_reports_not_found() -> Result<()> {
        let store = MemoryVerifierStore::new();
        let session = store
            .create_session("a@example.com", None, None, Duration::minutes(30))
            .await?;

        let later = Utc::now() + Duration::minutes(31);
        let outcome = store
            .mark_consumed(&session.session_id, "uid-1", later)
            .await?;
        assert!(matches!(outcome, ScanConsumeOutcome::NotFound));
        Ok(())
    }

    #[tokio::test]
    async fn activity_rows_sort_by_last_login() -> Result<()> {
        let store = MemoryVerifierStore::new();
        store
            .create_session("first@example.com", None, None, Duration::minutes(30))
            .await?;
        store
            .create_session("second@example.com", Some("1.2.3.4".to_string()), None, Duration::minutes(30))
            .await?;

        let rows = store.list_activity().await?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].email, "second@example.com");
        assert_eq!(rows[0].client_ip.as_deref(), Some("1.2.3.4"));
        Ok(())
    }
}
