//! Postgres-backed store.
//!
//! The correctness-critical pieces are plain conditional `UPDATE`s: consuming
//! a challenge or a session only succeeds when the row is still in the
//! expected prior state, so concurrent requests resolve in the database
//! rather than in application code.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgRow, Connection, FromRow, PgPool, Row};
use tracing::Instrument;

use super::{
    generate_session_id, AuditEntry, AuditKind, ConsumedScan, OtpChallenge, ScanConsumeOutcome,
    ScanState, Session, VerifierActivity, VerifierStore,
};

pub struct PgVerifierStore {
    pool: PgPool,
}

impl PgVerifierStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl<'r> FromRow<'r, PgRow> for Session {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let scan_state: String = row.try_get("scan_state")?;
        let scanned_student_uid: Option<String> = row.try_get("scanned_student_uid")?;
        let scanned_at: Option<DateTime<Utc>> = row.try_get("scanned_at")?;
        let consumed_scan = match (scanned_student_uid, scanned_at) {
            (Some(student_uid), Some(scanned_at)) => Some(ConsumedScan {
                student_uid,
                scanned_at,
            }),
            _ => None,
        };
        Ok(Self {
            session_id: row.try_get("session_id")?,
            email: row.try_get("email")?,
            client_ip: row.try_get("client_ip")?,
            device_info: row.try_get("device_info")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            last_login: row.try_get("last_login")?,
            scan_state: ScanState::from_db(&scan_state)?,
            consumed_scan,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for OtpChallenge {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            code: row.try_get("code")?,
            issued_at: row.try_get("issued_at")?,
            expires_at: row.try_get("expires_at")?,
            consumed_at: row.try_get("consumed_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for AuditEntry {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            client_ip: row.try_get("client_ip")?,
            kind: AuditKind::from_db(&kind)?,
            details: row.try_get("details")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl VerifierStore for PgVerifierStore {
    async fn ping(&self) -> Result<()> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut connection = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;

        let ping_span =
            tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        connection
            .ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }

    async fn upsert_challenge(&self, email: &str, challenge: OtpChallenge) -> Result<()> {
        // Single row per email: the upsert supersedes any outstanding code and
        // clears its consumed marker in the same statement.
        let query = r"
            INSERT INTO verifier_challenges (email, code, issued_at, expires_at, consumed_at)
            VALUES ($1, $2, $3, $4, NULL)
            ON CONFLICT (email) DO UPDATE
            SET code = EXCLUDED.code,
                issued_at = EXCLUDED.issued_at,
                expires_at = EXCLUDED.expires_at,
                consumed_at = NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .bind(&challenge.code)
            .bind(challenge.issued_at)
            .bind(challenge.expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to upsert challenge")?;
        Ok(())
    }

    async fn get_challenge(&self, email: &str) -> Result<Option<OtpChallenge>> {
        let query = r"
            SELECT code, issued_at, expires_at, consumed_at
            FROM verifier_challenges
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, OtpChallenge>(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch challenge")
    }

    async fn consume_challenge(&self, email: &str, code: &str) -> Result<bool> {
        // Compare-and-set: only one verify attempt can flip consumed_at.
        let query = r"
            UPDATE verifier_challenges
            SET consumed_at = NOW()
            WHERE email = $1
              AND code = $2
              AND consumed_at IS NULL
            RETURNING email
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume challenge")?;
        Ok(row.is_some())
    }

    async fn create_session(
        &self,
        email: &str,
        client_ip: Option<String>,
        device_info: Option<String>,
        ttl: Duration,
    ) -> Result<Session> {
        let query = r"
            INSERT INTO verifier_sessions
                (session_id, email, client_ip, device_info, created_at, expires_at, last_login)
            VALUES ($1, $2, $3, $4, $5, $6, $5)
            RETURNING session_id, email, client_ip, device_info, created_at, expires_at,
                      last_login, scan_state, scanned_student_uid, scanned_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );

        for _ in 0..3 {
            let session_id = generate_session_id()?;
            let now = Utc::now();
            let result = sqlx::query_as::<_, Session>(query)
                .bind(&session_id)
                .bind(email)
                .bind(client_ip.as_deref())
                .bind(device_info.as_deref())
                .bind(now)
                .bind(now + ttl)
                .fetch_one(&self.pool)
                .instrument(span.clone())
                .await;

            match result {
                Ok(session) => return Ok(session),
                Err(err) if is_unique_violation(&err) => {}
                Err(err) => return Err(err).context("failed to insert session"),
            }
        }

        Err(anyhow!("failed to generate unique session id"))
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let query = r"
            SELECT session_id, email, client_ip, device_info, created_at, expires_at,
                   last_login, scan_state, scanned_student_uid, scanned_at
            FROM verifier_sessions
            WHERE session_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, Session>(query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch session")
    }

    async fn mark_consumed(
        &self,
        session_id: &str,
        student_uid: &str,
        now: DateTime<Utc>,
    ) -> Result<ScanConsumeOutcome> {
        // The conditional UPDATE is the whole anti-replay guarantee: among
        // concurrent scans for one session, exactly one matches the
        // scan_state = 'unused' predicate.
        let query = r"
            UPDATE verifier_sessions
            SET scan_state = $4,
                scanned_student_uid = $2,
                scanned_at = $3
            WHERE session_id = $1
              AND scan_state = $5
              AND expires_at > $3
            RETURNING session_id, email, client_ip, device_info, created_at, expires_at,
                      last_login, scan_state, scanned_student_uid, scanned_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let updated = sqlx::query_as::<_, Session>(query)
            .bind(session_id)
            .bind(student_uid)
            .bind(now)
            .bind(ScanState::Consumed.as_db())
            .bind(ScanState::Unused.as_db())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume session")?;

        if let Some(session) = updated {
            return Ok(ScanConsumeOutcome::Consumed(session));
        }

        // The CAS missed; look at the row to tell replay apart from an
        // unknown or expired session.
        let query = "SELECT scan_state FROM verifier_sessions WHERE session_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to inspect session state")?;

        match row {
            Some(row) => {
                let state: String = row.try_get("scan_state")?;
                if ScanState::from_db(&state)? == ScanState::Consumed {
                    Ok(ScanConsumeOutcome::AlreadyConsumed)
                } else {
                    // Unused but past its expiry.
                    Ok(ScanConsumeOutcome::NotFound)
                }
            }
            None => Ok(ScanConsumeOutcome::NotFound),
        }
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<()> {
        let query = r"
            INSERT INTO verifier_audit (id, email, client_ip, kind, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(entry.id)
            .bind(&entry.email)
            .bind(entry.client_ip.as_deref())
            .bind(entry.kind.as_db())
            .bind(&entry.details)
            .bind(entry.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to append audit entry")?;
        Ok(())
    }

    async fn list_audit(&self) -> Result<Vec<AuditEntry>> {
        let query = r"
            SELECT id, email, client_ip, kind, details, created_at
            FROM verifier_audit
            ORDER BY created_at DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, AuditEntry>(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list audit entries")
    }

    async fn list_activity(&self) -> Result<Vec<VerifierActivity>> {
        let query = r"
            SELECT email, client_ip, last_login, scanned_at AS last_scan,
                   scanned_student_uid, created_at
            FROM verifier_sessions
            ORDER BY last_login DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list verifier activity")?;

        let mut activity = Vec::with_capacity(rows.len());
        for row in rows {
            activity.push(VerifierActivity {
                email: row.try_get("email")?,
                client_ip: row.try_get("client_ip")?,
                last_login: row.try_get("last_login")?,
                last_scan: row.try_get("last_scan")?,
                scanned_student_uid: row.try_get("scanned_student_uid")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(activity)
    }
}
