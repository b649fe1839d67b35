//! Verifier configuration and shared handler state.

use chrono::Duration;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::api::email::EmailSender;
use crate::store::VerifierStore;
use crate::students::StudentDirectory;

use super::rate_limit::RateLimiter;

const DEFAULT_OTP_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_OTP_COOLDOWN_SECONDS: u64 = 30;
const DEFAULT_FROM_NAME: &str = "Verifier System";
const DEFAULT_FROM_EMAIL: &str = "no-reply@veriscan.dev";

#[derive(Clone, Debug)]
pub struct VerifierConfig {
    frontend_base_url: String,
    otp_ttl_seconds: i64,
    session_ttl_seconds: i64,
    otp_cooldown_seconds: u64,
    email_from_name: String,
    email_from_address: String,
}

impl VerifierConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            otp_cooldown_seconds: DEFAULT_OTP_COOLDOWN_SECONDS,
            email_from_name: DEFAULT_FROM_NAME.to_string(),
            email_from_address: DEFAULT_FROM_EMAIL.to_string(),
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_cooldown_seconds(mut self, seconds: u64) -> Self {
        self.otp_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_email_from(mut self, name: String, address: String) -> Self {
        self.email_from_name = name;
        self.email_from_address = address;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn otp_ttl(&self) -> Duration {
        Duration::seconds(self.otp_ttl_seconds)
    }

    /// Human-readable OTP lifetime for the email body. Whole minutes render
    /// as minutes; anything else renders as seconds.
    pub(super) fn otp_ttl_display(&self) -> String {
        match (self.otp_ttl_seconds / 60, self.otp_ttl_seconds % 60) {
            (1, 0) => "1 minute".to_string(),
            (minutes, 0) => format!("{minutes} minutes"),
            (_, _) if self.otp_ttl_seconds == 1 => "1 second".to_string(),
            _ => format!("{} seconds", self.otp_ttl_seconds),
        }
    }

    pub(super) fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl_seconds)
    }

    #[must_use]
    pub fn otp_cooldown(&self) -> StdDuration {
        StdDuration::from_secs(self.otp_cooldown_seconds)
    }

    pub(crate) fn email_from_name(&self) -> &str {
        &self.email_from_name
    }

    pub(crate) fn email_from_address(&self) -> &str {
        &self.email_from_address
    }
}

/// Shared state for verifier handlers: configuration plus the pluggable
/// store, email dispatcher, student directory, and rate limiter.
pub struct VerifierState {
    config: VerifierConfig,
    store: Arc<dyn VerifierStore>,
    email: Arc<dyn EmailSender>,
    students: Arc<dyn StudentDirectory>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl VerifierState {
    #[must_use]
    pub fn new(
        config: VerifierConfig,
        store: Arc<dyn VerifierStore>,
        email: Arc<dyn EmailSender>,
        students: Arc<dyn StudentDirectory>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            config,
            store,
            email,
            students,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn VerifierStore {
        self.store.as_ref()
    }

    pub(super) fn email(&self) -> &dyn EmailSender {
        self.email.as_ref()
    }

    pub(super) fn students(&self) -> &dyn StudentDirectory {
        self.students.as_ref()
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_overrides() {
        let config = VerifierConfig::new("https://verify.example.edu".to_string());
        assert_eq!(config.frontend_base_url(), "https://verify.example.edu");
        assert_eq!(config.otp_ttl(), Duration::seconds(DEFAULT_OTP_TTL_SECONDS));
        assert_eq!(config.otp_ttl_display(), "5 minutes");
        assert_eq!(
            config.session_ttl(),
            Duration::seconds(DEFAULT_SESSION_TTL_SECONDS)
        );
        assert_eq!(config.otp_cooldown(), StdDuration::from_secs(30));
        assert_eq!(config.email_from_name(), DEFAULT_FROM_NAME);

        let config = config
            .with_otp_ttl_seconds(120)
            .with_session_ttl_seconds(600)
            .with_otp_cooldown_seconds(5)
            .with_email_from("Registrar".to_string(), "otp@example.edu".to_string());
        assert_eq!(config.otp_ttl(), Duration::seconds(120));
        assert_eq!(config.otp_ttl_display(), "2 minutes");
        assert_eq!(config.session_ttl(), Duration::seconds(600));
        assert_eq!(config.otp_cooldown(), StdDuration::from_secs(5));
        assert_eq!(config.email_from_address(), "otp@example.edu");
    }

    #[test]
    fn otp_ttl_display_handles_partial_minutes() {
        let config = |seconds| {
            VerifierConfig::new("http://localhost:5173".to_string()).with_otp_ttl_seconds(seconds)
        };
        assert_eq!(config(60).otp_ttl_display(), "1 minute");
        assert_eq!(config(90).otp_ttl_display(), "90 seconds");
        assert_eq!(config(45).otp_ttl_display(), "45 seconds");
        assert_eq!(config(1).otp_ttl_display(), "1 second");
    }
}
