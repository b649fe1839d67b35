//! Rate limiting primitives for the verifier flows.
//!
//! The issuance cooldown bounds the brute-force window on the 900k-value OTP
//! space; it is a policy layer, not part of the state machine, so the trait
//! keeps it swappable (and `NoopRateLimiter` keeps tests deterministic).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub enum RateLimitAction {
    SendOtp,
    VerifyOtp,
    Scan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _email: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

/// In-process issuance cooldown: at most one OTP per email per window.
///
/// State is per instance and resets on restart, which is acceptable for a
/// policy add-on. Multi-instance deployments that need a shared window can
/// implement [`RateLimiter`] against the database instead.
#[derive(Debug)]
pub struct CooldownRateLimiter {
    window: Duration,
    last_issued: Mutex<HashMap<String, Instant>>,
}

impl CooldownRateLimiter {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_issued: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for CooldownRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        if !matches!(action, RateLimitAction::SendOtp) {
            return RateLimitDecision::Allowed;
        }
        let Ok(mut last_issued) = self.last_issued.lock() else {
            // A poisoned lock fails open; issuance stays available.
            return RateLimitDecision::Allowed;
        };
        last_issued.retain(|_, at| at.elapsed() < self.window);
        match last_issued.get(email) {
            Some(at) if at.elapsed() < self.window => RateLimitDecision::Limited,
            _ => {
                last_issued.insert(email.to_string(), Instant::now());
                RateLimitDecision::Allowed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::SendOtp),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::VerifyOtp),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn cooldown_limits_repeat_issuance() {
        let limiter = CooldownRateLimiter::new(Duration::from_secs(30));
        assert_eq!(
            limiter.check_email("a@example.com", RateLimitAction::SendOtp),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("a@example.com", RateLimitAction::SendOtp),
            RateLimitDecision::Limited
        );
        // Another identity is unaffected.
        assert_eq!(
            limiter.check_email("b@example.com", RateLimitAction::SendOtp),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn cooldown_only_applies_to_issuance() {
        let limiter = CooldownRateLimiter::new(Duration::from_secs(30));
        assert_eq!(
            limiter.check_email("a@example.com", RateLimitAction::SendOtp),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("a@example.com", RateLimitAction::VerifyOtp),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("a@example.com", RateLimitAction::Scan),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn cooldown_expires() {
        let limiter = CooldownRateLimiter::new(Duration::from_millis(0));
        assert_eq!(
            limiter.check_email("a@example.com", RateLimitAction::SendOtp),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("a@example.com", RateLimitAction::SendOtp),
            RateLimitDecision::Allowed
        );
    }
}
