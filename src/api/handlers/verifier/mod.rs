//! Verifier handlers and supporting modules.
//!
//! This module coordinates the verifier login flow (email OTP) and the
//! single-use credential scan a verified session is entitled to.
//!
//! ## Flow
//!
//! 1. `POST /v1/verifier/send-otp` mints a six-digit code, emails it, and
//!    supersedes any outstanding code for the same address.
//! 2. `POST /v1/verifier/verify-otp` checks the code, consumes the challenge
//!    with a compare-and-set, and mints a session.
//! 3. `POST /v1/verifier/scan` spends the session's one scan and returns the
//!    student projection. Repeats answer 409.
//!
//! The OTP code itself never appears in a response body or a log line.

pub(crate) mod logs;
pub(crate) mod otp;
pub(crate) mod rate_limit;
pub(crate) mod scan;
mod state;
pub(crate) mod types;
mod utils;
pub(crate) mod verify;

pub use logs::logs;
pub use otp::send_otp;
pub use rate_limit::{CooldownRateLimiter, NoopRateLimiter, RateLimiter};
pub use scan::scan;
pub use state::{VerifierConfig, VerifierState};
pub use verify::verify_otp;
