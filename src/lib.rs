//! veriscan: verifier OTP sessions and single-use credential scans.
//!
//! Verifiers log in with a short-lived email OTP. A successful verification
//! mints an opaque session entitled to exactly one credential scan, and every
//! step lands in an append-only audit trail.

pub mod api;
pub mod cli;
pub mod store;
pub mod students;

pub use api::{APP_USER_AGENT, GIT_COMMIT_HASH};
