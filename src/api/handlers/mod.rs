//! API handlers for the verifier service.

pub mod health;
pub mod verifier;
