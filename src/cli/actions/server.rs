use crate::api::{self, email, VerifierConfig, VerifierState};
use crate::cli::actions::{Action, ServerArgs};
use crate::store::{MemoryVerifierStore, PgVerifierStore, VerifierStore};
use crate::students::{HttpStudentDirectory, StaticStudentDirectory, StudentDirectory};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::api::handlers::verifier::{CooldownRateLimiter, NoopRateLimiter, RateLimiter};

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server(args) = action;

    let config = VerifierConfig::new(args.frontend_url.clone())
        .with_otp_ttl_seconds(args.otp_ttl_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_otp_cooldown_seconds(args.otp_cooldown_seconds)
        .with_email_from(args.email_from_name.clone(), args.email_from.clone());

    let store = build_store(&args).await?;
    let email = build_email_sender(&args, &config)?;
    let students = build_student_directory(&args)?;

    let rate_limiter: Arc<dyn RateLimiter> = if args.otp_cooldown_seconds == 0 {
        Arc::new(NoopRateLimiter)
    } else {
        Arc::new(CooldownRateLimiter::new(config.otp_cooldown()))
    };

    let state = Arc::new(VerifierState::new(
        config,
        store,
        email,
        students,
        rate_limiter,
    ));

    api::new(args.port, state).await
}

async fn build_store(args: &ServerArgs) -> Result<Arc<dyn VerifierStore>> {
    match &args.dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn)
                .await
                .context("Failed to connect to database")?;

            Ok(Arc::new(PgVerifierStore::new(pool)))
        }
        None => {
            warn!("Using the in-memory store, state is lost on restart");
            Ok(Arc::new(MemoryVerifierStore::new()))
        }
    }
}

fn build_email_sender(
    args: &ServerArgs,
    config: &VerifierConfig,
) -> Result<Arc<dyn email::EmailSender>> {
    match (&args.email_api_url, &args.email_api_key) {
        (Some(endpoint), Some(api_key)) => {
            info!(endpoint = %endpoint, "Using HTTP email sender");
            Ok(Arc::new(email::HttpEmailSender::new(
                endpoint.clone(),
                api_key.clone(),
                config.email_from_name().to_string(),
                config.email_from_address().to_string(),
            )?))
        }
        _ => {
            warn!("No email API configured, OTP emails are logged instead of sent");
            Ok(Arc::new(email::LogEmailSender))
        }
    }
}

fn build_student_directory(args: &ServerArgs) -> Result<Arc<dyn StudentDirectory>> {
    match &args.students_url {
        Some(base_url) => {
            info!(base_url = %base_url, "Using HTTP student directory");
            Ok(Arc::new(HttpStudentDirectory::new(base_url.clone())?))
        }
        None => {
            warn!("No student directory configured, every scan reports not registered");
            Ok(Arc::new(StaticStudentDirectory::new(Vec::new())))
        }
    }
}
