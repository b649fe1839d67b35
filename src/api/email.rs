//! Email dispatch boundary.
//!
//! OTP issuance hands a rendered message to an [`EmailSender`]. The default
//! for local dev is [`LogEmailSender`], which records delivery metadata and
//! returns `Ok(())`. Production uses [`HttpEmailSender`] against a
//! transactional email API. Bodies carry the OTP code, so neither sender
//! ever logs a message body.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;
use tracing::info;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub html_body: String,
}

/// Delivery abstraction consumed by the issuance handler.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error so the caller can report a
    /// dispatch failure.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs delivery metadata instead of sending mail.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        // Metadata only; the body contains the OTP code.
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

/// Sender backed by a transactional email HTTP API.
pub struct HttpEmailSender {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    from_name: String,
    from_email: String,
}

impl HttpEmailSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: String,
        api_key: SecretString,
        from_name: String,
        from_email: String,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build email client")?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            from_name,
            from_email,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let payload = json!({
            "sender": { "name": self.from_name, "email": self.from_email },
            "to": [{ "email": message.to_email }],
            "subject": message.subject,
            "htmlContent": message.html_body,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .context("email API request failed")?;

        let status = response.status();
        if !status.is_success() {
            // Keep the body out of the error; it may echo the request.
            return Err(anyhow!("email API returned {status}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_sender_accepts_messages() -> Result<()> {
        let sender = LogEmailSender;
        sender
            .send(&EmailMessage {
                to_email: "verifier@example.com".to_string(),
                subject: "Your Verifier OTP".to_string(),
                html_body: "<p>code</p>".to_string(),
            })
            .await
    }

    #[test]
    fn http_sender_builds() -> Result<()> {
        let sender = HttpEmailSender::new(
            "https://api.mail.example/v3/smtp/email".to_string(),
            SecretString::from("key".to_string()),
            "Verifier System".to_string(),
            "no-reply@veriscan.dev".to_string(),
        )?;
        assert_eq!(sender.from_name, "Verifier System");
        Ok(())
    }
}
