pub mod server;

use secrecy::SecretString;

/// Server settings resolved from CLI flags and environment.
#[derive(Debug)]
pub struct ServerArgs {
    pub port: u16,
    pub dsn: Option<String>,
    pub frontend_url: String,
    pub otp_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub otp_cooldown_seconds: u64,
    pub email_api_url: Option<String>,
    pub email_api_key: Option<SecretString>,
    pub email_from: String,
    pub email_from_name: String,
    pub students_url: Option<String>,
}

#[derive(Debug)]
pub enum Action {
    Server(ServerArgs),
}
