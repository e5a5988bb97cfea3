//! Application configuration loaded from environment variables.

use crate::errors::{Result, WorkflowError};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// HTTP mail relay endpoint the gateway posts messages to
    pub mail_relay_url: String,
    /// Sender address for outbound notifications (None ⇒ sends suppressed)
    pub smtp_email: Option<String>,
    /// Relay secret paired with the sender address (None ⇒ sends suppressed)
    pub smtp_password: Option<String>,
    /// Fixed administrative mailbox copied on new submissions
    pub admin_email: String,
    /// Trusted public origin used to build endorsement links.
    /// Deliberately never derived from caller-supplied input.
    pub public_origin: String,
    /// How often (in seconds) the reminder sweep wakes up
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./parish_care.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| WorkflowError::Config("Invalid API_PORT".to_string()))?,
            mail_relay_url: env_var("MAIL_RELAY_URL")
                .unwrap_or_else(|_| "https://mail-relay.parishcare.org/v1/messages".to_string()),
            smtp_email: env_var("SMTP_EMAIL").ok(),
            smtp_password: env_var("SMTP_PASSWORD").ok(),
            admin_email: env_var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@parishcare.org".to_string()),
            public_origin: env_var("PUBLIC_ORIGIN")
                .unwrap_or_else(|_| "https://parishcare.org".to_string()),
            sweep_interval_secs: env_var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .map_err(|_| WorkflowError::Config("Invalid SWEEP_INTERVAL_SECS".to_string()))?,
        })
    }

    /// Public endorsement link handed to the supervising pastor.
    pub fn endorsement_link(&self, token: &str) -> String {
        format!("{}/#endorse?token={token}", self.public_origin)
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| WorkflowError::Config(format!("Missing env var: {key}")))
}
