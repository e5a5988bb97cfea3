//! Notification gateway — delivers templated plain-text messages through an
//! HTTP mail relay.
//!
//! The gateway is best-effort: missing credentials suppress the send with a
//! warning instead of failing, and no workflow transition ever blocks on a
//! delivery outcome. At most one delivery attempt is made per call; callers
//! that need at-most-once-ever semantics pair this with an idempotency flag
//! (see `notify`).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::config::Config;
use crate::errors::{Result, WorkflowError};

/// Outcome of a send attempt that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The transport accepted the message.
    Sent,
    /// Credentials were absent; no attempt was made. Not an error.
    Suppressed,
}

/// A fully addressed plain-text message.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub reply_to: Option<String>,
}

/// Transport seam. The production implementation posts to an HTTP relay;
/// tests substitute a recording implementation.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &OutboundMessage) -> Result<()>;
}

/// Relay credentials: sender address plus the relay secret.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub address: String,
    pub secret: String,
}

// ─────────────────────────────────────────────────────────
// HTTP relay transport
// ─────────────────────────────────────────────────────────

/// Posts messages as JSON to the configured relay endpoint. The underlying
/// HTTP client is built once on first use and reused for the process
/// lifetime; a construction failure surfaces as `TransportFailure` on that
/// first call rather than at startup.
pub struct HttpRelayTransport {
    relay_url: String,
    secret: String,
    client: OnceCell<Client>,
}

impl HttpRelayTransport {
    pub fn new(relay_url: String, secret: String) -> Self {
        Self {
            relay_url,
            secret,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| async {
                Client::builder()
                    .timeout(std::time::Duration::from_secs(30))
                    .build()
                    .map_err(|e| WorkflowError::TransportFailure(e.to_string()))
            })
            .await
    }
}

#[async_trait]
impl MailTransport for HttpRelayTransport {
    async fn deliver(&self, message: &OutboundMessage) -> Result<()> {
        let client = self.client().await?;
        let response = client
            .post(&self.relay_url)
            .bearer_auth(&self.secret)
            .json(&json!({
                "from": message.from,
                "to": message.to,
                "subject": message.subject,
                "text": message.body,
                "reply_to": message.reply_to,
            }))
            .send()
            .await
            .map_err(|e| WorkflowError::TransportFailure(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(WorkflowError::TransportFailure(format!(
                "relay returned {}",
                response.status()
            )))
        }
    }
}

// ─────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────

/// The single outbound-mail handle shared across the process, injected
/// wherever notifications are dispatched.
pub struct Mailer {
    credentials: Option<Credentials>,
    transport: Arc<dyn MailTransport>,
}

impl Mailer {
    /// Build the production gateway from configuration. Either credential
    /// value missing puts the gateway into suppressed mode.
    pub fn from_config(config: &Config) -> Self {
        let credentials = match (&config.smtp_email, &config.smtp_password) {
            (Some(address), Some(secret)) => Some(Credentials {
                address: address.clone(),
                secret: secret.clone(),
            }),
            _ => None,
        };
        let secret = credentials
            .as_ref()
            .map(|c| c.secret.clone())
            .unwrap_or_default();
        Self {
            credentials,
            transport: Arc::new(HttpRelayTransport::new(config.mail_relay_url.clone(), secret)),
        }
    }

    /// Build a gateway over an arbitrary transport (used by tests).
    pub fn with_transport(credentials: Option<Credentials>, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            credentials,
            transport,
        }
    }

    /// Send one templated plain-text message. Returns `Suppressed` (with a
    /// warning log) when credentials are absent; `TransportFailure` when the
    /// single delivery attempt fails.
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<SendOutcome> {
        let Some(credentials) = &self.credentials else {
            warn!("SMTP credentials not set. Email not sent: to={to} subject={subject:?}");
            return Ok(SendOutcome::Suppressed);
        };

        let message = OutboundMessage {
            from: format!("\"Parish Care Notifications\" <{}>", credentials.address),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            reply_to: None,
        };
        self.transport.deliver(&message).await?;
        Ok(SendOutcome::Sent)
    }
}
