//! SMTP transport via a lettre relay.

use async_trait::async_trait;
use lettre::Transport as _;
use lettre::transport::smtp::authentication::Credentials;
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::SmtpConfig;
use crate::error::{Error, TransportError};
use crate::mail::Message;
use crate::transport::{Transport, render};

/// Sends through an SMTP relay with STARTTLS/TLS negotiated by lettre.
pub struct SmtpTransport {
    host: String,
    inner: lettre::SmtpTransport,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let mut builder = lettre::SmtpTransport::relay(&config.host)
            .map_err(|e| TransportError::SendFailed {
                name: "smtp".into(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ));
        }
        Ok(Self {
            host: config.host.clone(),
            inner: builder.build(),
        })
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send_messages(&self, messages: Vec<Message>) -> Result<usize, Error> {
        let mut sent = 0;
        for msg in &messages {
            let email = render(msg).await?;
            let inner = self.inner.clone();
            tokio::task::spawn_blocking(move || inner.send(&email))
                .await
                .map_err(|e| TransportError::SendFailed {
                    name: "smtp".into(),
                    reason: format!("SMTP task failed: {e}"),
                })?
                .map_err(|e| TransportError::SendFailed {
                    name: "smtp".into(),
                    reason: format!("SMTP send failed: {e}"),
                })?;
            info!(host = %self.host, to = ?msg.to, "Email sent");
            sent += 1;
        }
        Ok(sent)
    }
}
