// SMTP email transport

use crate::config::MailConfig;
use crate::errors::NotifyError;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument, warn};

/// Email sender backed by an async SMTP relay.
///
/// When SMTP is not configured the sender is inert: sends are logged and
/// skipped, never errors that reach the scheduler.
pub struct EmailSender {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_address: String,
}

impl EmailSender {
    pub fn new(config: &MailConfig) -> Result<Self, NotifyError> {
        if !config.is_configured() {
            warn!("SMTP not configured, email notifications will be skipped");
            return Ok(Self {
                transport: None,
                from_address: String::new(),
            });
        }

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| NotifyError::EmailTransport(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport: Some(transport),
            from_address: config.from_address.clone(),
        })
    }

    /// Inert sender for deployments without email
    pub fn disabled() -> Self {
        Self {
            transport: None,
            from_address: String::new(),
        }
    }

    #[instrument(skip(self, body))]
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        if to.is_empty() {
            return Err(NotifyError::MissingContact("email address".to_string()));
        }

        let Some(transport) = &self.transport else {
            warn!(to = to, "Email not configured, message skipped");
            return Err(NotifyError::NotConfigured("Email"));
        };

        let from: Mailbox = self
            .from_address
            .parse()
            .map_err(|e| NotifyError::EmailTransport(format!("Invalid from address: {}", e)))?;
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| NotifyError::EmailTransport(format!("Invalid recipient: {}", e)))?;

        let message = Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| NotifyError::EmailTransport(e.to_string()))?;

        transport
            .send(message)
            .await
            .map_err(|e| NotifyError::EmailTransport(e.to_string()))?;

        info!(to = to, "Email sent");
        Ok(())
    }
}
