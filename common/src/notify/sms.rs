// Twilio SMS transport

use crate::config::TwilioConfig;
use crate::errors::NotifyError;
use tracing::{info, instrument, warn};

/// SMS sender backed by the Twilio Messages REST API.
///
/// Unconfigured credentials make the sender inert: sends are logged and
/// skipped rather than erroring into the scheduler.
pub struct SmsSender {
    http: reqwest::Client,
    config: TwilioConfig,
}

impl SmsSender {
    pub fn new(config: TwilioConfig) -> Self {
        if !config.is_configured() {
            warn!("Twilio not configured, SMS notifications will be skipped");
        }
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    #[instrument(skip(self, body))]
    pub async fn send(&self, phone_number: &str, body: &str) -> Result<(), NotifyError> {
        if phone_number.is_empty() {
            return Err(NotifyError::MissingContact("phone number".to_string()));
        }
        if !self.config.is_configured() {
            warn!(phone_number = phone_number, "SMS not configured, message skipped");
            return Err(NotifyError::NotConfigured("SMS"));
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base, self.config.account_sid
        );

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", phone_number),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .map_err(|e| NotifyError::SmsTransport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(NotifyError::SmsTransport(format!(
                "Twilio returned {}: {}",
                status, detail
            )));
        }

        info!(phone_number = phone_number, "SMS sent");
        Ok(())
    }
}
