/// SMS delivery through the Twilio REST API
use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;
use tokio::time::Duration;

use crate::config::{AlertConfig, TwilioCredentials};
use crate::error::DeliveryError;

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Sends one message to one recipient
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Returns the provider's id for the accepted message
    async fn send(&self, from: &str, to: &str, body: &str) -> Result<String, DeliveryError>;
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
}

#[derive(Debug, Clone)]
pub struct TwilioMessenger {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<TwilioCredentials>,
}

impl TwilioMessenger {
    pub fn new(config: &AlertConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: config.twilio_url.trim_end_matches('/').to_string(),
            credentials: config.twilio.clone(),
        })
    }
}

#[async_trait]
impl Messenger for TwilioMessenger {
    async fn send(&self, from: &str, to: &str, body: &str) -> Result<String, DeliveryError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(DeliveryError::NotConfigured("Twilio credentials missing"))?;

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, credentials.account_sid
        );

        let response = self
            .client
            .post(url)
            .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message: MessageResponse = response.json().await?;
        Ok(message.sid)
    }
}

/// Outcome of sending one message to every recipient
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Send `body` to each recipient in turn. A failure is logged and the
/// remaining recipients are still attempted.
pub async fn deliver(
    messenger: &dyn Messenger,
    from: &str,
    recipients: &[String],
    body: &str,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for to in recipients {
        match messenger.send(from, to, body).await {
            Ok(sid) => {
                info!("Message {} sent to {}", sid, to);
                report.delivered += 1;
            }
            Err(e) => {
                warn!("Failed to send message to {}: {}", to, e);
                report.failed += 1;
            }
        }
    }

    report
}
