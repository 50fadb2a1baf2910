//! Transactional email dispatch.
//!
//! Notifications are a fire-and-forget side effect of reconciliation:
//! the [`dispatch`] wrapper logs failures and swallows them, so no email
//! outcome ever changes the result of the operation that triggered it.

pub mod templates;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("mail transport error: {0}")]
    Network(String),
    #[error("mail provider rejected request ({status}): {message}")]
    Api { status: u16, message: String },
}

/// One rendered email, ready to hand to the provider.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError>;
}

/// Sends `message` and logs any failure without propagating it.
pub async fn dispatch(mailer: &dyn Mailer, message: EmailMessage) {
    let to = message.to.clone();
    let subject = message.subject.clone();
    match mailer.send(message).await {
        Ok(()) => info!(to = %to, subject = %subject, "notification sent"),
        Err(err) => {
            warn!(to = %to, subject = %subject, error = %err, "notification dispatch failed")
        }
    }
}

/// Resend HTTP client (bearer key, JSON body).
#[derive(Clone)]
pub struct ResendMailer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new(api_key: String, from: String) -> Result<Self, NotificationError> {
        Self::with_base_url(api_key, from, "https://api.resend.com".to_string())
    }

    pub fn with_base_url(
        api_key: String,
        from: String,
        base_url: String,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::Network(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    #[instrument(skip(self, message), fields(to = %message.to, subject = %message.subject))]
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [message.to],
                "subject": message.subject,
                "html": message.html,
            }))
            .send()
            .await
            .map_err(|e| NotificationError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(NotificationError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
