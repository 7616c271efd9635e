use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::models::{Check, Status};

/// Upper bound on one webhook delivery.
const WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected alert with status {0}")]
    Rejected(u16),
}

/// Notifies someone that a check changed state.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn dispatch(&self, check: &Check) -> Result<(), AlertError>;
}

pub fn alert_message(check: &Check) -> String {
    format!(
        "ALERT: check for {} {} is {}",
        check.method.to_uppercase(),
        check.url,
        check.state
    )
}

#[derive(Debug, Default, Clone)]
pub struct LogAlerter;

#[async_trait]
impl AlertDispatcher for LogAlerter {
    async fn dispatch(&self, check: &Check) -> Result<(), AlertError> {
        warn!(check_id = %check.id, "{}", alert_message(check));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WebhookAlerter {
    client: Client,
    url: String,
}

impl WebhookAlerter {
    pub fn new(url: impl Into<String>) -> reqwest::Result<Self> {
        Self::with_timeout(url, Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl AlertDispatcher for WebhookAlerter {
    async fn dispatch(&self, check: &Check) -> Result<(), AlertError> {
        warn!(check_id = %check.id, "{}", alert_message(check));
        let payload = serde_json::json!({
            "id": check.id,
            "method": check.method.to_uppercase(),
            "url": check.url,
            "state": check.state,
            "recovered": check.state == Status::Up,
            "message": alert_message(check),
            "timestamp": Utc::now().to_rfc3339(),
        });
        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(AlertError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_method_url_and_state() {
        let mut check = Check::new("abcdefghij0123456789", "http://example.com/x", "get", vec![200], 1);
        check.state = Status::Up;
        assert_eq!(alert_message(&check), "ALERT: check for GET http://example.com/x is up");
    }

    #[tokio::test]
    async fn log_alerter_never_fails() {
        let check = Check::new("abcdefghij0123456789", "http://example.com", "get", vec![200], 1);
        assert!(LogAlerter.dispatch(&check).await.is_ok());
    }
}
