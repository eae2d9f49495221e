//! Arkesel SMS API v2.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{sender_for, SmsMessage, SmsProvider};
use crate::error::{NotifyError, NotifyResult};

pub const ARKESEL_URL: &str = "https://sms.arkesel.com/api/v2/sms/send";

pub struct ArkeselProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    /// Registered account sender id; stands in for the platform default.
    default_sender: Option<String>,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    sender: &'a str,
    message: &'a str,
    recipients: [&'a str; 1],
}

#[derive(Deserialize)]
struct SendResponse {
    status: Option<String>,
    message: Option<String>,
}

impl ArkeselProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, default_sender: Option<String>) -> Self {
        ArkeselProvider {
            client,
            url: ARKESEL_URL.to_string(),
            api_key: api_key.into(),
            default_sender: default_sender.filter(|s| !s.trim().is_empty()),
        }
    }

    /// Points the provider at another endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl SmsProvider for ArkeselProvider {
    fn name(&self) -> &'static str {
        "arkesel"
    }

    async fn send(&self, message: &SmsMessage) -> NotifyResult<()> {
        let sender = sender_for(self.default_sender.as_deref(), &message.sender_id);
        let body = SendRequest {
            sender,
            message: &message.body,
            recipients: [&message.phone_number],
        };

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let parsed: Option<SendResponse> = response.json().await.ok();
        let accepted = parsed
            .as_ref()
            .and_then(|r| r.status.as_deref())
            .is_some_and(|s| s.eq_ignore_ascii_case("success"));

        if status.is_success() && accepted {
            debug!(to = %message.phone_number, "Arkesel accepted message");
            return Ok(());
        }

        let detail = parsed.and_then(|r| r.message).unwrap_or_default();
        Err(NotifyError::Provider {
            provider: self.name(),
            message: format!("status {} {}", status.as_u16(), detail).trim().to_string(),
        })
    }
}
