//! Hubtel SMS API.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{sender_for, SmsMessage, SmsProvider};
use crate::error::{NotifyError, NotifyResult};

pub const HUBTEL_URL: &str = "https://smsc.hubtel.com/v1/messages/send";

pub struct HubtelProvider {
    client: reqwest::Client,
    url: String,
    client_id: String,
    client_secret: String,
    default_sender: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    content: &'a str,
}

impl HubtelProvider {
    pub fn new(
        client: reqwest::Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        default_sender: Option<String>,
    ) -> Self {
        HubtelProvider {
            client,
            url: HUBTEL_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            default_sender: default_sender.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl SmsProvider for HubtelProvider {
    fn name(&self) -> &'static str {
        "hubtel"
    }

    async fn send(&self, message: &SmsMessage) -> NotifyResult<()> {
        let from = sender_for(self.default_sender.as_deref(), &message.sender_id);
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .json(&SendRequest {
                from,
                to: &message.phone_number,
                content: &message.body,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(to = %message.phone_number, "Hubtel accepted message");
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(NotifyError::Provider {
            provider: self.name(),
            message: format!("status {} {}", status.as_u16(), detail.chars().take(200).collect::<String>())
                .trim()
                .to_string(),
        })
    }
}
