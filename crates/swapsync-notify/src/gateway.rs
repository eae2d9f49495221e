//! # SMS Gateway
//!
//! Sends one message through the first provider that accepts it.
//!
//! ```text
//! send(phone, body, sender)
//!   │ normalise 0XX… → 233XX…   (undeliverable → InvalidRecipient)
//!   │ settings.sms_enabled?     (no → SmsDisabled)
//!   ├─► Arkesel  (if enabled) ── ok ──► Delivery { provider: "arkesel" }
//!   │      └ fail
//!   ├─► Hubtel   (if enabled) ── ok ──► Delivery { provider: "hubtel" }
//!   │      └ fail
//!   └─► AllProvidersFailed
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use swapsync_core::phone::{is_deliverable, normalize_ghana_number};

use crate::error::{NotifyError, NotifyResult};
use crate::provider::{ArkeselProvider, HubtelProvider, SmsMessage, SmsProvider};
use crate::store::{SmsConfigStore, SmsSettings};

/// Which provider delivered a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub provider: &'static str,
}

enum ProviderSource {
    /// Built per send from the stored settings.
    Configured {
        store: Arc<SmsConfigStore>,
        client: reqwest::Client,
    },
    /// Always enabled, in the given order.
    Fixed(Vec<Arc<dyn SmsProvider>>),
}

/// Provider failover front.
pub struct SmsGateway {
    source: ProviderSource,
}

impl std::fmt::Debug for SmsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.source {
            ProviderSource::Configured { .. } => "configured",
            ProviderSource::Fixed(_) => "fixed",
        };
        f.debug_struct("SmsGateway").field("source", &kind).finish()
    }
}

impl SmsGateway {
    /// Gateway over the stored settings. Each provider call times out
    /// after `timeout`.
    ///
    /// Fails when the HTTP client cannot be built (TLS backend missing).
    pub fn new(store: Arc<SmsConfigStore>, timeout: Duration) -> NotifyResult<Self> {
        let client = http_client(timeout)?;
        Ok(SmsGateway {
            source: ProviderSource::Configured { store, client },
        })
    }

    /// Gateway over a fixed provider list, tried in order.
    pub fn with_providers(providers: Vec<Arc<dyn SmsProvider>>) -> Self {
        SmsGateway {
            source: ProviderSource::Fixed(providers),
        }
    }

    /// Normalises the number and sends with failover.
    pub async fn send(&self, phone_number: &str, body: &str, sender_id: &str) -> NotifyResult<Delivery> {
        let normalised = normalize_ghana_number(phone_number);
        if !is_deliverable(&normalised) {
            return Err(NotifyError::InvalidRecipient(phone_number.to_string()));
        }

        let providers = self.providers().await?;
        let message = SmsMessage {
            phone_number: normalised,
            body: body.to_string(),
            sender_id: sender_id.to_string(),
        };
        deliver(&providers, &message).await
    }

    async fn providers(&self) -> NotifyResult<Vec<Arc<dyn SmsProvider>>> {
        match &self.source {
            ProviderSource::Fixed(providers) => Ok(providers.clone()),
            ProviderSource::Configured { store, client } => {
                let settings = store.load().await?;
                if !settings.sms_enabled {
                    return Err(NotifyError::SmsDisabled);
                }
                Ok(configured_providers(&settings, client))
            }
        }
    }
}

fn http_client(timeout: Duration) -> NotifyResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

fn configured_providers(settings: &SmsSettings, client: &reqwest::Client) -> Vec<Arc<dyn SmsProvider>> {
    let mut providers: Vec<Arc<dyn SmsProvider>> = Vec::with_capacity(2);
    if settings.arkesel_ready() {
        if let Some(api_key) = &settings.arkesel_api_key {
            providers.push(Arc::new(ArkeselProvider::new(
                client.clone(),
                api_key.clone(),
                settings.arkesel_sender_id.clone(),
            )));
        }
    }
    if settings.hubtel_ready() {
        if let (Some(id), Some(secret)) = (&settings.hubtel_client_id, &settings.hubtel_client_secret) {
            providers.push(Arc::new(HubtelProvider::new(
                client.clone(),
                id.clone(),
                secret.clone(),
                settings.hubtel_sender_id.clone(),
            )));
        }
    }
    providers
}

/// Tries each provider in order until one accepts.
pub async fn deliver(providers: &[Arc<dyn SmsProvider>], message: &SmsMessage) -> NotifyResult<Delivery> {
    let mut failures = Vec::new();
    for provider in providers {
        match provider.send(message).await {
            Ok(()) => {
                debug!(provider = provider.name(), to = %message.phone_number, "SMS delivered");
                return Ok(Delivery {
                    provider: provider.name(),
                });
            }
            Err(err) => {
                warn!(provider = provider.name(), error = %err, "SMS provider failed");
                failures.push(format!("{}: {}", provider.name(), err));
            }
        }
    }
    if failures.is_empty() {
        failures.push("no provider enabled".to_string());
    }
    Err(NotifyError::AllProvidersFailed(failures))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fakes::FakeProvider;
    use swapsync_db::{Database, DbConfig};

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let arkesel = Arc::new(FakeProvider::ok("arkesel"));
        let hubtel = Arc::new(FakeProvider::ok("hubtel"));
        let gateway = SmsGateway::with_providers(vec![arkesel.clone(), hubtel.clone()]);

        let delivery = gateway.send("024 123 4567", "hello", "SwapSync").await.unwrap();
        assert_eq!(delivery.provider, "arkesel");
        assert_eq!(arkesel.sent()[0].phone_number, "233241234567");
        assert_eq!(hubtel.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_hubtel() {
        let arkesel = Arc::new(FakeProvider::failing("arkesel"));
        let hubtel = Arc::new(FakeProvider::ok("hubtel"));
        let gateway = SmsGateway::with_providers(vec![arkesel.clone(), hubtel.clone()]);

        let delivery = gateway.send("0241234567", "hello", "SwapSync").await.unwrap();
        assert_eq!(delivery.provider, "hubtel");
        assert_eq!(arkesel.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_failed() {
        let gateway = SmsGateway::with_providers(vec![
            Arc::new(FakeProvider::failing("arkesel")),
            Arc::new(FakeProvider::failing("hubtel")),
        ]);
        let err = gateway.send("0241234567", "hello", "SwapSync").await.unwrap_err();
        assert!(matches!(err, NotifyError::AllProvidersFailed(ref reasons) if reasons.len() == 2));

        let empty = SmsGateway::with_providers(Vec::new());
        assert!(matches!(
            empty.send("0241234567", "hello", "SwapSync").await,
            Err(NotifyError::AllProvidersFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_walk_in_number_never_sent() {
        let arkesel = Arc::new(FakeProvider::ok("arkesel"));
        let gateway = SmsGateway::with_providers(vec![arkesel.clone()]);
        let err = gateway.send("0000000000", "hello", "SwapSync").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(arkesel.calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_settings() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = Arc::new(SmsConfigStore::new(db.sms_config(), None));
        let gateway = SmsGateway::new(store, Duration::from_secs(1)).unwrap();
        let err = gateway.send("0241234567", "hello", "SwapSync").await.unwrap_err();
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn test_provider_call_times_out() {
        // Accepts connections, never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stall = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let client = http_client(Duration::from_millis(200)).unwrap();
        let arkesel = ArkeselProvider::new(client, "key", None).with_url(format!("http://{addr}/sms"));
        let message = SmsMessage {
            phone_number: "233241234567".into(),
            body: "hello".into(),
            sender_id: "SwapSync".into(),
        };

        let result = tokio::time::timeout(Duration::from_secs(5), arkesel.send(&message))
            .await
            .expect("client timeout should fire first");
        assert!(matches!(result, Err(NotifyError::Http(ref e)) if e.is_timeout()));
        stall.abort();
    }

    #[test]
    fn test_provider_enablement() {
        let client = reqwest::Client::new();
        let mut settings = SmsSettings {
            sms_enabled: true,
            arkesel_enabled: true,
            hubtel_enabled: true,
            hubtel_client_id: Some("id".into()),
            ..Default::default()
        };
        // Arkesel has no key, Hubtel no secret.
        assert!(configured_providers(&settings, &client).is_empty());

        settings.hubtel_client_secret = Some("secret".into());
        let providers = configured_providers(&settings, &client);
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name(), "hubtel");
    }
}
