//! # SMS Providers
//!
//! One HTTP call per message, no retries; failover lives in the gateway.
//!
//! - [`arkesel::ArkeselProvider`] - primary
//! - [`hubtel::HubtelProvider`] - fallback

pub mod arkesel;
pub mod hubtel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use swapsync_core::DEFAULT_SMS_SENDER;

use crate::error::NotifyResult;

pub use arkesel::ArkeselProvider;
pub use hubtel::HubtelProvider;

/// A rendered SMS ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsMessage {
    /// Already normalised (`233xxxxxxxxx`).
    pub phone_number: String,
    pub body: String,
    pub sender_id: String,
}

/// An SMS gateway account.
#[async_trait]
pub trait SmsProvider: Send + Sync {
    /// Short name used in logs and [`crate::gateway::Delivery`].
    fn name(&self) -> &'static str;

    async fn send(&self, message: &SmsMessage) -> NotifyResult<()>;
}

/// A tenant's branded sender wins; the platform default gives way to the
/// account's registered sender id.
pub(crate) fn sender_for<'a>(registered: Option<&'a str>, tenant: &'a str) -> &'a str {
    match registered {
        Some(registered) if tenant == DEFAULT_SMS_SENDER => registered,
        _ => tenant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_choice() {
        assert_eq!(sender_for(Some("SSYNC"), DEFAULT_SMS_SENDER), "SSYNC");
        assert_eq!(sender_for(Some("SSYNC"), "Kofis Phone"), "Kofis Phone");
        assert_eq!(sender_for(None, DEFAULT_SMS_SENDER), DEFAULT_SMS_SENDER);
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-process providers for failover tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::error::NotifyError;

    pub struct FakeProvider {
        name: &'static str,
        fail: bool,
        calls: AtomicUsize,
        sent: Mutex<Vec<SmsMessage>>,
    }

    impl FakeProvider {
        pub fn ok(name: &'static str) -> Self {
            FakeProvider {
                name,
                fail: false,
                calls: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(name: &'static str) -> Self {
            FakeProvider {
                fail: true,
                ..FakeProvider::ok(name)
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn sent(&self) -> Vec<SmsMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SmsProvider for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, message: &SmsMessage) -> NotifyResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(NotifyError::Provider {
                    provider: self.name,
                    message: "status 500".into(),
                });
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}
