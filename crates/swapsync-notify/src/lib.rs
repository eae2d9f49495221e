//! # swapsync-notify: SMS Pipeline and Scheduler for SwapSync
//!
//! Turns committed engine events into customer SMS and runs the periodic
//! jobs (due-repair reminders, manager greetings).
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SMS Pipeline                                    │
//! │                                                                         │
//! │  swapsync-db engines                                                    │
//! │       │ NotificationSink::publish (after commit)                        │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 swapsync-notify (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │  DispatcherHandle ─► queue ─► workers ─► SmsGateway             │   │
//! │  │                                              │                  │   │
//! │  │  Scheduler ─► notify_due_repairs             ├─► Arkesel         │   │
//! │  │           └─► manager broadcasts ────────────┤                  │   │
//! │  │                                              └─► Hubtel          │   │
//! │  │  SmsConfigStore (Fernet-encrypted credentials, cached)          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`dispatcher`] - Bounded queue and worker pool
//! - [`gateway`] - Provider failover
//! - [`provider`] - Arkesel and Hubtel HTTP clients
//! - [`store`] - Decrypted, cached provider settings
//! - [`crypto`] - Fernet encryption of stored secrets
//! - [`scheduler`] - Periodic jobs
//! - [`templates`] - Message bodies
//!
//! ## Usage
//!
//! ```rust,ignore
//! let store = Arc::new(SmsConfigStore::new(db.sms_config(), cipher));
//! let gateway = Arc::new(SmsGateway::new(store, config.provider_timeout)?);
//! let (dispatcher, handle) = SmsDispatcher::start(gateway.clone(), db.notifications(), &config);
//! let db = db.with_notifier(Arc::new(handle));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod crypto;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod scheduler;
pub mod store;
pub mod templates;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::NotifyConfig;
pub use crypto::SecretCipher;
pub use dispatcher::{DispatcherHandle, SmsDispatcher, SmsJob};
pub use error::{NotifyError, NotifyResult};
pub use gateway::{Delivery, SmsGateway};
pub use provider::{ArkeselProvider, HubtelProvider, SmsMessage, SmsProvider};
pub use scheduler::{broadcasts_due, Broadcast, Scheduler, SchedulerHandle};
pub use store::{SmsConfigStore, SmsSettings};
