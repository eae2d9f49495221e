//! # Notify Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Notify Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐  │
//! │  │  Settings       │  │   Delivery      │  │   Plumbing              │  │
//! │  │                 │  │                 │  │                         │  │
//! │  │  SmsDisabled    │  │  Provider       │  │  QueueClosed            │  │
//! │  │  KeyMissing     │  │  Http           │  │  Db                     │  │
//! │  │  Crypto         │  │  AllFailed      │  │  QueueFull              │  │
//! │  │                 │  │  InvalidRecip.  │  │                         │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery errors never reach the engine that published the event; the
//! dispatcher logs them.

use swapsync_db::DbError;
use thiserror::Error;

/// Result type alias for notify operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// SMS is switched off in the settings.
    #[error("SMS sending is disabled")]
    SmsDisabled,

    /// Every enabled provider failed, or none is enabled.
    #[error("No SMS provider delivered the message: {}", .0.join("; "))]
    AllProvidersFailed(Vec<String>),

    /// A provider answered but refused the message.
    #[error("{provider} rejected the message: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// Transport failure talking to a provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The recipient does not normalise to a deliverable number.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Stored credentials could not be decrypted, or the key is malformed.
    #[error("Credential encryption error: {0}")]
    Crypto(String),

    /// `SMS_ENCRYPTION_KEY` is not set.
    #[error("SMS_ENCRYPTION_KEY is not configured")]
    EncryptionKeyMissing,

    /// The dispatcher queue is at capacity.
    #[error("SMS queue full")]
    QueueFull,

    /// The dispatcher queue is gone.
    #[error("SMS queue closed")]
    QueueClosed,

    #[error(transparent)]
    Db(#[from] DbError),
}

impl NotifyError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            NotifyError::SmsDisabled => 503,
            NotifyError::InvalidRecipient(_) => 400,
            NotifyError::Db(err) => err.status_code(),
            _ => 500,
        }
    }
}

impl From<swapsync_core::CoreError> for NotifyError {
    fn from(err: swapsync_core::CoreError) -> Self {
        NotifyError::Db(DbError::Domain(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(NotifyError::SmsDisabled.status_code(), 503);
        assert_eq!(NotifyError::QueueClosed.status_code(), 500);
        let forbidden: NotifyError = swapsync_core::CoreError::forbidden("no").into();
        assert_eq!(forbidden.status_code(), 403);
    }

    #[test]
    fn test_all_failed_lists_reasons() {
        let err = NotifyError::AllProvidersFailed(vec!["arkesel: 500".into(), "hubtel: timeout".into()]);
        assert!(err.to_string().contains("arkesel: 500; hubtel: timeout"));
    }
}
