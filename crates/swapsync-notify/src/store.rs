//! # SMS Settings Store
//!
//! Decrypted provider settings, cached in memory.
//!
//! ```text
//! load()   ── cache hit ──────────────────────────────► SmsSettings
//!          └─ miss ─► sms_config row ─► decrypt ─► cache
//! update() ─► encrypt ─► upsert row ─► replace cache (write lock held)
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use swapsync_core::{Action, Actor};
use swapsync_db::{SmsConfigRepository, SmsConfigRow};

use crate::crypto::SecretCipher;
use crate::error::{NotifyError, NotifyResult};

/// Provider settings with secrets in the clear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsSettings {
    pub sms_enabled: bool,
    pub arkesel_enabled: bool,
    pub arkesel_api_key: Option<String>,
    pub arkesel_sender_id: Option<String>,
    pub hubtel_enabled: bool,
    pub hubtel_client_id: Option<String>,
    pub hubtel_client_secret: Option<String>,
    pub hubtel_sender_id: Option<String>,
}

impl SmsSettings {
    /// Flag set and key present.
    pub fn arkesel_ready(&self) -> bool {
        self.arkesel_enabled && present(&self.arkesel_api_key)
    }

    /// Flag set and both credentials present.
    pub fn hubtel_ready(&self) -> bool {
        self.hubtel_enabled && present(&self.hubtel_client_id) && present(&self.hubtel_client_secret)
    }

    /// Copy safe to show an admin: secrets replaced by a mask.
    pub fn masked(&self) -> SmsSettings {
        let mask = |s: &Option<String>| s.as_ref().map(|_| "********".to_string());
        SmsSettings {
            arkesel_api_key: mask(&self.arkesel_api_key),
            hubtel_client_id: mask(&self.hubtel_client_id),
            hubtel_client_secret: mask(&self.hubtel_client_secret),
            ..self.clone()
        }
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Cached, decrypting view of the `sms_config` row.
#[derive(Debug)]
pub struct SmsConfigStore {
    repo: SmsConfigRepository,
    cipher: Option<SecretCipher>,
    cache: RwLock<Option<SmsSettings>>,
}

impl SmsConfigStore {
    /// `cipher` is `None` when no encryption key is configured; stored
    /// secrets are then unreadable and SMS stays off.
    pub fn new(repo: SmsConfigRepository, cipher: Option<SecretCipher>) -> Self {
        SmsConfigStore {
            repo,
            cipher,
            cache: RwLock::new(None),
        }
    }

    /// Current settings, from the cache when warm.
    pub async fn load(&self) -> NotifyResult<SmsSettings> {
        if let Some(settings) = self.cache.read().await.as_ref() {
            return Ok(settings.clone());
        }

        let mut cache = self.cache.write().await;
        if let Some(settings) = cache.as_ref() {
            return Ok(settings.clone());
        }
        let settings = match self.repo.get().await? {
            Some(row) => self.decrypt_row(row),
            None => SmsSettings::default(),
        };
        *cache = Some(settings.clone());
        Ok(settings)
    }

    /// Saves new settings. Super admin only.
    pub async fn update(&self, actor: &Actor, settings: SmsSettings) -> NotifyResult<SmsSettings> {
        actor.authorize(Action::ManageSmsSettings)?;
        let cipher = self.cipher.as_ref().ok_or(NotifyError::EncryptionKeyMissing)?;

        let row = SmsConfigRow {
            arkesel_api_key: cipher.encrypt_opt(settings.arkesel_api_key.as_deref()),
            arkesel_sender_id: settings.arkesel_sender_id.clone(),
            arkesel_enabled: settings.arkesel_enabled,
            hubtel_client_id: cipher.encrypt_opt(settings.hubtel_client_id.as_deref()),
            hubtel_client_secret: cipher.encrypt_opt(settings.hubtel_client_secret.as_deref()),
            hubtel_sender_id: settings.hubtel_sender_id.clone(),
            hubtel_enabled: settings.hubtel_enabled,
            sms_enabled: settings.sms_enabled,
            updated_at: None,
        };

        let mut cache = self.cache.write().await;
        self.repo.upsert(&row).await?;
        *cache = Some(settings.clone());
        info!(by = actor.user_id, "SMS settings updated");
        Ok(settings)
    }

    /// Drops the cache so the next load reads the row again.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    fn decrypt_row(&self, row: SmsConfigRow) -> SmsSettings {
        let base = SmsSettings {
            sms_enabled: row.sms_enabled,
            arkesel_enabled: row.arkesel_enabled,
            arkesel_sender_id: row.arkesel_sender_id.clone(),
            hubtel_enabled: row.hubtel_enabled,
            hubtel_sender_id: row.hubtel_sender_id.clone(),
            ..SmsSettings::default()
        };

        let Some(cipher) = &self.cipher else {
            warn!("SMS_ENCRYPTION_KEY not set; SMS disabled");
            return SmsSettings {
                sms_enabled: false,
                ..base
            };
        };

        let secrets = (|| {
            Ok::<_, NotifyError>((
                cipher.decrypt_opt(row.arkesel_api_key.as_deref())?,
                cipher.decrypt_opt(row.hubtel_client_id.as_deref())?,
                cipher.decrypt_opt(row.hubtel_client_secret.as_deref())?,
            ))
        })();

        match secrets {
            Ok((arkesel_api_key, hubtel_client_id, hubtel_client_secret)) => SmsSettings {
                arkesel_api_key,
                hubtel_client_id,
                hubtel_client_secret,
                ..base
            },
            Err(err) => {
                warn!(error = %err, "Stored SMS credentials unreadable; SMS disabled");
                SmsSettings {
                    sms_enabled: false,
                    ..base
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use swapsync_core::Role;
    use swapsync_db::{Database, DbConfig};

    fn settings() -> SmsSettings {
        SmsSettings {
            sms_enabled: true,
            arkesel_enabled: true,
            arkesel_api_key: Some("ark-secret".into()),
            hubtel_enabled: true,
            hubtel_client_id: Some("client".into()),
            hubtel_client_secret: Some("secret".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_secrets_encrypted_at_rest() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cipher = SecretCipher::new(&SecretCipher::generate_key()).unwrap();
        let store = SmsConfigStore::new(db.sms_config(), Some(cipher.clone()));
        let admin = Actor::new(1, Role::SuperAdmin, None);

        store.update(&admin, settings()).await.unwrap();

        let row = db.sms_config().get().await.unwrap().unwrap();
        assert_ne!(row.arkesel_api_key.as_deref(), Some("ark-secret"));

        let fresh = SmsConfigStore::new(db.sms_config(), Some(cipher));
        let loaded = fresh.load().await.unwrap();
        assert_eq!(loaded, settings());
        assert!(loaded.arkesel_ready() && loaded.hubtel_ready());
        assert_eq!(loaded.masked().arkesel_api_key.as_deref(), Some("********"));
    }

    #[tokio::test]
    async fn test_without_key_sms_stays_off() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cipher = SecretCipher::new(&SecretCipher::generate_key()).unwrap();
        let admin = Actor::new(1, Role::SuperAdmin, None);
        SmsConfigStore::new(db.sms_config(), Some(cipher))
            .update(&admin, settings())
            .await
            .unwrap();

        let keyless = SmsConfigStore::new(db.sms_config(), None);
        let loaded = keyless.load().await.unwrap();
        assert!(!loaded.sms_enabled);
        assert!(!loaded.arkesel_ready());
        assert!(matches!(
            keyless.update(&admin, settings()).await,
            Err(NotifyError::EncryptionKeyMissing)
        ));
    }

    #[tokio::test]
    async fn test_only_super_admin_updates() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cipher = SecretCipher::new(&SecretCipher::generate_key()).unwrap();
        let store = SmsConfigStore::new(db.sms_config(), Some(cipher));
        let manager = Actor::new(2, Role::Manager, None);
        let err = store.update(&manager, settings()).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}
