//! # Credential Encryption
//!
//! SMS provider secrets are stored as Fernet tokens (AES-128-CBC with an
//! HMAC-SHA256 tag) under the key in `SMS_ENCRYPTION_KEY`.

use std::sync::Arc;

use fernet::Fernet;

use crate::error::{NotifyError, NotifyResult};

/// Fernet cipher for stored secrets.
#[derive(Clone)]
pub struct SecretCipher {
    fernet: Arc<Fernet>,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretCipher(..)")
    }
}

impl SecretCipher {
    /// Builds a cipher from a url-safe base64 32-byte key.
    pub fn new(key: &str) -> NotifyResult<Self> {
        let fernet = Fernet::new(key.trim())
            .ok_or_else(|| NotifyError::Crypto("SMS_ENCRYPTION_KEY is not a valid Fernet key".to_string()))?;
        Ok(SecretCipher {
            fernet: Arc::new(fernet),
        })
    }

    /// Fresh random key, for provisioning.
    pub fn generate_key() -> String {
        Fernet::generate_key()
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        self.fernet.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt(&self, token: &str) -> NotifyResult<String> {
        let bytes = self
            .fernet
            .decrypt(token)
            .map_err(|_| NotifyError::Crypto("stored credential failed to decrypt".to_string()))?;
        String::from_utf8(bytes).map_err(|_| NotifyError::Crypto("stored credential is not UTF-8".to_string()))
    }

    /// Encrypts an optional secret; blank stays `None`.
    pub fn encrypt_opt(&self, plaintext: Option<&str>) -> Option<String> {
        plaintext
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| self.encrypt(s))
    }

    pub fn decrypt_opt(&self, token: Option<&str>) -> NotifyResult<Option<String>> {
        token.map(|t| self.decrypt(t)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_decrypt_with_same_key_only() {
        let cipher = SecretCipher::new(&SecretCipher::generate_key()).unwrap();
        let token = cipher.encrypt("arkesel-key");
        assert_ne!(token, "arkesel-key");
        assert_eq!(cipher.decrypt(&token).unwrap(), "arkesel-key");

        let other = SecretCipher::new(&SecretCipher::generate_key()).unwrap();
        assert!(matches!(other.decrypt(&token), Err(NotifyError::Crypto(_))));
    }

    #[test]
    fn test_bad_key_rejected() {
        assert!(SecretCipher::new("not-a-key").is_err());
        let cipher = SecretCipher::new(&SecretCipher::generate_key()).unwrap();
        assert_eq!(cipher.encrypt_opt(Some("  ")), None);
    }
}
