//! Symmetric encryption for provider credentials at rest.
//!
//! Layout of a sealed value: `base64(nonce(12) || ciphertext+tag)`, keyed with
//! `SHA-256(secret)` under AES-256-GCM.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("provider secret is empty")]
    EmptySecret,
    #[error("encrypt failed")]
    Encrypt,
    #[error("decrypt failed")]
    Decrypt,
    #[error("sealed value is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("sealed value is too short")]
    Truncated,
    #[error("decrypted value is not utf-8")]
    Utf8,
}

#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Like [`SecretCipher::new`] but rejects blank secrets.
    pub fn from_configured(secret: &str) -> Result<Self, SecretError> {
        if secret.trim().is_empty() {
            return Err(SecretError::EmptySecret);
        }
        Ok(Self::new(secret))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        let cipher = self.cipher()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| SecretError::Encrypt)?;
        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, SecretError> {
        let raw = STANDARD.decode(encoded.trim())?;
        if raw.len() <= NONCE_LEN {
            return Err(SecretError::Truncated);
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| SecretError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| SecretError::Utf8)
    }

    fn cipher(&self) -> Result<Aes256Gcm, SecretError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| SecretError::Encrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_value_opens_with_same_secret_only() {
        let cipher = SecretCipher::new("gateway-secret");
        let sealed = cipher.encrypt("sk-live-1234").unwrap();
        assert_ne!(sealed, "sk-live-1234");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "sk-live-1234");

        let other = SecretCipher::new("another-secret");
        assert!(matches!(other.decrypt(&sealed), Err(SecretError::Decrypt)));
    }

    #[test]
    fn nonce_is_fresh_per_seal() {
        let cipher = SecretCipher::new("gateway-secret");
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn short_payload_is_rejected() {
        let cipher = SecretCipher::new("gateway-secret");
        let short = STANDARD.encode([0u8; 8]);
        assert!(matches!(cipher.decrypt(&short), Err(SecretError::Truncated)));
        assert!(matches!(
            SecretCipher::from_configured("   "),
            Err(SecretError::EmptySecret)
        ));
    }
}
