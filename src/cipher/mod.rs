//! Symmetric payload protection for peer exchanges.
//!
//! Every payload crossing the internal network surface is sealed with
//! AES-256-GCM. The key is derived once at startup as the SHA-256 digest of
//! a locally persisted secret; the outbound client and the inbound handler
//! share one cipher instance for the process lifetime.

use std::fs;
use std::path::Path;

use aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, KeyInit, Nonce};
use sha2::{Digest, Sha256};
use tracing::info;

/// Nonce length prefixed to every sealed frame.
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length; the minimum ciphertext overhead.
const TAG_LEN: usize = 16;

/// Errors from cipher construction and payload transforms.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("cipher key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cipher key file {path} is empty")]
    EmptyKey { path: String },

    #[error("payload sealing failed")]
    Seal,

    #[error("payload too short to carry a sealed frame")]
    Truncated,

    #[error("payload failed authentication")]
    Unseal,
}

/// Symmetric transform applied to every internal-surface payload.
pub trait Cipher: Send + Sync {
    /// Seal a plaintext payload into a self-contained frame.
    fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Open a sealed frame produced by [`Cipher::encrypt`] under the same key.
    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// AES-256-GCM cipher keyed by the SHA-256 digest of a shared secret.
///
/// Frame layout: 12-byte random nonce followed by ciphertext + tag. A fresh
/// nonce is drawn per message, so sealing the same plaintext twice yields
/// different frames.
pub struct AesGcmCipher {
    aead: Aes256Gcm,
    fingerprint: String,
}

impl AesGcmCipher {
    /// Load the shared secret from `path` and derive the cipher key.
    pub fn from_key_file(path: impl AsRef<Path>) -> Result<Self, CipherError> {
        let path = path.as_ref();
        let secret = fs::read(path).map_err(|source| CipherError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;

        let trimmed = trim_ascii_whitespace(&secret);
        if trimmed.is_empty() {
            return Err(CipherError::EmptyKey {
                path: path.display().to_string(),
            });
        }

        let cipher = Self::from_secret(trimmed);
        info!(
            key_file = %path.display(),
            fingerprint = %cipher.fingerprint,
            "cipher key loaded"
        );
        Ok(cipher)
    }

    /// Derive the cipher key directly from raw secret bytes.
    pub fn from_secret(secret: &[u8]) -> Self {
        let key = Sha256::digest(secret);
        Self {
            aead: Aes256Gcm::new(&key),
            fingerprint: hex::encode(&key[..4]),
        }
    }

    /// Short key fingerprint for correlating configuration across devices
    /// in logs. Not a secret, not usable to recover the key.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .aead
            .encrypt(&nonce, plain)
            .map_err(|_| CipherError::Seal)?;

        let mut frame = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        frame.extend_from_slice(&nonce);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Truncated);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Unseal)
    }
}

/// Trim leading/trailing ASCII whitespace so keys written with a trailing
/// newline derive the same cipher as keys written without one.
fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cipher = AesGcmCipher::from_secret(b"shared-secret");
        let payloads: [&[u8]; 4] = [b"", b"x", b"hello peers", &[0u8; 4096]];

        for payload in payloads {
            let sealed = cipher.encrypt(payload).unwrap();
            assert_eq!(cipher.decrypt(&sealed).unwrap(), payload);
        }
    }

    #[test]
    fn test_fresh_nonce_per_message() {
        let cipher = AesGcmCipher::from_secret(b"shared-secret");
        let a = cipher.encrypt(b"payload").unwrap();
        let b = cipher.encrypt(b"payload").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_frame_rejected() {
        let cipher = AesGcmCipher::from_secret(b"shared-secret");
        let mut sealed = cipher.encrypt(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(cipher.decrypt(&sealed), Err(CipherError::Unseal)));
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let cipher = AesGcmCipher::from_secret(b"shared-secret");
        assert!(matches!(
            cipher.decrypt(&[0u8; NONCE_LEN]),
            Err(CipherError::Truncated)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let sealed = AesGcmCipher::from_secret(b"key-a").encrypt(b"payload").unwrap();
        let other = AesGcmCipher::from_secret(b"key-b");
        assert!(matches!(other.decrypt(&sealed), Err(CipherError::Unseal)));
    }

    #[test]
    fn test_key_file_whitespace_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let bare = dir.path().join("bare.key");
        let newline = dir.path().join("newline.key");
        std::fs::write(&bare, "secret").unwrap();
        std::fs::write(&newline, "secret\n").unwrap();

        let a = AesGcmCipher::from_key_file(&bare).unwrap();
        let b = AesGcmCipher::from_key_file(&newline).unwrap();

        let sealed = a.encrypt(b"payload").unwrap();
        assert_eq!(b.decrypt(&sealed).unwrap(), b"payload");
    }

    #[test]
    fn test_empty_key_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.key");
        std::fs::write(&path, "\n").unwrap();
        assert!(matches!(
            AesGcmCipher::from_key_file(&path),
            Err(CipherError::EmptyKey { .. })
        ));
    }

    #[test]
    fn test_missing_key_file_rejected() {
        let result = AesGcmCipher::from_key_file("/nonexistent/edged/cipher.key");
        assert!(matches!(result, Err(CipherError::KeyFile { .. })));
    }
}
