use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::constants::{ENVELOPE_TAG, KDF_ITERATIONS, KDF_SALT, NONCE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

/// Symmetric envelope applied to message content before it reaches the
/// storage provider.
///
/// The key is derived once from a shared secret (PBKDF2-HMAC-SHA256, fixed
/// salt, 100 000 iterations). This protects content at rest against the
/// storage provider; it provides no forward secrecy and no protection
/// against anyone who holds the shared secret.
///
/// An [`Envelope`] holds no mutable state and is safe to share and call
/// concurrently.
#[derive(Clone)]
pub struct Envelope {
    key: SymmetricKey,
}

impl Envelope {
    /// Derive the envelope key from the configured shared secret.
    pub fn from_secret(secret: &str) -> Self {
        let mut key = [0u8; SYMMETRIC_KEY_SIZE];
        pbkdf2_hmac::<Sha256>(secret.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key);
        Self { key }
    }

    /// Build an envelope from an already-derived key.
    pub fn from_key(key: SymmetricKey) -> Self {
        Self { key }
    }

    /// Encrypt plaintext into a tagged, self-describing envelope string:
    /// the `pv1.` marker followed by base64 of `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = XChaCha20Poly1305::new((&self.key).into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut data = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        data.extend_from_slice(&nonce_bytes);
        data.extend_from_slice(&ciphertext);

        Ok(format!("{ENVELOPE_TAG}{}", BASE64.encode(data)))
    }

    /// Decrypt an envelope produced by [`Envelope::seal`].
    ///
    /// Total by policy: any input that does not decode as a valid envelope
    /// (missing tag, malformed base64, truncated data, failed AEAD
    /// authentication) is returned unchanged and treated as legacy
    /// plaintext. Stored history mixes encrypted and plaintext content and
    /// a read must never fail because of that.
    pub fn open(&self, content: &str) -> String {
        match self.try_open(content) {
            Some(plaintext) => plaintext,
            None => content.to_string(),
        }
    }

    fn try_open(&self, content: &str) -> Option<String> {
        let encoded = content.strip_prefix(ENVELOPE_TAG)?;
        let data = BASE64.decode(encoded).ok()?;
        if data.len() <= NONCE_SIZE {
            return None;
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
            .ok()?;

        String::from_utf8(plaintext).ok()
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("Envelope").finish_non_exhaustive()
    }
}
