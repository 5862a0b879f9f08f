//! Password-based authenticated encryption for exported connection codes.
//!
//! Provides:
//! - PBKDF2-HMAC-SHA256 key derivation (100 000 rounds, 256-bit output)
//! - AES-256-GCM sealing with a fresh salt and nonce per call
//! - Base64 envelope encoding
//!
//! **Envelope layout:**
//!
//! ```text
//! base64( salt (16 B) || nonce (12 B) || ciphertext || tag (16 B) )
//! ```
//!
//! Only the manually exchanged descriptor text is protected here. Traffic on
//! the established channel relies on the transport's own DTLS keys.

use crate::core::config::PBKDF2_ITERATIONS;
use crate::core::error::SessionError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::Sha256;
use tracing::debug;

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

/// Bytes preceding the ciphertext in a decoded envelope.
pub const HEADER_LEN: usize = SALT_LEN + NONCE_LEN;

// ── Key derivation ───────────────────────────────────────────────────────────

/// Derive a 256-bit AES key from `password` and `salt`.
///
/// Deterministic for a given `(password, salt)` pair.
pub fn derive_key(password: &str, salt: &[u8; SALT_LEN]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Decoded form of an encrypted code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the GCM tag appended.
    pub sealed: Vec<u8>,
}

impl Envelope {
    pub fn to_base64(&self) -> String {
        let mut raw = Vec::with_capacity(HEADER_LEN + self.sealed.len());
        raw.extend_from_slice(&self.salt);
        raw.extend_from_slice(&self.nonce);
        raw.extend_from_slice(&self.sealed);
        STANDARD.encode(raw)
    }

    /// Parse base64 text into its parts.
    ///
    /// Whitespace anywhere in the input is ignored. Anything that is not
    /// valid base64 or is too short to hold a header and a tag is reported
    /// as [`SessionError::AuthenticationFailure`], the same as a bad tag.
    pub fn from_base64(text: &str) -> Result<Self, SessionError> {
        let compact: String = text.split_whitespace().collect();
        let raw = STANDARD.decode(compact).map_err(|e| {
            debug!(event = "envelope_base64_invalid", %e);
            SessionError::AuthenticationFailure
        })?;

        if raw.len() < HEADER_LEN + TAG_LEN {
            debug!(event = "envelope_too_short", bytes = raw.len());
            return Err(SessionError::AuthenticationFailure);
        }

        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        salt.copy_from_slice(&raw[..SALT_LEN]);
        nonce.copy_from_slice(&raw[SALT_LEN..HEADER_LEN]);

        Ok(Self {
            salt,
            nonce,
            sealed: raw[HEADER_LEN..].to_vec(),
        })
    }
}

// ── Encrypt / Decrypt ────────────────────────────────────────────────────────

/// Encrypt `plaintext` under `password` and return the base64 envelope.
pub fn encrypt(plaintext: &str, password: &str) -> Result<String, SessionError> {
    let salt: [u8; SALT_LEN] = rand::random();
    let nonce_bytes: [u8; NONCE_LEN] = rand::random();
    let key = derive_key(password, &salt);

    let cipher = Aes256Gcm::new(&key.into());
    #[allow(deprecated)]
    let nonce = Nonce::from_slice(&nonce_bytes);
    let sealed = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| SessionError::Task(format!("encryption failed: {e}")))?;

    Ok(Envelope {
        salt,
        nonce: nonce_bytes,
        sealed,
    }
    .to_base64())
}

/// Decrypt a base64 envelope produced by [`encrypt`].
///
/// Never returns partial output: either the tag verifies and the whole
/// plaintext comes back, or the call fails.
pub fn decrypt(envelope: &str, password: &str) -> Result<String, SessionError> {
    let envelope = Envelope::from_base64(envelope)?;
    let key = derive_key(password, &envelope.salt);

    let cipher = Aes256Gcm::new(&key.into());
    #[allow(deprecated)]
    let nonce = Nonce::from_slice(&envelope.nonce);
    let plaintext = cipher
        .decrypt(nonce, envelope.sealed.as_slice())
        .map_err(|_| SessionError::AuthenticationFailure)?;

    String::from_utf8(plaintext)
        .map_err(|_| SessionError::InvalidCode("decrypted code is not UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = r#"{"type":"offer","sdp":"v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n"}"#;

    #[test]
    fn test_roundtrip() {
        let sealed = encrypt(OFFER, "xk92").unwrap();
        assert_eq!(decrypt(&sealed, "xk92").unwrap(), OFFER);
    }

    #[test]
    fn test_roundtrip_empty_and_unicode() {
        for text in ["", "привіт 👋", "a"] {
            let sealed = encrypt(text, "pw").unwrap();
            assert_eq!(decrypt(&sealed, "pw").unwrap(), text);
        }
    }

    #[test]
    fn test_wrong_password_fails() {
        let sealed = encrypt(OFFER, "correct").unwrap();
        assert!(matches!(
            decrypt(&sealed, "wrong"),
            Err(SessionError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_flipped_byte_is_rejected() {
        let sealed = encrypt("short secret", "pw").unwrap();
        let raw = STANDARD.decode(&sealed).unwrap();
        let n = raw.len();
        // One position in and at the edges of each region: salt, nonce, ciphertext, tag.
        let positions = [
            0,
            SALT_LEN - 1,
            SALT_LEN,
            HEADER_LEN - 1,
            HEADER_LEN,
            n - TAG_LEN - 1,
            n - TAG_LEN,
            n - 1,
        ];
        for i in positions {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let result = decrypt(&STANDARD.encode(&tampered), "pw");
            assert!(
                matches!(result, Err(SessionError::AuthenticationFailure)),
                "flip at byte {i} was accepted"
            );
        }
    }

    #[test]
    fn test_fresh_salt_and_nonce_per_call() {
        let a = encrypt(OFFER, "pw").unwrap();
        let b = encrypt(OFFER, "pw").unwrap();
        assert_ne!(a, b);

        let ea = Envelope::from_base64(&a).unwrap();
        let eb = Envelope::from_base64(&b).unwrap();
        assert_ne!(ea.salt, eb.salt);
        assert_ne!(ea.nonce, eb.nonce);
    }

    #[test]
    fn test_envelope_layout() {
        let sealed = encrypt("abc", "pw").unwrap();
        let raw = STANDARD.decode(&sealed).unwrap();
        assert_eq!(raw.len(), HEADER_LEN + 3 + TAG_LEN);
    }

    #[test]
    fn test_garbage_and_short_input() {
        let header_only = STANDARD.encode([0u8; HEADER_LEN]);
        for input in ["", "not base64 !!", "AAAA", header_only.as_str()] {
            assert!(matches!(
                decrypt(input, "pw"),
                Err(SessionError::AuthenticationFailure)
            ));
        }
    }

    #[test]
    fn test_wrapped_code_is_accepted() {
        let sealed = encrypt(OFFER, "pw").unwrap();
        let (head, tail) = sealed.split_at(sealed.len() / 2);
        let wrapped = format!("  {head}\n{tail}\r\n");
        assert_eq!(decrypt(&wrapped, "pw").unwrap(), OFFER);
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = [7u8; SALT_LEN];
        assert_eq!(derive_key("pw", &salt), derive_key("pw", &salt));
        assert_ne!(derive_key("pw", &salt), derive_key("pw", &[8u8; SALT_LEN]));
        assert_ne!(derive_key("pw", &salt), derive_key("pW", &salt));
    }
}
