//! AES-256-GCM-SIV encryption and decryption of individual attribute values.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-resistant,
//! so an accidental nonce repeat leaks equality of plaintexts but never the key
//! stream or the authentication key.
//!
//! **Do NOT substitute plain AES-256-GCM with a fixed nonce.** GCM nonce reuse
//! is catastrophic: it breaks both confidentiality and authentication.

use std::str::FromStr;

use aes_gcm_siv::{
    aead::{Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use common::LockboxError;
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Prefix that appears at the start of every encoded envelope.
pub const VERSION_PREFIX: &str = "v1";

/// A parsed, encrypted attribute value.
///
/// Encoded form: `v1.<base64url(nonce)>.<base64url(ciphertext+tag)>`.
/// Raw form: `nonce || ciphertext+tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    /// Raw nonce bytes.
    pub nonce: [u8; NONCE_LEN],
    /// Raw ciphertext + authentication tag bytes.
    pub ciphertext: Vec<u8>,
}

impl EncryptedField {
    /// Encode this value to its canonical text representation.
    pub fn to_string_repr(&self) -> String {
        format!(
            "{}.{}.{}",
            VERSION_PREFIX,
            URL_SAFE_NO_PAD.encode(self.nonce),
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
        )
    }

    /// Serialise to the raw binary envelope.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse a raw binary envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidFormat`] if `bytes` is too short to hold a
    /// nonce and an authentication tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::InvalidFormat);
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

impl FromStr for EncryptedField {
    type Err = CipherError;

    /// Parse an encoded envelope back into an [`EncryptedField`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(3, '.').collect();
        if parts.len() != 3 || parts[0] != VERSION_PREFIX {
            return Err(CipherError::InvalidFormat);
        }
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| CipherError::InvalidFormat)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CipherError::InvalidFormat);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&nonce_bytes);

        let ciphertext = URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|_| CipherError::InvalidFormat)?;
        if ciphertext.len() < TAG_LEN {
            return Err(CipherError::InvalidFormat);
        }

        Ok(Self { nonce, ciphertext })
    }
}

/// Errors produced by the cipher layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// AES-GCM-SIV encryption or decryption failed.
    #[error("aead operation failed")]
    AeadFailure,

    /// The envelope does not match the expected format.
    #[error("invalid ciphertext envelope")]
    InvalidFormat,
}

impl From<CipherError> for LockboxError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::InvalidKeyLength => LockboxError::Configuration(err.to_string()),
            CipherError::AeadFailure | CipherError::InvalidFormat => {
                LockboxError::Decryption(err.to_string())
            }
        }
    }
}

/// Encrypt plaintext bytes using AES-256-GCM-SIV.
///
/// A random 96-bit nonce is generated per call via the OS CSPRNG, so two
/// encryptions of the same plaintext produce different envelopes.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
/// Returns [`CipherError::AeadFailure`] on an internal AEAD error.
pub fn encrypt_field(plaintext: &[u8], key: &[u8]) -> Result<EncryptedField, CipherError> {
    let cipher = build_cipher(key)?;

    use aes_gcm_siv::aead::rand_core::RngCore;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CipherError::AeadFailure)?;

    Ok(EncryptedField {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt an [`EncryptedField`] back to plaintext bytes.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
/// Returns [`CipherError::AeadFailure`] if authentication fails (wrong key or tampered data).
pub fn decrypt_field(field: &EncryptedField, key: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = build_cipher(key)?;
    let nonce = Nonce::from_slice(&field.nonce);
    cipher
        .decrypt(nonce, field.ciphertext.as_ref())
        .map_err(|_| CipherError::AeadFailure)
}

fn build_cipher(key: &[u8]) -> Result<Aes256GcmSiv, CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength);
    }
    Aes256GcmSiv::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_key() -> Vec<u8> {
        use aes_gcm_siv::aead::rand_core::RngCore;
        let mut key = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = random_key();
        let plaintext = b"test@example.org";
        let encrypted = encrypt_field(plaintext, &key).unwrap();
        let decrypted = decrypt_field(&encrypted, &key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn encryption_uses_fresh_nonce() {
        let key = random_key();
        let a = encrypt_field(b"same", &key).unwrap();
        let b = encrypt_field(b"same", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let key1 = random_key();
        let key2 = random_key();
        let encrypted = encrypt_field(b"secret", &key1).unwrap();
        assert_eq!(
            decrypt_field(&encrypted, &key2),
            Err(CipherError::AeadFailure)
        );
    }

    #[test]
    fn invalid_key_length_rejected() {
        let short_key = vec![0u8; 16];
        assert_eq!(
            encrypt_field(b"x", &short_key),
            Err(CipherError::InvalidKeyLength)
        );
    }

    #[test]
    fn string_repr_round_trip() {
        let key = random_key();
        let field = encrypt_field(b"hello", &key).unwrap();
        let s = field.to_string_repr();
        assert!(s.starts_with("v1."));
        let parsed: EncryptedField = s.parse().unwrap();
        assert_eq!(parsed, field);
    }

    #[test]
    fn bytes_round_trip() {
        let key = random_key();
        let field = encrypt_field(b"hello", &key).unwrap();
        let parsed = EncryptedField::from_bytes(&field.to_bytes()).unwrap();
        assert_eq!(decrypt_field(&parsed, &key).unwrap(), b"hello");
    }

    #[test]
    fn from_bytes_rejects_short_input() {
        assert_eq!(
            EncryptedField::from_bytes(&[0u8; NONCE_LEN + TAG_LEN - 1]),
            Err(CipherError::InvalidFormat)
        );
    }

    #[test]
    fn from_str_rejects_bad_prefix() {
        assert!("v2.abc.def".parse::<EncryptedField>().is_err());
    }

    #[test]
    fn from_str_rejects_too_few_parts() {
        assert!("v1.abc".parse::<EncryptedField>().is_err());
    }

    #[test]
    fn from_str_rejects_bad_base64() {
        assert!("v1.!!!.abc".parse::<EncryptedField>().is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let key = random_key();
        let mut field = encrypt_field(b"tamper me", &key).unwrap();
        // Flip a byte in the ciphertext to simulate tampering.
        field.ciphertext[0] ^= 0xFF;
        assert!(decrypt_field(&field, &key).is_err());
    }

    #[test]
    fn cipher_errors_map_to_lockbox_errors() {
        assert_eq!(LockboxError::from(CipherError::AeadFailure).code(), "decryption");
        assert_eq!(LockboxError::from(CipherError::InvalidFormat).code(), "decryption");
        assert_eq!(
            LockboxError::from(CipherError::InvalidKeyLength).code(),
            "configuration"
        );
    }
}
