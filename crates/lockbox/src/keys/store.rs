//! [`KeyBytes`] and [`KeyRing`]: key buffers and the explicit per-coordinate key store.

use std::{collections::HashMap, sync::Arc};

use aes_gcm_siv::aead::{rand_core::RngCore, OsRng};
use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::info;

use super::{KeyCoordinate, KeyMaterial, KeyResolver};
use crate::crypto::KEY_LEN;

/// Errors produced by the key layer.
#[derive(Debug, Error)]
pub enum KeyError {
    /// No key is configured for the coordinate.
    #[error("no key configured for {coordinate}")]
    NotConfigured {
        /// The coordinate that was looked up.
        coordinate: KeyCoordinate,
    },

    /// The key material has an unexpected length.
    #[error("key has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),

    /// The key string is not valid hex.
    #[error("key is not valid hex")]
    InvalidHex,

    /// Key derivation failed.
    #[error("key derivation failed")]
    Derivation,
}

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// When this type is dropped, the memory is overwritten with zeroes to
/// minimise the window during which key material lives in RAM.
#[derive(Clone)]
pub struct KeyBytes(Box<[u8; KEY_LEN]>);

impl KeyBytes {
    /// Copy `bytes` into a new key buffer.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidLength`] if the slice has the wrong length.
    pub fn new(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyError::InvalidLength(bytes.len()));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Parse a 64-character hex string.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidHex`] or [`KeyError::InvalidLength`].
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let mut decoded = hex::decode(s.trim()).map_err(|_| KeyError::InvalidHex)?;
        let key = Self::new(&decoded);
        decoded.iter_mut().for_each(|b| *b = 0);
        key
    }

    /// Generate a random key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut buf = Box::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut buf[..]);
        Self(buf)
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Drop for KeyBytes {
    fn drop(&mut self) {
        // Zero the key material on drop.
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("KeyBytes([REDACTED])")
    }
}

/// Explicit per-coordinate key store with rotation.
///
/// Internally backed by [`ArcSwap`] so lookups never block and rotation can
/// atomically swap in a new map.
#[derive(Clone, Debug, Default)]
pub struct KeyRing {
    inner: Arc<ArcSwap<HashMap<KeyCoordinate, KeyMaterial>>>,
}

impl KeyRing {
    /// Create a new, empty [`KeyRing`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the number of configured coordinates.
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    /// Return `true` if no coordinates are configured.
    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    /// Install (or replace) the key material for a coordinate.
    pub fn insert(&self, coordinate: KeyCoordinate, material: impl Into<KeyMaterial>) {
        let material = material.into();
        self.inner.rcu(|map| {
            let mut next = HashMap::clone(map);
            next.insert(coordinate.clone(), material.clone());
            next
        });
    }

    /// Make `key` the primary key for `coordinate`.
    ///
    /// The current primary is kept as the newest decrypt-only key. Rotating a
    /// coordinate with no key simply installs `key`.
    pub fn rotate(&self, coordinate: &KeyCoordinate, key: KeyBytes) {
        self.inner.rcu(|map| {
            let mut next = HashMap::clone(map);
            let material = match map.get(coordinate) {
                Some(current) => current.rotated(key.clone()),
                None => KeyMaterial::new(key.clone()),
            };
            next.insert(coordinate.clone(), material);
            next
        });
        info!(coordinate = %coordinate, "attribute key rotated");
    }

    /// Atomically replace every configured coordinate.
    pub fn replace_all(&self, keys: HashMap<KeyCoordinate, KeyMaterial>) {
        self.inner.store(Arc::new(keys));
    }
}

impl KeyResolver for KeyRing {
    fn attribute_key(&self, table: &str, attribute: &str) -> Result<KeyMaterial, KeyError> {
        let coordinate = KeyCoordinate::new(table, attribute);
        self.inner
            .load()
            .get(&coordinate)
            .cloned()
            .ok_or(KeyError::NotConfigured { coordinate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord() -> KeyCoordinate {
        KeyCoordinate::new("users", "email_ciphertext")
    }

    #[test]
    fn key_bytes_rejects_wrong_length() {
        assert!(matches!(KeyBytes::new(&[0u8; 16]), Err(KeyError::InvalidLength(16))));
    }

    #[test]
    fn key_bytes_from_hex() {
        let key = KeyBytes::from_hex(&"ab".repeat(KEY_LEN)).unwrap();
        assert!(key.as_bytes().iter().all(|b| *b == 0xab));
        assert!(matches!(KeyBytes::from_hex("zz"), Err(KeyError::InvalidHex)));
        assert!(matches!(
            KeyBytes::from_hex("abcd"),
            Err(KeyError::InvalidLength(2))
        ));
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(KeyBytes::generate().as_bytes(), KeyBytes::generate().as_bytes());
    }

    #[test]
    fn key_bytes_redacted_in_debug() {
        let key = KeyBytes::new(&[0xFF; KEY_LEN]).unwrap();
        assert!(format!("{key:?}").contains("REDACTED"));
    }

    #[test]
    fn initially_empty() {
        let ring = KeyRing::new();
        assert!(ring.is_empty());
        assert!(matches!(
            ring.attribute_key("users", "email_ciphertext"),
            Err(KeyError::NotConfigured { .. })
        ));
    }

    #[test]
    fn insert_and_resolve() {
        let ring = KeyRing::new();
        ring.insert(coord(), KeyBytes::new(&[0x42; KEY_LEN]).unwrap());
        assert_eq!(ring.len(), 1);
        let material = ring.attribute_key("users", "email_ciphertext").unwrap();
        assert_eq!(material.primary().as_bytes(), &[0x42; KEY_LEN]);
        assert!(ring.attribute_key("users", "phone_ciphertext").is_err());
    }

    #[test]
    fn rotation_keeps_old_key_for_decryption() {
        let ring = KeyRing::new();
        ring.insert(coord(), KeyBytes::new(&[0x01; KEY_LEN]).unwrap());
        ring.rotate(&coord(), KeyBytes::new(&[0x02; KEY_LEN]).unwrap());
        let material = ring.attribute_key("users", "email_ciphertext").unwrap();
        assert_eq!(material.primary().as_bytes(), &[0x02; KEY_LEN]);
        assert_eq!(material.previous().len(), 1);
        assert_eq!(material.previous()[0].as_bytes(), &[0x01; KEY_LEN]);
    }

    #[test]
    fn rotate_unknown_coordinate_installs_key() {
        let ring = KeyRing::new();
        ring.rotate(&coord(), KeyBytes::new(&[0x05; KEY_LEN]).unwrap());
        let material = ring.attribute_key("users", "email_ciphertext").unwrap();
        assert!(material.previous().is_empty());
    }

    #[test]
    fn replace_all_is_atomic() {
        let ring = KeyRing::new();
        ring.insert(coord(), KeyBytes::new(&[0x01; KEY_LEN]).unwrap());

        let mut next = HashMap::new();
        next.insert(
            KeyCoordinate::new("users", "phone_ciphertext"),
            KeyMaterial::new(KeyBytes::new(&[0x02; KEY_LEN]).unwrap()),
        );
        ring.replace_all(next);

        // Only the phone coordinate should be present after the replace.
        assert!(ring.attribute_key("users", "email_ciphertext").is_err());
        assert!(ring.attribute_key("users", "phone_ciphertext").is_ok());
    }
}
