//! [`CipherBox`]: the encrypt/decrypt primitive bound to one set of keys.

use tracing::debug;

use super::cipher::{decrypt_field, encrypt_field, CipherError, EncryptedField};
use crate::guard::ProtectedMode;
use crate::keys::KeyMaterial;

/// Symmetric box over a [`KeyMaterial`].
///
/// With `encode` the envelope is printable text suitable for text columns;
/// without it the envelope is raw bytes.
///
/// A box built with [`CipherBox::guarded_by`] honours protected mode: while
/// protected, [`CipherBox::decrypt`] returns its input unchanged.
#[derive(Clone, Debug)]
pub struct CipherBox {
    keys: KeyMaterial,
    encode: bool,
    guard: Option<ProtectedMode>,
}

impl CipherBox {
    /// Build an unguarded box.
    pub fn new(keys: impl Into<KeyMaterial>, encode: bool) -> Self {
        Self {
            keys: keys.into(),
            encode,
            guard: None,
        }
    }

    /// Make this box honour `guard`.
    pub fn guarded_by(mut self, guard: ProtectedMode) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Whether envelopes are text-encoded.
    pub fn encode(&self) -> bool {
        self.encode
    }

    /// Encrypt `plaintext` with the primary key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::AeadFailure`] on an internal AEAD error.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let field = encrypt_field(plaintext, self.keys.primary().as_bytes())?;
        if self.encode {
            Ok(field.to_string_repr().into_bytes())
        } else {
            Ok(field.to_bytes())
        }
    }

    /// Decrypt an envelope, trying each candidate key in order.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidFormat`] for a malformed envelope and
    /// [`CipherError::AeadFailure`] once every candidate key has failed.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if self.guard.as_ref().is_some_and(ProtectedMode::is_enabled) {
            return Ok(ciphertext.to_vec());
        }

        let field = self.parse(ciphertext)?;
        for (index, key) in self.keys.candidates().enumerate() {
            match decrypt_field(&field, key.as_bytes()) {
                Ok(plaintext) => {
                    if index > 0 {
                        debug!(candidate = index, "decrypted with a previous key");
                    }
                    return Ok(plaintext);
                }
                Err(CipherError::AeadFailure) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(CipherError::AeadFailure)
    }

    fn parse(&self, ciphertext: &[u8]) -> Result<EncryptedField, CipherError> {
        if self.encode {
            let text = std::str::from_utf8(ciphertext).map_err(|_| CipherError::InvalidFormat)?;
            text.parse()
        } else {
            EncryptedField::from_bytes(ciphertext)
        }
    }
}
