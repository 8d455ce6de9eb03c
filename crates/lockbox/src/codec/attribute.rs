//! [`AttributeCodec`]: per-attribute encrypt/decrypt and protected-mode decisions.

use common::{LockboxError, Result, Value};
use tracing::warn;

use super::EncryptedAttribute;
use crate::context::Lockbox;
use crate::crypto::CipherBox;

/// A plaintext assignment not yet committed to the ciphertext column.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    was: Value,
    value: Value,
}

impl PendingWrite {
    /// The value the accessor returned before the first uncommitted assignment.
    pub fn was(&self) -> &Value {
        &self.was
    }

    /// The assigned plaintext.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Bridges one [`EncryptedAttribute`] to its ciphertext column.
#[derive(Debug, Clone)]
pub struct AttributeCodec {
    decl: EncryptedAttribute,
    lockbox: Lockbox,
    encode: bool,
}

impl AttributeCodec {
    /// Bind `decl` to a context. The declaration's encode flag wins over the
    /// context default.
    pub fn new(decl: EncryptedAttribute, lockbox: Lockbox) -> Self {
        let encode = decl
            .encode_override()
            .unwrap_or_else(|| lockbox.default_encode());
        Self {
            decl,
            lockbox,
            encode,
        }
    }

    /// Logical attribute name.
    pub fn name(&self) -> &str {
        self.decl.name()
    }

    /// Stored ciphertext column.
    pub fn ciphertext_column(&self) -> &str {
        self.decl.ciphertext_column_name()
    }

    /// The declaration this codec applies.
    pub fn declaration(&self) -> &EncryptedAttribute {
        &self.decl
    }

    /// Returns `true` while the context is protected.
    pub fn is_protected(&self) -> bool {
        self.lockbox.is_protected()
    }

    /// Value observed through the plaintext accessor.
    ///
    /// Protected: the stored ciphertext, verbatim, with no decrypt attempt.
    /// Otherwise the uncommitted assignment if there is one, else the
    /// decrypted ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::Decryption`] if the ciphertext does not
    /// authenticate under any candidate key.
    pub fn read_plaintext(&self, ciphertext: &Value, pending: Option<&PendingWrite>) -> Result<Value> {
        if self.is_protected() {
            return Ok(ciphertext.clone());
        }
        match pending {
            Some(p) => Ok(p.value.clone()),
            None => self.decrypt(ciphertext),
        }
    }

    /// Record an assignment through the plaintext accessor.
    ///
    /// Always accepted, whatever the protection state. Returns the pending
    /// write to track, or `None` when the assignment restores the value the
    /// accessor currently shows. If the stored ciphertext cannot be decrypted
    /// the assignment is always tracked, so it can replace the bad value.
    pub fn write_plaintext(
        &self,
        ciphertext: &Value,
        pending: Option<PendingWrite>,
        value: Value,
    ) -> Option<PendingWrite> {
        if self.is_protected() {
            // The accessor shows the ciphertext, so assigning it back is a no-op.
            if value == *ciphertext {
                return None;
            }
            let was = pending.map_or_else(|| ciphertext.clone(), |p| p.was);
            return if was == value {
                None
            } else {
                Some(PendingWrite { was, value })
            };
        }

        let was = match pending {
            Some(p) => p.was,
            None => match self.decrypt(ciphertext) {
                Ok(current) => current,
                Err(e) => {
                    warn!(attribute = %self.name(), error = %e, "previous value unreadable");
                    return Some(PendingWrite {
                        was: ciphertext.clone(),
                        value,
                    });
                }
            },
        };
        if was == value {
            None
        } else {
            Some(PendingWrite { was, value })
        }
    }

    /// Produce the ciphertext to commit for `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::ProtectedMode`] while protected, or an
    /// encryption / configuration error.
    pub fn before_persist(&self, pending: &PendingWrite) -> Result<Value> {
        if self.is_protected() {
            warn!(attribute = %self.name(), "encrypted write rejected in protected mode");
            return Err(LockboxError::ProtectedMode {
                attribute: self.name().to_owned(),
            });
        }
        self.encrypt(&pending.value)
    }

    /// Value returned for this attribute by a bulk projection.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::Decryption`] for invalid ciphertext when unprotected.
    pub fn project(&self, ciphertext: &Value) -> Result<Value> {
        if self.is_protected() {
            Ok(ciphertext.clone())
        } else {
            self.decrypt(ciphertext)
        }
    }

    /// Encrypt `plaintext` for a direct column write.
    ///
    /// Protected mode does not apply here.
    ///
    /// # Errors
    ///
    /// Returns an encryption, type, or configuration error.
    pub fn direct_write(&self, plaintext: &Value) -> Result<Value> {
        if self.is_protected() {
            warn!(
                attribute = %self.name(),
                column = %self.ciphertext_column(),
                "direct column write bypasses protected mode"
            );
        }
        self.encrypt(plaintext)
    }

    /// Encrypt a plaintext value into a ciphertext column value.
    ///
    /// `Null` stays `Null`.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::TypeMismatch`], [`LockboxError::Configuration`]
    /// or [`LockboxError::Encryption`].
    pub fn encrypt(&self, plaintext: &Value) -> Result<Value> {
        if plaintext.is_null() {
            return Ok(Value::Null);
        }
        let bytes = self.decl.value_type().serialize(self.name(), plaintext)?;
        let envelope = self
            .cipher_box()?
            .encrypt(&bytes)
            .map_err(|e| LockboxError::Encryption(format!("{}: {e}", self.name())))?;
        if self.encode {
            String::from_utf8(envelope)
                .map(Value::Text)
                .map_err(|_| LockboxError::Encryption(format!("{}: non-text envelope", self.name())))
        } else {
            Ok(Value::Binary(envelope))
        }
    }

    /// Decrypt a ciphertext column value, ignoring protection.
    ///
    /// `Null` stays `Null`.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::Decryption`] or [`LockboxError::Configuration`].
    pub fn decrypt(&self, ciphertext: &Value) -> Result<Value> {
        if ciphertext.is_null() {
            return Ok(Value::Null);
        }
        let bytes = ciphertext.as_bytes().ok_or_else(|| {
            LockboxError::Decryption(format!(
                "{} holds a {} value, not ciphertext",
                self.ciphertext_column(),
                ciphertext.type_name()
            ))
        })?;
        let plaintext = self
            .cipher_box()?
            .decrypt(bytes)
            .map_err(|e| LockboxError::Decryption(format!("{}: {e}", self.name())))?;
        self.decl.value_type().deserialize(self.name(), plaintext)
    }

    fn cipher_box(&self) -> Result<CipherBox> {
        let coordinate = self.decl.key_coordinate();
        let keys = self
            .lockbox
            .attribute_key(&coordinate.table, &coordinate.attribute)?;
        Ok(CipherBox::new(keys, self.encode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AttributeType;
    use crate::guard::ProtectedMode;
    use crate::keys::{KeyBytes, KeyCoordinate, KeyRing, MockKeyResolver};
    use std::sync::Arc;

    fn codec_with(decl: EncryptedAttribute) -> (AttributeCodec, ProtectedMode) {
        let mode = ProtectedMode::new();
        let lockbox = Lockbox::with_master_key(KeyBytes::new(&[0x11; 32]).unwrap())
            .with_protected_mode(mode.clone());
        (AttributeCodec::new(decl, lockbox), mode)
    }

    fn email_codec() -> (AttributeCodec, ProtectedMode) {
        codec_with(EncryptedAttribute::new("users", "email"))
    }

    #[test]
    fn encrypt_then_read_plaintext() {
        let (codec, _mode) = email_codec();
        let ciphertext = codec.encrypt(&Value::from("test@example.org")).unwrap();
        assert!(ciphertext.as_str().unwrap().starts_with("v1."));
        assert_eq!(
            codec.read_plaintext(&ciphertext, None).unwrap(),
            Value::from("test@example.org")
        );
    }

    #[test]
    fn null_is_not_encrypted() {
        let (codec, _mode) = email_codec();
        assert_eq!(codec.encrypt(&Value::Null).unwrap(), Value::Null);
        assert_eq!(codec.read_plaintext(&Value::Null, None).unwrap(), Value::Null);
    }

    #[test]
    fn raw_envelopes_are_binary() {
        let (codec, _mode) = codec_with(
            EncryptedAttribute::new("users", "ssn").encode(false),
        );
        let ciphertext = codec.encrypt(&Value::from("123-45-6789")).unwrap();
        assert!(matches!(ciphertext, Value::Binary(_)));
        assert_eq!(codec.decrypt(&ciphertext).unwrap(), Value::from("123-45-6789"));
    }

    #[test]
    fn typed_attribute_round_trip() {
        let (codec, _mode) = codec_with(
            EncryptedAttribute::new("users", "age").attr_type(AttributeType::Integer),
        );
        let ciphertext = codec.encrypt(&Value::Integer(42)).unwrap();
        assert_eq!(codec.decrypt(&ciphertext).unwrap(), Value::Integer(42));
    }

    #[test]
    fn protected_read_returns_ciphertext_verbatim() {
        let (codec, mode) = email_codec();
        let ciphertext = codec.encrypt(&Value::from("test@example.org")).unwrap();
        mode.enable();
        assert_eq!(codec.read_plaintext(&ciphertext, None).unwrap(), ciphertext);
        // No decrypt is attempted, so invalid ciphertext is not an error.
        let junk = Value::from("junk");
        assert_eq!(codec.read_plaintext(&junk, None).unwrap(), junk);
    }

    #[test]
    fn tampered_ciphertext_is_decryption_error() {
        let (codec, _mode) = email_codec();
        let ciphertext = codec.encrypt(&Value::from("x")).unwrap();
        let mut text = ciphertext.as_str().unwrap().to_owned();
        let last = text.pop().unwrap();
        text.push(if last == 'A' { 'B' } else { 'A' });
        let err = codec.decrypt(&Value::Text(text)).unwrap_err();
        assert_eq!(err.code(), "decryption");
    }

    #[test]
    fn non_ciphertext_value_is_decryption_error() {
        let (codec, _mode) = email_codec();
        let err = codec.decrypt(&Value::Integer(5)).unwrap_err();
        assert_eq!(err.code(), "decryption");
    }

    #[test]
    fn unchanged_plaintext_is_not_pending() {
        let (codec, _mode) = email_codec();
        let ciphertext = codec.encrypt(&Value::from("a@b.c")).unwrap();
        assert_eq!(
            codec.write_plaintext(&ciphertext, None, Value::from("a@b.c")),
            None
        );
        let pending = codec
            .write_plaintext(&ciphertext, None, Value::from("new@b.c"))
            .unwrap();
        assert_eq!(pending.was(), &Value::from("a@b.c"));
        // Reverting to the original clears the pending write.
        assert_eq!(
            codec.write_plaintext(&ciphertext, Some(pending), Value::from("a@b.c")),
            None
        );
    }

    #[test]
    fn protected_write_is_pending_but_cannot_persist() {
        let (codec, mode) = email_codec();
        let ciphertext = codec.encrypt(&Value::from("a@b.c")).unwrap();
        mode.enable();
        let pending = codec
            .write_plaintext(&ciphertext, None, Value::from("new@b.c"))
            .unwrap();
        assert_eq!(pending.was(), &ciphertext);
        assert_eq!(pending.value(), &Value::from("new@b.c"));
        let err = codec.before_persist(&pending).unwrap_err();
        assert!(err.is_protected_mode_violation());

        mode.disable();
        let committed = codec.before_persist(&pending).unwrap();
        assert_eq!(codec.decrypt(&committed).unwrap(), Value::from("new@b.c"));
    }

    #[test]
    fn protected_reassignment_of_shown_value_is_not_pending() {
        let (codec, mode) = email_codec();
        let ciphertext = codec.encrypt(&Value::from("a@b.c")).unwrap();
        mode.enable();
        let shown = codec.read_plaintext(&ciphertext, None).unwrap();
        assert_eq!(codec.write_plaintext(&ciphertext, None, shown), None);
        assert_eq!(codec.write_plaintext(&Value::Null, None, Value::Null), None);
    }

    #[test]
    fn protected_revert_clears_pending() {
        let (codec, mode) = email_codec();
        let ciphertext = codec.encrypt(&Value::from("a@b.c")).unwrap();
        mode.enable();
        let pending = codec
            .write_plaintext(&ciphertext, None, Value::from("new@b.c"))
            .unwrap();
        assert_eq!(
            codec.write_plaintext(&ciphertext, Some(pending), ciphertext.clone()),
            None
        );
    }

    #[test]
    fn unreadable_ciphertext_always_tracks_the_write() {
        let (codec, _mode) = email_codec();
        let corrupt = Value::from("v1.garbage.garbage");
        let pending = codec
            .write_plaintext(&corrupt, None, Value::Null)
            .unwrap();
        assert_eq!(pending.was(), &corrupt);
        assert_eq!(pending.value(), &Value::Null);
        assert_eq!(codec.before_persist(&pending).unwrap(), Value::Null);
    }

    #[test]
    fn projection_follows_protection() {
        let (codec, mode) = email_codec();
        let ciphertext = codec.encrypt(&Value::from("a@b.c")).unwrap();
        assert_eq!(codec.project(&ciphertext).unwrap(), Value::from("a@b.c"));
        mode.enable();
        assert_eq!(codec.project(&ciphertext).unwrap(), ciphertext);
    }

    #[test]
    fn direct_write_ignores_protection() {
        let (codec, mode) = email_codec();
        mode.enable();
        let ciphertext = codec.direct_write(&Value::from("ops@b.c")).unwrap();
        mode.disable();
        assert_eq!(codec.decrypt(&ciphertext).unwrap(), Value::from("ops@b.c"));
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let lockbox = Lockbox::new(Arc::new(KeyRing::new())).with_protected_mode(ProtectedMode::new());
        let codec = AttributeCodec::new(EncryptedAttribute::new("users", "email"), lockbox);
        let err = codec.encrypt(&Value::from("x")).unwrap_err();
        assert_eq!(err.code(), "configuration");
    }

    #[test]
    fn key_lookup_uses_declared_coordinate() {
        let ring = KeyRing::new();
        ring.insert(
            KeyCoordinate::new("users", "encrypted_email"),
            KeyBytes::new(&[0x22; 32]).unwrap(),
        );
        let lockbox = Lockbox::new(Arc::new(ring)).with_protected_mode(ProtectedMode::new());
        let codec = AttributeCodec::new(
            EncryptedAttribute::new("users", "email").key_attribute("encrypted_email"),
            lockbox,
        );
        assert!(codec.encrypt(&Value::from("x")).is_ok());
    }

    #[test]
    fn protected_read_skips_key_lookup() {
        let mut resolver = MockKeyResolver::new();
        resolver.expect_attribute_key().never();
        let mode = ProtectedMode::new();
        mode.enable();
        let lockbox = Lockbox::new(Arc::new(resolver)).with_protected_mode(mode);
        let codec = AttributeCodec::new(EncryptedAttribute::new("users", "email"), lockbox);
        let stored = Value::from("v1.AAAA.BBBB");
        assert_eq!(codec.read_plaintext(&stored, None).unwrap(), stored);
        assert_eq!(codec.project(&stored).unwrap(), stored);
    }
}
