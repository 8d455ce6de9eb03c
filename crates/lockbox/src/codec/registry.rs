//! [`CodecRegistry`]: lookup of codecs by logical name and by ciphertext column.

use std::{collections::HashMap, sync::Arc};

use common::{LockboxError, Result};

use super::{AttributeCodec, EncryptedAttribute};
use crate::context::Lockbox;

/// Immutable-after-build map of encrypted attributes for one table.
#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    by_name: HashMap<String, Arc<AttributeCodec>>,
    by_column: HashMap<String, String>,
}

impl CodecRegistry {
    /// Create a new, empty [`CodecRegistry`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `decl` under `lockbox`.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::Configuration`] if the name or ciphertext column
    /// is already taken, or if the name collides with a ciphertext column.
    pub fn register(&mut self, decl: EncryptedAttribute, lockbox: Lockbox) -> Result<()> {
        let name = decl.name().to_owned();
        let column = decl.ciphertext_column_name().to_owned();

        if name == column {
            return Err(LockboxError::Configuration(format!(
                "`{name}` cannot be its own ciphertext column"
            )));
        }
        if self.by_name.contains_key(&name) || self.by_column.contains_key(&name) {
            return Err(LockboxError::Configuration(format!(
                "`{name}` is already declared"
            )));
        }
        if self.by_column.contains_key(&column) || self.by_name.contains_key(&column) {
            return Err(LockboxError::Configuration(format!(
                "ciphertext column `{column}` is already in use"
            )));
        }

        self.by_column.insert(column, name.clone());
        self.by_name
            .insert(name, Arc::new(AttributeCodec::new(decl, lockbox)));
        Ok(())
    }

    /// Codec for a logical attribute name.
    pub fn get(&self, name: &str) -> Option<&AttributeCodec> {
        self.by_name.get(name).map(Arc::as_ref)
    }

    /// Codec owning a ciphertext column.
    pub fn by_ciphertext_column(&self, column: &str) -> Option<&AttributeCodec> {
        self.by_column.get(column).and_then(|name| self.get(name))
    }

    /// Returns `true` if `column` stores ciphertext for some attribute.
    pub fn is_ciphertext_column(&self, column: &str) -> bool {
        self.by_column.contains_key(column)
    }

    /// Iterate all codecs.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeCodec> {
        self.by_name.values().map(Arc::as_ref)
    }

    /// Iterate all ciphertext column names.
    pub fn ciphertext_columns(&self) -> impl Iterator<Item = &str> {
        self.by_column.keys().map(String::as_str)
    }

    /// Return the number of registered attributes.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Return `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::ProtectedMode;
    use crate::keys::KeyBytes;

    fn lockbox() -> Lockbox {
        Lockbox::with_master_key(KeyBytes::new(&[1u8; 32]).unwrap())
            .with_protected_mode(ProtectedMode::new())
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = CodecRegistry::new();
        registry
            .register(EncryptedAttribute::new("users", "email"), lockbox())
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("email").unwrap().ciphertext_column(), "email_ciphertext");
        assert_eq!(
            registry.by_ciphertext_column("email_ciphertext").unwrap().name(),
            "email"
        );
        assert!(registry.is_ciphertext_column("email_ciphertext"));
        assert!(!registry.is_ciphertext_column("email"));
        assert!(registry.get("name").is_none());
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut registry = CodecRegistry::new();
        registry
            .register(EncryptedAttribute::new("users", "email"), lockbox())
            .unwrap();
        let err = registry
            .register(
                EncryptedAttribute::new("users", "email").ciphertext_column("encrypted_email"),
                lockbox(),
            )
            .unwrap_err();
        assert_eq!(err.code(), "configuration");
    }

    #[test]
    fn shared_ciphertext_column_rejected() {
        let mut registry = CodecRegistry::new();
        registry
            .register(EncryptedAttribute::new("users", "email"), lockbox())
            .unwrap();
        assert!(registry
            .register(
                EncryptedAttribute::new("users", "phone").ciphertext_column("email_ciphertext"),
                lockbox(),
            )
            .is_err());
    }

    #[test]
    fn name_cannot_shadow_ciphertext_column() {
        let mut registry = CodecRegistry::new();
        registry
            .register(EncryptedAttribute::new("users", "email"), lockbox())
            .unwrap();
        assert!(registry
            .register(EncryptedAttribute::new("users", "email_ciphertext"), lockbox())
            .is_err());
        assert!(registry
            .register(
                EncryptedAttribute::new("users", "ssn").ciphertext_column("ssn"),
                lockbox(),
            )
            .is_err());
    }
}
