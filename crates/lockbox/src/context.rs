//! [`Lockbox`]: the key resolver and protected-mode handle used by codecs.

use std::{fmt, sync::Arc};

use common::{LockboxError, Result};

use crate::config::Config;
use crate::crypto::CipherBox;
use crate::guard::ProtectedMode;
use crate::keys::{KeyBytes, KeyMaterial, KeyResolver, MasterKeyResolver};

/// Shared encryption context.
///
/// Cheap to clone. By default it follows the process-wide
/// [`ProtectedMode::global`] switch; [`Lockbox::with_protected_mode`] binds it
/// to another handle instead.
#[derive(Clone)]
pub struct Lockbox {
    resolver: Arc<dyn KeyResolver>,
    protected_mode: ProtectedMode,
    encode: bool,
}

impl Lockbox {
    /// Context over an arbitrary resolver.
    pub fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            resolver,
            protected_mode: ProtectedMode::global().clone(),
            encode: true,
        }
    }

    /// Context deriving attribute keys from a single master key.
    pub fn with_master_key(master: KeyBytes) -> Self {
        Self::new(Arc::new(MasterKeyResolver::new(master)))
    }

    /// Build a context from validated configuration.
    ///
    /// Applies `protected_mode` to the process-wide switch.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::Configuration`] if a key cannot be decoded.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let master = KeyBytes::from_hex(&cfg.master_key)?;
        let previous = cfg
            .previous_keys()
            .map(KeyBytes::from_hex)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let resolver = MasterKeyResolver::new(master).with_previous(previous);

        let lockbox = Self::new(Arc::new(resolver)).with_default_encode(cfg.encode);
        if cfg.protected_mode {
            lockbox.protected_mode.enable();
        }
        Ok(lockbox)
    }

    /// Bind this context to `mode` instead of the process-wide switch.
    pub fn with_protected_mode(mut self, mode: ProtectedMode) -> Self {
        self.protected_mode = mode;
        self
    }

    /// Default `encode` flag for attributes declared without one.
    pub fn with_default_encode(mut self, encode: bool) -> Self {
        self.encode = encode;
        self
    }

    /// The protected-mode handle this context consults.
    pub fn protected_mode(&self) -> &ProtectedMode {
        &self.protected_mode
    }

    /// Returns `true` while this context is protected.
    pub fn is_protected(&self) -> bool {
        self.protected_mode.is_enabled()
    }

    /// Default `encode` flag.
    pub fn default_encode(&self) -> bool {
        self.encode
    }

    /// Look up the key material for `(table, attribute)`.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::Configuration`] if no key is configured.
    pub fn attribute_key(&self, table: &str, attribute: &str) -> Result<KeyMaterial> {
        self.resolver
            .attribute_key(table, attribute)
            .map_err(LockboxError::from)
    }

    /// A [`CipherBox`] over `keys` that honours this context's protected mode.
    pub fn cipher_box(&self, keys: impl Into<KeyMaterial>, encode: bool) -> CipherBox {
        CipherBox::new(keys, encode).guarded_by(self.protected_mode.clone())
    }
}

impl fmt::Debug for Lockbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lockbox")
            .field("protected", &self.is_protected())
            .field("encode", &self.encode)
            .finish_non_exhaustive()
    }
}
