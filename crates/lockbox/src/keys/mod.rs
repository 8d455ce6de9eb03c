//! Key lookup by `(table, attribute)` coordinate.
//!
//! # Lifecycle
//!
//! 1. A [`KeyResolver`] is built once, either from a master key
//!    ([`MasterKeyResolver`]) or from explicit per-coordinate keys ([`KeyRing`]).
//! 2. Every encrypt/decrypt asks the resolver for the [`KeyMaterial`] of the
//!    attribute's coordinate.
//! 3. Rotation installs a new primary key; the old one stays available as a
//!    decrypt-only candidate.
//!
//! # Security invariants
//!
//! - Key bytes are **never** logged or included in `Debug` output.
//! - Only the primary key ever encrypts.

pub mod master;
pub mod store;

pub use master::MasterKeyResolver;
pub use store::{KeyBytes, KeyError, KeyRing};

use std::fmt;

use common::LockboxError;

/// Identifies the key used for one encrypted attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyCoordinate {
    /// Table name, e.g. `"users"`.
    pub table: String,
    /// Attribute (usually ciphertext column) name, e.g. `"email_ciphertext"`.
    pub attribute: String,
}

impl KeyCoordinate {
    /// Build a coordinate from a table and attribute name.
    pub fn new(table: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for KeyCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.attribute)
    }
}

/// The keys valid for one coordinate.
///
/// `primary` encrypts; decryption tries `primary` and then each entry of
/// `previous` in order (newest first).
#[derive(Clone, Debug)]
pub struct KeyMaterial {
    primary: KeyBytes,
    previous: Vec<KeyBytes>,
}

impl KeyMaterial {
    /// Key material with a single key.
    pub fn new(primary: KeyBytes) -> Self {
        Self {
            primary,
            previous: Vec::new(),
        }
    }

    /// Attach older decrypt-only keys, newest first.
    pub fn with_previous(mut self, previous: Vec<KeyBytes>) -> Self {
        self.previous = previous;
        self
    }

    /// The key used for encryption.
    pub fn primary(&self) -> &KeyBytes {
        &self.primary
    }

    /// Older keys still accepted for decryption, newest first.
    pub fn previous(&self) -> &[KeyBytes] {
        &self.previous
    }

    /// All decrypt candidates in priority order.
    pub fn candidates(&self) -> impl Iterator<Item = &KeyBytes> {
        std::iter::once(&self.primary).chain(self.previous.iter())
    }

    /// Return new material with `primary` installed and the current primary
    /// demoted to the newest previous key.
    pub fn rotated(&self, primary: KeyBytes) -> Self {
        let mut previous = Vec::with_capacity(self.previous.len() + 1);
        previous.push(self.primary.clone());
        previous.extend(self.previous.iter().cloned());
        Self { primary, previous }
    }
}

impl From<KeyBytes> for KeyMaterial {
    fn from(key: KeyBytes) -> Self {
        KeyMaterial::new(key)
    }
}

/// Maps a key coordinate to its active key material.
#[cfg_attr(test, mockall::automock)]
pub trait KeyResolver: Send + Sync {
    /// Look up the key material for `(table, attribute)`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotConfigured`] if no key exists for the coordinate.
    fn attribute_key(&self, table: &str, attribute: &str) -> Result<KeyMaterial, KeyError>;
}

impl From<KeyError> for LockboxError {
    fn from(err: KeyError) -> Self {
        LockboxError::Configuration(err.to_string())
    }
}
