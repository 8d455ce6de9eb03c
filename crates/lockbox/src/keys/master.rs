//! Per-attribute key derivation from a master key.
//!
//! Keys are derived with HKDF-SHA256 (RFC 5869): the table name is the salt,
//! `attribute_key:<attribute>` is the info string, and the output is one
//! 32-byte block. Distinct coordinates therefore never share a key even
//! though a single master key is configured.

use hkdf::Hkdf;
use sha2::Sha256;

use super::{KeyBytes, KeyCoordinate, KeyError, KeyMaterial, KeyResolver};
use crate::crypto::KEY_LEN;

const INFO_PREFIX: &[u8] = b"attribute_key:";

/// Derives attribute keys from a master key (and older master keys for rotation).
#[derive(Clone, Debug)]
pub struct MasterKeyResolver {
    master: KeyBytes,
    previous: Vec<KeyBytes>,
}

impl MasterKeyResolver {
    /// Resolver with a single master key.
    pub fn new(master: KeyBytes) -> Self {
        Self {
            master,
            previous: Vec::new(),
        }
    }

    /// Attach retired master keys, newest first. Keys derived from them are
    /// offered as decrypt-only candidates.
    pub fn with_previous(mut self, previous: Vec<KeyBytes>) -> Self {
        self.previous = previous;
        self
    }
}

impl KeyResolver for MasterKeyResolver {
    fn attribute_key(&self, table: &str, attribute: &str) -> Result<KeyMaterial, KeyError> {
        if table.is_empty() || attribute.is_empty() {
            return Err(KeyError::NotConfigured {
                coordinate: KeyCoordinate::new(table, attribute),
            });
        }
        let primary = derive_key(&self.master, table, attribute)?;
        let previous = self
            .previous
            .iter()
            .map(|master| derive_key(master, table, attribute))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KeyMaterial::new(primary).with_previous(previous))
    }
}

/// HKDF-SHA256 with the table as salt and `attribute_key:<attribute>` as info.
fn derive_key(master: &KeyBytes, table: &str, attribute: &str) -> Result<KeyBytes, KeyError> {
    let hkdf = Hkdf::<Sha256>::new(Some(table.as_bytes()), master.as_bytes());

    let mut info = Vec::with_capacity(INFO_PREFIX.len() + attribute.len());
    info.extend_from_slice(INFO_PREFIX);
    info.extend_from_slice(attribute.as_bytes());

    let mut okm = [0u8; KEY_LEN];
    hkdf.expand(&info, &mut okm)
        .map_err(|_| KeyError::Derivation)?;
    let key = KeyBytes::new(&okm);
    okm.iter_mut().for_each(|b| *b = 0);
    key
}
