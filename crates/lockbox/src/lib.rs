//! Transparent field-level encryption for records.
//!
//! Encrypted attributes are read and written as plaintext while their values
//! are stored in ciphertext columns. Enabling protected mode turns decryption
//! off: accessors return the stored ciphertext verbatim and any commit that
//! would re-encrypt a plaintext write is rejected.
//!
//! ```
//! use std::sync::Arc;
//! use lockbox::{KeyBytes, Lockbox, MemoryStore, Model, ProtectedMode, Value};
//!
//! let mode = ProtectedMode::new();
//! let lockbox = Lockbox::with_master_key(KeyBytes::generate()).with_protected_mode(mode.clone());
//! let users = Model::builder("users", lockbox, Arc::new(MemoryStore::new()))
//!     .column("name")
//!     .encrypts("email")
//!     .build()?;
//!
//! let mut user = users.create_strict([("name", "ann"), ("email", "ann@example.org")])?;
//! assert_eq!(user.get("email")?, Value::from("ann@example.org"));
//!
//! mode.enable();
//! assert_eq!(user.get("email")?, user.get("email_ciphertext")?);
//! assert!(!user.update([("email", "bob@example.org")])?);
//! # Ok::<(), lockbox::LockboxError>(())
//! ```

pub mod codec;
pub mod config;
pub mod context;
pub mod crypto;
pub mod guard;
pub mod keys;
pub mod model;
pub mod telemetry;

pub use codec::{AttributeType, EncryptedAttribute};
pub use common::{LockboxError, Result, Value};
pub use context::Lockbox;
pub use crypto::CipherBox;
pub use guard::{
    disable_protected_mode, enable_protected_mode, protected_mode_enabled, with_protected_mode,
    ProtectedMode, ProtectedModeScope, ProtectionState,
};
pub use keys::{KeyBytes, KeyCoordinate, KeyMaterial, KeyResolver, KeyRing, MasterKeyResolver};
pub use model::{Change, MemoryStore, Model, Record, RowStore};
