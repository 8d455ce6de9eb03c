//! AES-256-GCM-SIV attribute encryption primitives.
//!
//! This module knows nothing about records or storage. It provides the
//! low-level envelope functions and the [`CipherBox`] built on them.
//!
//! # Ciphertext format
//!
//! ```text
//! encoded: v1.<base64url-no-pad(nonce)>.<base64url-no-pad(ciphertext+tag)>
//! raw:     nonce(12) || ciphertext+tag
//! ```
//!
//! The `v1` prefix enables future algorithm migration without breaking
//! existing ciphertext.

pub mod cipher;
pub mod cipher_box;

pub use cipher::{CipherError, KEY_LEN};
pub use cipher_box::CipherBox;
