//! Structured logging setup for the operator binary.
//!
//! # Logging invariants
//!
//! - **No plaintext or key material** may appear in any log field. Attribute
//!   names, table names, and record ids are fine.
//! - Log level comes from `RUST_LOG` if set, else `LOCKBOX_LOG_LEVEL` (default: `info`).

pub mod init;

pub use init::init_tracing;
