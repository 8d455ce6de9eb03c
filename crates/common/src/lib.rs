//! Common types and errors shared across the `lockbox` crates.

pub mod error;
pub mod value;

pub use error::{LockboxError, Result};
pub use value::Value;
