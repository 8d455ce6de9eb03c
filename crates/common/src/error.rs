//! Common error types shared across crates.

use thiserror::Error;

/// Result alias used throughout the lockbox crates.
pub type Result<T> = std::result::Result<T, LockboxError>;

/// Top-level lockbox error type.
///
/// Each variant carries a stable machine-readable code (see [`LockboxError::code`]):
/// - [`LockboxError::Configuration`] → `configuration`
/// - [`LockboxError::Decryption`] → `decryption`
/// - [`LockboxError::ProtectedMode`] → `protected_mode`
#[derive(Debug, Error)]
pub enum LockboxError {
    /// No key could be resolved, or key material / settings are invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Ciphertext failed authentication or is malformed for every candidate key.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Plaintext could not be encrypted.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// A plaintext write to an encrypted attribute was attempted while
    /// protected mode is enabled.
    #[error("protected mode is enabled: cannot write encrypted attribute `{attribute}`")]
    ProtectedMode {
        /// Logical name of the rejected attribute.
        attribute: String,
    },

    /// The attribute is neither a declared column nor an encrypted attribute.
    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    /// The value does not match the declared attribute type.
    #[error("type mismatch for `{attribute}`: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Logical name of the attribute.
        attribute: String,
        /// Declared type.
        expected: &'static str,
        /// Type of the supplied value.
        actual: &'static str,
    },

    /// No row exists for the given table and id.
    #[error("record not found: {table}#{id}")]
    RecordNotFound {
        /// Table name.
        table: String,
        /// Row id.
        id: u64,
    },

    /// The storage layer rejected the operation.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl LockboxError {
    /// Short machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            LockboxError::Configuration(_) => "configuration",
            LockboxError::Decryption(_) => "decryption",
            LockboxError::Encryption(_) => "encryption",
            LockboxError::ProtectedMode { .. } => "protected_mode",
            LockboxError::UnknownAttribute(_) => "unknown_attribute",
            LockboxError::TypeMismatch { .. } => "type_mismatch",
            LockboxError::RecordNotFound { .. } => "record_not_found",
            LockboxError::Persistence(_) => "persistence",
        }
    }

    /// Returns `true` for a protected-mode write rejection.
    ///
    /// Soft persistence calls turn exactly this error into a `false` result.
    pub fn is_protected_mode_violation(&self) -> bool {
        matches!(self, LockboxError::ProtectedMode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(LockboxError::Configuration("x".into()).code(), "configuration");
        assert_eq!(LockboxError::Decryption("x".into()).code(), "decryption");
        assert_eq!(
            LockboxError::ProtectedMode {
                attribute: "email".into()
            }
            .code(),
            "protected_mode"
        );
        assert_eq!(
            LockboxError::RecordNotFound {
                table: "users".into(),
                id: 7
            }
            .code(),
            "record_not_found"
        );
    }

    #[test]
    fn display_includes_attribute() {
        let e = LockboxError::ProtectedMode {
            attribute: "email".into(),
        };
        assert!(e.to_string().contains("`email`"));
        assert!(e.is_protected_mode_violation());
        assert!(!LockboxError::Decryption("bad tag".into()).is_protected_mode_violation());
    }

    #[test]
    fn record_not_found_display() {
        let e = LockboxError::RecordNotFound {
            table: "users".into(),
            id: 3,
        };
        assert_eq!(e.to_string(), "record not found: users#3");
    }
}
