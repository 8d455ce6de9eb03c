//! Encrypted attribute declarations and the codecs that apply them.
//!
//! # Responsibilities
//!
//! - Describe each encrypted attribute: logical name, ciphertext column, key
//!   coordinate, value type, and envelope encoding.
//! - Turn plaintext values into ciphertext column values and back, consulting
//!   protected mode on every read, write, and commit.
//! - Resolve logical names and ciphertext columns through a [`CodecRegistry`].
//!
//! # Module invariants
//!
//! - Exactly one ciphertext column per logical name; declarations are
//!   immutable once registered.
//! - No storage dependency: codecs see only values and pending writes, never
//!   a [`RowStore`](crate::model::RowStore).

pub mod attribute;
pub mod registry;

pub use attribute::{AttributeCodec, PendingWrite};
pub use registry::CodecRegistry;

use common::{LockboxError, Result, Value};

use crate::keys::KeyCoordinate;

/// Largest integer magnitude an `f64` represents exactly (2^53).
const MAX_EXACT_FLOAT_INT: u64 = 1 << 53;

/// Plaintext type of an encrypted attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeType {
    /// UTF-8 text.
    #[default]
    String,
    /// Raw bytes.
    Binary,
    /// Signed 64-bit integer, stored big-endian.
    Integer,
    /// 64-bit float, stored big-endian.
    Float,
    /// Boolean, stored as `t` / `f`.
    Boolean,
}

impl AttributeType {
    fn name(self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Binary => "binary",
            AttributeType::Integer => "integer",
            AttributeType::Float => "float",
            AttributeType::Boolean => "boolean",
        }
    }

    /// Serialise a non-null plaintext value for encryption.
    pub(crate) fn serialize(self, attribute: &str, value: &Value) -> Result<Vec<u8>> {
        match (self, value) {
            (AttributeType::String, Value::Text(s)) => Ok(s.as_bytes().to_vec()),
            (AttributeType::Binary, Value::Binary(b)) => Ok(b.clone()),
            (AttributeType::Binary, Value::Text(s)) => Ok(s.as_bytes().to_vec()),
            (AttributeType::Integer, Value::Integer(i)) => Ok(i.to_be_bytes().to_vec()),
            (AttributeType::Float, Value::Float(x)) => Ok(x.to_be_bytes().to_vec()),
            (AttributeType::Float, Value::Integer(i)) if i.unsigned_abs() <= MAX_EXACT_FLOAT_INT => {
                Ok((*i as f64).to_be_bytes().to_vec())
            }
            (AttributeType::Boolean, Value::Boolean(b)) => {
                Ok(if *b { b"t".to_vec() } else { b"f".to_vec() })
            }
            _ => Err(LockboxError::TypeMismatch {
                attribute: attribute.to_owned(),
                expected: self.name(),
                actual: value.type_name(),
            }),
        }
    }

    /// Rebuild a plaintext value from decrypted bytes.
    pub(crate) fn deserialize(self, attribute: &str, bytes: Vec<u8>) -> Result<Value> {
        let malformed =
            || LockboxError::Decryption(format!("decrypted `{attribute}` is not a valid {}", self.name()));
        match self {
            AttributeType::String => String::from_utf8(bytes)
                .map(Value::Text)
                .map_err(|_| malformed()),
            AttributeType::Binary => Ok(Value::Binary(bytes)),
            AttributeType::Integer => <[u8; 8]>::try_from(bytes.as_slice())
                .map(|b| Value::Integer(i64::from_be_bytes(b)))
                .map_err(|_| malformed()),
            AttributeType::Float => <[u8; 8]>::try_from(bytes.as_slice())
                .map(|b| Value::Float(f64::from_be_bytes(b)))
                .map_err(|_| malformed()),
            AttributeType::Boolean => match bytes.as_slice() {
                b"t" => Ok(Value::Boolean(true)),
                b"f" => Ok(Value::Boolean(false)),
                _ => Err(malformed()),
            },
        }
    }
}

/// Declaration of one encrypted attribute.
///
/// ```
/// use lockbox::codec::{AttributeType, EncryptedAttribute};
///
/// let email = EncryptedAttribute::new("users", "email");
/// assert_eq!(email.ciphertext_column_name(), "email_ciphertext");
/// assert_eq!(email.key_coordinate().attribute, "email_ciphertext");
///
/// let age = EncryptedAttribute::new("users", "age")
///     .attr_type(AttributeType::Integer)
///     .key_attribute("encrypted_age");
/// assert_eq!(age.key_coordinate().attribute, "encrypted_age");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedAttribute {
    name: String,
    ciphertext_column: String,
    key_table: String,
    key_attribute: Option<String>,
    attr_type: AttributeType,
    encode: Option<bool>,
}

impl EncryptedAttribute {
    /// Declare `name` on `table` with the default `<name>_ciphertext` column.
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            ciphertext_column: format!("{name}_ciphertext"),
            name,
            key_table: table.into(),
            key_attribute: None,
            attr_type: AttributeType::default(),
            encode: None,
        }
    }

    /// Store ciphertext in `column` instead of `<name>_ciphertext`.
    pub fn ciphertext_column(mut self, column: impl Into<String>) -> Self {
        self.ciphertext_column = column.into();
        self
    }

    /// Use `attribute` in the key coordinate instead of the ciphertext column.
    pub fn key_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.key_attribute = Some(attribute.into());
        self
    }

    /// Use `table` in the key coordinate.
    pub fn key_table(mut self, table: impl Into<String>) -> Self {
        self.key_table = table.into();
        self
    }

    /// Declare the plaintext type.
    pub fn attr_type(mut self, attr_type: AttributeType) -> Self {
        self.attr_type = attr_type;
        self
    }

    /// Force text-encoded (`true`) or raw (`false`) envelopes.
    pub fn encode(mut self, encode: bool) -> Self {
        self.encode = Some(encode);
        self
    }

    /// Logical (plaintext) attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the stored ciphertext column.
    pub fn ciphertext_column_name(&self) -> &str {
        &self.ciphertext_column
    }

    /// The coordinate used for key lookup.
    pub fn key_coordinate(&self) -> KeyCoordinate {
        let attribute = self
            .key_attribute
            .clone()
            .unwrap_or_else(|| self.ciphertext_column.clone());
        KeyCoordinate::new(self.key_table.clone(), attribute)
    }

    /// Declared plaintext type.
    pub fn value_type(&self) -> AttributeType {
        self.attr_type
    }

    /// Explicit encode flag, if one was declared.
    pub fn encode_override(&self) -> Option<bool> {
        self.encode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_values_survive_serialisation() {
        let cases = [
            (AttributeType::String, Value::from("test@example.org")),
            (AttributeType::Binary, Value::Binary(vec![0, 255, 7])),
            (AttributeType::Integer, Value::Integer(-42)),
            (AttributeType::Float, Value::Float(1.5)),
            (AttributeType::Boolean, Value::Boolean(false)),
        ];
        for (ty, value) in cases {
            let bytes = ty.serialize("attr", &value).unwrap();
            assert_eq!(ty.deserialize("attr", bytes).unwrap(), value, "{ty:?}");
        }
    }

    #[test]
    fn integer_layout_is_big_endian() {
        let bytes = AttributeType::Integer
            .serialize("age", &Value::Integer(1))
            .unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn float_accepts_only_exact_integers() {
        let exact = AttributeType::Float
            .serialize("score", &Value::Integer(1 << 53))
            .unwrap();
        assert_eq!(
            AttributeType::Float.deserialize("score", exact).unwrap(),
            Value::Float(9_007_199_254_740_992.0)
        );

        let err = AttributeType::Float
            .serialize("score", &Value::Integer((1 << 53) + 1))
            .unwrap_err();
        assert!(matches!(
            err,
            LockboxError::TypeMismatch {
                expected: "float",
                actual: "integer",
                ..
            }
        ));
    }

    #[test]
    fn mismatched_type_rejected() {
        let err = AttributeType::Integer
            .serialize("age", &Value::from("forty"))
            .unwrap_err();
        assert!(matches!(
            err,
            LockboxError::TypeMismatch {
                expected: "integer",
                actual: "text",
                ..
            }
        ));
    }

    #[test]
    fn malformed_plaintext_is_decryption_error() {
        let err = AttributeType::Boolean
            .deserialize("active", b"yes".to_vec())
            .unwrap_err();
        assert_eq!(err.code(), "decryption");
    }

    #[test]
    fn declaration_defaults() {
        let decl = EncryptedAttribute::new("users", "email");
        assert_eq!(decl.name(), "email");
        assert_eq!(decl.ciphertext_column_name(), "email_ciphertext");
        assert_eq!(
            decl.key_coordinate(),
            KeyCoordinate::new("users", "email_ciphertext")
        );
        assert_eq!(decl.value_type(), AttributeType::String);
        assert_eq!(decl.encode_override(), None);
    }

    #[test]
    fn custom_column_moves_key_coordinate() {
        let decl = EncryptedAttribute::new("users", "email").ciphertext_column("encrypted_email");
        assert_eq!(decl.key_coordinate().attribute, "encrypted_email");
    }
}
