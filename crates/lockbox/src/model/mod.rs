//! Minimal record layer that drives the codecs the way a host ORM would.
//!
//! A [`Model`] is one table: its plain columns, its encrypted attributes, the
//! [`Lockbox`] context they use, and a [`RowStore`]. [`Record`]s read and write
//! through the model's codec registry, so every accessor, commit, direct
//! column write, and bulk projection passes the protected-mode checks in
//! [`AttributeCodec`].

pub mod record;
pub mod store;

pub use record::{Change, Record};
pub use store::{MemoryStore, Row, RowStore};

use std::{collections::BTreeSet, fmt, sync::Arc};

use common::{LockboxError, Result, Value};
use tracing::info;

use crate::codec::{AttributeCodec, CodecRegistry, EncryptedAttribute};
use crate::context::Lockbox;

/// Name of the read-only primary key attribute.
pub const ID: &str = "id";

/// A table with encrypted attributes. Cheap to clone.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

struct ModelInner {
    table: String,
    columns: BTreeSet<String>,
    codecs: CodecRegistry,
    lockbox: Lockbox,
    store: Arc<dyn RowStore>,
}

/// How a model interprets an attribute name.
pub(crate) enum Attribute<'a> {
    Id,
    Encrypted(&'a AttributeCodec),
    Column(&'a str),
}

impl Model {
    /// Start declaring a model for `table`.
    pub fn builder(
        table: impl Into<String>,
        lockbox: Lockbox,
        store: Arc<dyn RowStore>,
    ) -> ModelBuilder {
        ModelBuilder {
            table: table.into(),
            lockbox,
            store,
            columns: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.inner.table
    }

    /// The encryption context.
    pub fn lockbox(&self) -> &Lockbox {
        &self.inner.lockbox
    }

    /// The encrypted attributes of this table.
    pub fn codecs(&self) -> &CodecRegistry {
        &self.inner.codecs
    }

    pub(crate) fn store(&self) -> &dyn RowStore {
        self.inner.store.as_ref()
    }

    /// Every stored column: plain columns and ciphertext columns.
    pub(crate) fn stored_columns(&self) -> impl Iterator<Item = &str> {
        self.inner
            .columns
            .iter()
            .map(String::as_str)
            .chain(self.inner.codecs.ciphertext_columns())
    }

    pub(crate) fn resolve<'a>(&'a self, name: &str) -> Result<Attribute<'a>> {
        if name == ID {
            return Ok(Attribute::Id);
        }
        if let Some(codec) = self.inner.codecs.get(name) {
            return Ok(Attribute::Encrypted(codec));
        }
        if let Some(column) = self.inner.columns.get(name) {
            return Ok(Attribute::Column(column.as_str()));
        }
        if let Some(codec) = self.inner.codecs.by_ciphertext_column(name) {
            return Ok(Attribute::Column(codec.ciphertext_column()));
        }
        Err(LockboxError::UnknownAttribute(format!(
            "{}.{name}",
            self.inner.table
        )))
    }

    /// A new, unsaved record with every column null.
    pub fn new_record(&self) -> Record {
        Record::new(self.clone())
    }

    /// Build and save a record (soft).
    ///
    /// A protected-mode violation yields an unsaved record whose
    /// [`Record::errors`] explain why; check [`Record::is_persisted`].
    ///
    /// # Errors
    ///
    /// Returns unknown-attribute, type, key, or storage errors.
    pub fn create<I, K, V>(&self, attributes: I) -> Result<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = self.new_record();
        record.assign(attributes)?;
        record.save()?;
        Ok(record)
    }

    /// Build and save a record (strict).
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::ProtectedMode`] if an encrypted attribute is
    /// supplied while protected, plus every error of [`Model::create`].
    pub fn create_strict<I, K, V>(&self, attributes: I) -> Result<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = self.new_record();
        record.assign(attributes)?;
        record.save_strict()?;
        Ok(record)
    }

    /// Load a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::RecordNotFound`] if no such row exists.
    pub fn find(&self, id: u64) -> Result<Record> {
        let row = self
            .store()
            .fetch(self.table(), id)?
            .ok_or_else(|| LockboxError::RecordNotFound {
                table: self.table().to_owned(),
                id,
            })?;
        Ok(Record::loaded(self.clone(), id, row))
    }

    /// All records in id order.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn all(&self) -> Result<Vec<Record>> {
        Ok(self
            .store()
            .scan(self.table())?
            .into_iter()
            .map(|(id, row)| Record::loaded(self.clone(), id, row))
            .collect())
    }

    /// The record with the lowest id.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn first(&self) -> Result<Option<Record>> {
        Ok(self.all()?.into_iter().next())
    }

    /// The record with the highest id.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn last(&self) -> Result<Option<Record>> {
        Ok(self.all()?.pop())
    }

    /// Number of stored rows.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn count(&self) -> Result<usize> {
        Ok(self.store().scan(self.table())?.len())
    }

    /// Read `columns` from every row without building records.
    ///
    /// Encrypted attributes are decrypted, unless protected mode is enabled,
    /// in which case their ciphertext columns are returned instead.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::UnknownAttribute`] for an undeclared column,
    /// or a decryption error for invalid ciphertext when unprotected.
    pub fn pluck(&self, columns: &[&str]) -> Result<Vec<Vec<Value>>> {
        let attributes = columns
            .iter()
            .map(|c| self.resolve(c))
            .collect::<Result<Vec<_>>>()?;

        self.store()
            .scan(self.table())?
            .into_iter()
            .map(|(id, row)| {
                attributes
                    .iter()
                    .map(|attribute| match attribute {
                        Attribute::Id => Ok(id_value(id)),
                        Attribute::Encrypted(codec) => codec.project(
                            row.get(codec.ciphertext_column()).unwrap_or(&Value::Null),
                        ),
                        Attribute::Column(column) => {
                            Ok(row.get(*column).cloned().unwrap_or_default())
                        }
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    /// Single-column [`Model::pluck`].
    ///
    /// # Errors
    ///
    /// See [`Model::pluck`].
    pub fn pluck_one(&self, column: &str) -> Result<Vec<Value>> {
        Ok(self
            .pluck(&[column])?
            .into_iter()
            .flat_map(|mut values| values.pop())
            .collect())
    }

    /// Delete every row of the table.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn delete_all(&self) -> Result<usize> {
        self.store().delete_all(self.table())
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("table", &self.inner.table)
            .field("columns", &self.inner.columns)
            .field("encrypted", &self.inner.codecs.len())
            .finish_non_exhaustive()
    }
}

pub(crate) fn id_value(id: u64) -> Value {
    i64::try_from(id).map(Value::Integer).unwrap_or(Value::Null)
}

/// Declares the columns and encrypted attributes of a [`Model`].
pub struct ModelBuilder {
    table: String,
    lockbox: Lockbox,
    store: Arc<dyn RowStore>,
    columns: Vec<String>,
    attributes: Vec<EncryptedAttribute>,
}

impl ModelBuilder {
    /// Declare a plain (unencrypted) column.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }

    /// Declare an encrypted attribute with default settings.
    pub fn encrypts(mut self, name: impl Into<String>) -> Self {
        let decl = EncryptedAttribute::new(self.table.clone(), name);
        self.attributes.push(decl);
        self
    }

    /// Declare an encrypted attribute with explicit settings.
    pub fn encrypts_with(mut self, decl: EncryptedAttribute) -> Self {
        self.attributes.push(decl);
        self
    }

    /// Validate the declarations and build the model.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::Configuration`] for duplicate or colliding names.
    pub fn build(self) -> Result<Model> {
        let mut codecs = CodecRegistry::new();
        for decl in self.attributes {
            codecs.register(decl, self.lockbox.clone())?;
        }

        let mut columns = BTreeSet::new();
        for column in self.columns {
            let taken = column == ID
                || codecs.get(&column).is_some()
                || codecs.is_ciphertext_column(&column);
            if taken || !columns.insert(column.clone()) {
                return Err(LockboxError::Configuration(format!(
                    "column `{column}` is declared more than once on `{}`",
                    self.table
                )));
            }
        }

        info!(
            table = %self.table,
            columns = columns.len(),
            encrypted = codecs.len(),
            "model declared"
        );
        Ok(Model {
            inner: Arc::new(ModelInner {
                table: self.table,
                columns,
                codecs,
                lockbox: self.lockbox,
                store: self.store,
            }),
        })
    }
}
