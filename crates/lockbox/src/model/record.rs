//! [`Record`]: one entity with plaintext accessors over ciphertext columns.

use std::{collections::BTreeMap, fmt};

use common::{LockboxError, Result, Value};
use tracing::debug;

use super::{id_value, Attribute, Model, Row};
use crate::codec::PendingWrite;

static NULL: Value = Value::Null;

/// A before/after pair reported by [`Record::changes`].
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Value before the uncommitted change.
    pub from: Value,
    /// Value after it.
    pub to: Value,
}

/// An entity of a [`Model`].
///
/// Stored columns (plain and ciphertext) live in memory as loaded; encrypted
/// attributes are read through their codec on every access, so the accessor
/// always reflects the in-memory ciphertext, even after the row is deleted.
pub struct Record {
    model: Model,
    id: Option<u64>,
    attributes: Row,
    original: Row,
    pending: BTreeMap<String, PendingWrite>,
    destroyed: bool,
    errors: Vec<String>,
}

impl Record {
    pub(crate) fn new(model: Model) -> Self {
        let attributes: Row = model
            .stored_columns()
            .map(|c| (c.to_owned(), Value::Null))
            .collect();
        Self {
            model,
            id: None,
            original: attributes.clone(),
            attributes,
            pending: BTreeMap::new(),
            destroyed: false,
            errors: Vec::new(),
        }
    }

    pub(crate) fn loaded(model: Model, id: u64, row: Row) -> Self {
        let mut record = Self::new(model);
        record.id = Some(id);
        record.attributes.extend(row);
        record.original = record.attributes.clone();
        record
    }

    /// The model this record belongs to.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Row id, once saved.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Returns `true` until the first successful save.
    pub fn is_new_record(&self) -> bool {
        self.id.is_none()
    }

    /// Returns `true` if the row exists and has not been destroyed.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some() && !self.destroyed
    }

    /// Returns `true` after [`Record::destroy`].
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Messages from the last rejected save.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn stored(&self, column: &str) -> &Value {
        self.attributes.get(column).unwrap_or(&NULL)
    }

    /// Read an attribute.
    ///
    /// For an encrypted attribute this is the plaintext, or the raw ciphertext
    /// while protected mode is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::UnknownAttribute`] or a decryption error.
    pub fn get(&self, name: &str) -> Result<Value> {
        match self.model.resolve(name)? {
            Attribute::Id => Ok(self.id.map(id_value).unwrap_or_default()),
            Attribute::Encrypted(codec) => codec.read_plaintext(
                self.stored(codec.ciphertext_column()),
                self.pending.get(name),
            ),
            Attribute::Column(column) => Ok(self.stored(column).clone()),
        }
    }

    /// Assign an attribute in memory.
    ///
    /// Assignments to encrypted attributes are always accepted; whether they
    /// can be committed is decided on save.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::UnknownAttribute`] for undeclared names and for `id`.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match self.model.resolve(name)? {
            Attribute::Id => Err(LockboxError::UnknownAttribute(format!(
                "{}.{name} is read-only",
                self.model.table()
            ))),
            Attribute::Encrypted(codec) => {
                let previous = self.pending.remove(name);
                let ciphertext = self.attributes.get(codec.ciphertext_column()).unwrap_or(&NULL);
                if let Some(pending) = codec.write_plaintext(ciphertext, previous, value) {
                    self.pending.insert(name.to_owned(), pending);
                }
                Ok(())
            }
            Attribute::Column(column) => {
                self.attributes.insert(column.to_owned(), value);
                Ok(())
            }
        }
    }

    /// Assign several attributes in memory.
    ///
    /// # Errors
    ///
    /// See [`Record::set`].
    pub fn assign<I, K, V>(&mut self, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in attributes {
            self.set(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Uncommitted changes, keyed by attribute or column name.
    ///
    /// Encrypted attributes report the value their accessor showed before the
    /// assignment. While protected that is always the stored ciphertext.
    pub fn changes(&self) -> BTreeMap<String, Change> {
        let mut out = BTreeMap::new();
        for (column, value) in &self.attributes {
            let from = self.original.get(column).unwrap_or(&NULL);
            if from != value {
                out.insert(
                    column.clone(),
                    Change {
                        from: from.clone(),
                        to: value.clone(),
                    },
                );
            }
        }
        for (name, pending) in &self.pending {
            let from = match self.model.codecs().get(name) {
                Some(codec) if codec.is_protected() => {
                    self.stored(codec.ciphertext_column()).clone()
                }
                _ => pending.was().clone(),
            };
            out.insert(
                name.clone(),
                Change {
                    from,
                    to: pending.value().clone(),
                },
            );
        }
        out
    }

    /// Returns `true` if anything would be written on save.
    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty() || self.attributes != self.original
    }

    /// Save (soft).
    ///
    /// Returns `Ok(false)` when protected mode rejects an encrypted write; in
    /// that case nothing is committed and [`Record::errors`] says why.
    ///
    /// # Errors
    ///
    /// Returns key, encryption, or storage errors.
    pub fn save(&mut self) -> Result<bool> {
        self.errors.clear();
        match self.persist() {
            Ok(()) => Ok(true),
            Err(e) if e.is_protected_mode_violation() => {
                self.errors.push(e.to_string());
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Save (strict). Nothing is committed on error.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::ProtectedMode`] when protected mode rejects an
    /// encrypted write, plus every error of [`Record::save`].
    pub fn save_strict(&mut self) -> Result<()> {
        self.errors.clear();
        self.persist().inspect_err(|e| {
            if e.is_protected_mode_violation() {
                self.errors.push(e.to_string());
            }
        })
    }

    /// Assign and save (soft).
    ///
    /// # Errors
    ///
    /// See [`Record::set`] and [`Record::save`].
    pub fn update<I, K, V>(&mut self, attributes: I) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.assign(attributes)?;
        self.save()
    }

    /// Assign and save (strict).
    ///
    /// # Errors
    ///
    /// See [`Record::set`] and [`Record::save_strict`].
    pub fn update_strict<I, K, V>(&mut self, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.assign(attributes)?;
        self.save_strict()
    }

    /// Write one column straight to storage, skipping change tracking.
    ///
    /// For an encrypted attribute the value is encrypted into its ciphertext
    /// column whether or not protected mode is enabled. Any other name writes
    /// the literal value, including a ciphertext column named directly.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::Persistence`] for unsaved or destroyed records,
    /// plus encryption and storage errors.
    pub fn update_column(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.update_columns([(name, value.into())])
    }

    /// Write several columns straight to storage. See [`Record::update_column`].
    ///
    /// # Errors
    ///
    /// See [`Record::update_column`].
    pub fn update_columns<I, K, V>(&mut self, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let id = self.require_persisted("update columns of")?;

        let mut changes = Row::new();
        let mut cleared = Vec::new();
        for (name, value) in attributes {
            let name = name.as_ref();
            let value = value.into();
            match self.model.resolve(name)? {
                Attribute::Id => {
                    return Err(LockboxError::UnknownAttribute(format!(
                        "{}.{name} is read-only",
                        self.model.table()
                    )))
                }
                Attribute::Encrypted(codec) => {
                    changes.insert(codec.ciphertext_column().to_owned(), codec.direct_write(&value)?);
                    cleared.push(name.to_owned());
                }
                Attribute::Column(column) => {
                    changes.insert(column.to_owned(), value);
                }
            }
        }

        self.model
            .store()
            .update(self.model.table(), id, changes.clone())?;
        for name in cleared {
            self.pending.remove(&name);
        }
        self.original.extend(changes.clone());
        self.attributes.extend(changes);
        Ok(())
    }

    /// Delete the row. In-memory state, ciphertext included, is kept.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn destroy(&mut self) -> Result<()> {
        if let Some(id) = self.id {
            if !self.destroyed {
                self.model.store().delete(self.model.table(), id)?;
                debug!(table = %self.model.table(), id, "record destroyed");
            }
        }
        self.destroyed = true;
        Ok(())
    }

    /// Re-read the row, discarding uncommitted changes.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::RecordNotFound`] if the row no longer exists.
    pub fn reload(&mut self) -> Result<()> {
        let id = self.require_persisted("reload")?;
        let fresh = self.model.find(id)?;
        self.attributes = fresh.attributes;
        self.original = fresh.original;
        self.pending.clear();
        self.errors.clear();
        Ok(())
    }

    fn require_persisted(&self, action: &str) -> Result<u64> {
        match self.id {
            Some(id) if !self.destroyed => Ok(id),
            Some(id) => Err(LockboxError::Persistence(format!(
                "cannot {action} destroyed record {}#{id}",
                self.model.table()
            ))),
            None => Err(LockboxError::Persistence(format!(
                "cannot {action} a new {} record",
                self.model.table()
            ))),
        }
    }

    /// Commit pending writes and column changes. All-or-nothing: every
    /// encrypted write is prepared before the store is touched.
    fn persist(&mut self) -> Result<()> {
        if self.destroyed {
            return Err(LockboxError::Persistence(format!(
                "cannot save destroyed {} record",
                self.model.table()
            )));
        }

        let mut staged = self.attributes.clone();
        for (name, pending) in &self.pending {
            let codec = self
                .model
                .codecs()
                .get(name)
                .ok_or_else(|| LockboxError::UnknownAttribute(name.clone()))?;
            staged.insert(codec.ciphertext_column().to_owned(), codec.before_persist(pending)?);
        }

        let table = self.model.table();
        match self.id {
            None => {
                let id = self.model.store().insert(table, staged.clone())?;
                debug!(table = %table, id, "record created");
                self.id = Some(id);
            }
            Some(id) => {
                let changed: Row = staged
                    .iter()
                    .filter(|(column, value)| self.original.get(*column) != Some(*value))
                    .map(|(column, value)| (column.clone(), value.clone()))
                    .collect();
                if !changed.is_empty() {
                    self.model.store().update(table, id, changed)?;
                    debug!(table = %table, id, "record updated");
                }
            }
        }

        self.original = staged.clone();
        self.attributes = staged;
        self.pending.clear();
        Ok(())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Pending plaintext stays out of debug output.
        f.debug_struct("Record")
            .field("table", &self.model.table())
            .field("id", &self.id)
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}
