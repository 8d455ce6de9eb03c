//! [`RowStore`]: the storage seam, and [`MemoryStore`], its in-memory implementation.

use std::collections::{BTreeMap, HashMap};

use common::{LockboxError, Result, Value};
use parking_lot::Mutex;

/// One stored row: column name → value. The row id is kept outside the map.
pub type Row = BTreeMap<String, Value>;

/// Row-level persistence used by [`Model`](super::Model).
///
/// Implementations store whatever values they are handed; they never see
/// plaintext of encrypted attributes.
pub trait RowStore: Send + Sync {
    /// Insert a row and return its id.
    fn insert(&self, table: &str, row: Row) -> Result<u64>;

    /// Overwrite the given columns of an existing row.
    ///
    /// # Errors
    ///
    /// Returns [`LockboxError::RecordNotFound`] if the row does not exist.
    fn update(&self, table: &str, id: u64, changes: Row) -> Result<()>;

    /// Delete a row. Returns `true` if it existed.
    fn delete(&self, table: &str, id: u64) -> Result<bool>;

    /// Fetch a row by id.
    fn fetch(&self, table: &str, id: u64) -> Result<Option<Row>>;

    /// All rows of a table in id order.
    fn scan(&self, table: &str) -> Result<Vec<(u64, Row)>>;

    /// Delete every row of a table and return how many were removed.
    fn delete_all(&self, table: &str) -> Result<usize>;
}

#[derive(Debug, Default)]
struct MemoryTable {
    next_id: u64,
    rows: BTreeMap<u64, Row>,
}

/// Thread-safe in-memory [`RowStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, MemoryTable>>,
}

impl MemoryStore {
    /// Create a new, empty [`MemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowStore for MemoryStore {
    fn insert(&self, table: &str, row: Row) -> Result<u64> {
        let mut tables = self.tables.lock();
        let t = tables.entry(table.to_owned()).or_default();
        t.next_id += 1;
        let id = t.next_id;
        t.rows.insert(id, row);
        Ok(id)
    }

    fn update(&self, table: &str, id: u64, changes: Row) -> Result<()> {
        let mut tables = self.tables.lock();
        let row = tables
            .get_mut(table)
            .and_then(|t| t.rows.get_mut(&id))
            .ok_or_else(|| LockboxError::RecordNotFound {
                table: table.to_owned(),
                id,
            })?;
        row.extend(changes);
        Ok(())
    }

    fn delete(&self, table: &str, id: u64) -> Result<bool> {
        let mut tables = self.tables.lock();
        Ok(tables
            .get_mut(table)
            .is_some_and(|t| t.rows.remove(&id).is_some()))
    }

    fn fetch(&self, table: &str, id: u64) -> Result<Option<Row>> {
        let tables = self.tables.lock();
        Ok(tables.get(table).and_then(|t| t.rows.get(&id)).cloned())
    }

    fn scan(&self, table: &str) -> Result<Vec<(u64, Row)>> {
        let tables = self.tables.lock();
        Ok(tables
            .get(table)
            .map(|t| t.rows.iter().map(|(id, row)| (*id, row.clone())).collect())
            .unwrap_or_default())
    }

    fn delete_all(&self, table: &str) -> Result<usize> {
        let mut tables = self.tables.lock();
        Ok(tables
            .get_mut(table)
            .map(|t| std::mem::take(&mut t.rows).len())
            .unwrap_or(0))
    }
}
