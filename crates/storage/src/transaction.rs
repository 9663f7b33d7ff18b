//! Write transactions for Vellum stores.
//!
//! A `WriteTransaction` works on a private copy-on-write image of the latest
//! snapshot and records what it touches in a `TransactionChangeInfo`. Only
//! one write transaction is open per store at a time.

use crate::change_info::TransactionChangeInfo;
use crate::snapshot::{Snapshot, TableData};
use crate::store::VersionedStore;
use crate::version::VersionId;
use std::sync::Arc;
use vellum_core::schema::TableSchema;
use vellum_core::{ColumnId, Error, Result, Row, RowKey, TableId, Value};

/// Transaction state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

/// An open write transaction.
///
/// Dropping an uncommitted transaction rolls it back.
pub struct WriteTransaction {
    store: Arc<VersionedStore>,
    /// Version the transaction started from.
    base: VersionId,
    tables: Vec<Arc<TableData>>,
    changes: TransactionChangeInfo,
    state: TransactionState,
}

impl WriteTransaction {
    pub(crate) fn new(store: Arc<VersionedStore>, base: Snapshot) -> Self {
        Self {
            base: base.version(),
            tables: base.tables().to_vec(),
            store,
            changes: TransactionChangeInfo::new(),
            state: TransactionState::Active,
        }
    }

    /// Returns the version this transaction started from.
    #[inline]
    pub fn base_version(&self) -> VersionId {
        self.base
    }

    /// Returns the current state.
    #[inline]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns true if the transaction is active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Returns the changes recorded so far.
    pub fn changes(&self) -> &TransactionChangeInfo {
        &self.changes
    }

    /// Checks if the transaction is active, returns error if not.
    fn check_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::invalid_state("Transaction is not active"));
        }
        Ok(())
    }

    fn table_schema(&self, table: TableId) -> Result<&TableSchema> {
        self.store.schema().require(table)
    }

    fn table_data_mut(&mut self, table: TableId) -> &mut TableData {
        Arc::make_mut(&mut self.tables[table as usize])
    }

    fn row_missing(&self, table: TableId, key: RowKey) -> Error {
        let name = self
            .store
            .schema()
            .table(table)
            .map(|t| t.name().to_string())
            .unwrap_or_default();
        Error::object_deleted(name, key)
    }

    /// Validates a value against a column's type and checks link targets exist.
    fn check_value(&self, table: TableId, column: ColumnId, value: &Value) -> Result<()> {
        let schema = self.table_schema(table)?;
        let col = schema
            .column(column)
            .ok_or_else(|| Error::column_not_found(schema.name(), format!("#{}", column)))?;
        let data_type = col.data_type();
        if !value.matches_type(data_type) {
            return Err(Error::type_mismatch(data_type, value.data_type()));
        }
        if let Some(target) = data_type.link_target() {
            for key in value.links() {
                if self.get(target, *key).is_none() {
                    return Err(self.row_missing(target, *key));
                }
            }
        }
        Ok(())
    }

    /// Gets a row as seen by this transaction.
    pub fn get(&self, table: TableId, key: RowKey) -> Option<&Row> {
        self.tables.get(table as usize).and_then(|t| t.get(key))
    }

    /// Inserts a row, returning its newly allocated key.
    pub fn insert(&mut self, table: TableId, values: Vec<Value>) -> Result<RowKey> {
        self.check_active()?;
        let schema = self.table_schema(table)?;
        if values.len() != schema.column_count() {
            return Err(Error::invalid_operation(format!(
                "Table {} has {} columns, got {} values",
                schema.name(),
                schema.column_count(),
                values.len()
            )));
        }
        for (column, value) in values.iter().enumerate() {
            self.check_value(table, column, value)?;
        }

        let key = self.store.allocate_key();
        self.table_data_mut(table).insert(Row::new(key, values));
        self.changes.table_mut(table).insert(key);
        Ok(key)
    }

    /// Sets a single column of a row.
    pub fn set(&mut self, table: TableId, key: RowKey, column: ColumnId, value: Value) -> Result<()> {
        self.check_active()?;
        self.check_value(table, column, &value)?;
        if self.get(table, key).is_none() {
            return Err(self.row_missing(table, key));
        }

        if let Some(row) = self.table_data_mut(table).get_mut(key) {
            row.set(column, value);
        }
        self.changes.table_mut(table).modify(key, column);
        Ok(())
    }

    /// Appends a link to a link list column.
    pub fn add_link(&mut self, table: TableId, key: RowKey, column: ColumnId, target: RowKey) -> Result<()> {
        self.check_active()?;
        let mut links = match self.get(table, key).and_then(|r| r.get(column)) {
            Some(Value::LinkList(links)) => links.clone(),
            Some(_) => {
                let data_type = self.table_schema(table)?.column(column).map(|c| c.data_type());
                return Err(Error::invalid_operation(format!(
                    "Column {} is not a link list ({:?})",
                    column, data_type
                )));
            }
            None if self.get(table, key).is_none() => return Err(self.row_missing(table, key)),
            None => {
                let schema = self.table_schema(table)?;
                return Err(Error::column_not_found(schema.name(), format!("#{}", column)));
            }
        };
        links.push(target);
        self.set(table, key, column, Value::LinkList(links))
    }

    /// Deletes a row.
    ///
    /// Links pointing at the row from other rows are removed, and those rows
    /// are recorded as modified in their link column.
    pub fn delete(&mut self, table: TableId, key: RowKey) -> Result<()> {
        self.check_active()?;
        self.table_schema(table)?;
        if self.table_data_mut(table).remove(key).is_none() {
            return Err(self.row_missing(table, key));
        }
        self.changes.table_mut(table).delete(key);

        for (origin, column) in self.store.schema().backlinks_to(table) {
            let linking: Vec<RowKey> = self.tables[origin as usize]
                .iter()
                .filter(|row| row.get(column).map_or(false, |v| v.links().contains(&key)))
                .map(|row| row.key())
                .collect();
            for origin_key in linking {
                if let Some(row) = self.table_data_mut(origin).get_mut(origin_key) {
                    if let Some(value) = row.get_mut(column) {
                        match value {
                            Value::Link(link) => *link = None,
                            Value::LinkList(links) => links.retain(|k| *k != key),
                            _ => {}
                        }
                    }
                }
                self.changes.table_mut(origin).modify(origin_key, column);
            }
        }
        Ok(())
    }

    /// Returns a snapshot of the uncommitted state, for reads inside the write.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.base, self.store.schema().clone(), self.tables.clone())
    }

    /// Commits the transaction, producing the next version.
    pub fn commit(mut self) -> Result<(VersionId, Arc<TransactionChangeInfo>)> {
        self.check_active()?;
        let tables = std::mem::take(&mut self.tables);
        let changes = std::mem::take(&mut self.changes);
        let committed = self.store.publish(tables, changes);
        self.state = TransactionState::Committed;
        Ok(committed)
    }

    /// Rolls back the transaction, discarding every change.
    pub fn rollback(mut self) -> Result<()> {
        self.check_active()?;
        self.state = TransactionState::RolledBack;
        Ok(())
    }
}

impl Drop for WriteTransaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            log::trace!("write transaction on {} rolled back on drop", self.base);
        }
        self.store.release_writer();
    }
}
