//! In-memory driver.
//!
//! A [`MemoryDatabase`] is a shared catalog; each [`MemoryDriver`] is one
//! session on it. Transactions work on a private copy of the catalog that
//! replaces the shared one on commit. Advisory locks are per-key async
//! mutexes held for the life of the session or until released.

mod catalog;
mod projection;

pub use catalog::CatalogObjects;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::ast::{IndexDef, QualifiedName, SchemaOp};
use crate::driver::{Driver, DriverError, DriverResult};
use crate::migrate::{LedgerEntry, Version};

use catalog::{rejected, Catalog, Cell};

#[derive(Default)]
struct Shared {
    catalog: Mutex<Catalog>,
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

/// A simulated PostgreSQL database.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

fn as_object(value: Value) -> DriverResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(rejected(format!("expected a JSON object, got {}", other))),
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session.
    pub fn connect(&self) -> MemoryDriver {
        MemoryDriver {
            db: self.clone(),
            tx: None,
            locks: HashMap::new(),
        }
    }

    /// Insert one row (autocommit). Enum columns take labels.
    pub fn insert(&self, table: impl Into<QualifiedName>, row: Value) -> DriverResult<()> {
        let row = as_object(row)?;
        self.shared.catalog.lock().insert_row(&table.into(), &row)
    }

    /// Update every row whose `key_column` equals `key`; returns the count.
    pub fn update(
        &self,
        table: impl Into<QualifiedName>,
        key_column: &str,
        key: Value,
        changes: Value,
    ) -> DriverResult<usize> {
        let changes = as_object(changes)?;
        self.shared
            .catalog
            .lock()
            .update_rows(&table.into(), key_column, &key, &changes)
    }

    /// Mark rows deleted by setting `deleted_at`.
    pub fn soft_delete(&self, table: impl Into<QualifiedName>, key_column: &str, key: Value) -> DriverResult<usize> {
        self.update(table, key_column, key, json!({ "deleted_at": Utc::now().to_rfc3339() }))
    }

    pub fn delete(&self, table: impl Into<QualifiedName>, key_column: &str, key: Value) -> DriverResult<usize> {
        self.shared
            .catalog
            .lock()
            .delete_rows(&table.into(), key_column, &key)
    }

    /// Rows of a table as JSON objects.
    pub fn rows(&self, table: impl Into<QualifiedName>) -> Option<Vec<Map<String, Value>>> {
        self.shared.catalog.lock().rows_json(&table.into())
    }

    /// Stored rows of a materialized view.
    pub fn view_rows(&self, view: impl Into<QualifiedName>) -> Option<Vec<Map<String, Value>>> {
        self.shared
            .catalog
            .lock()
            .view(&view.into())
            .map(|v| v.rows.clone())
    }

    pub fn enum_order(&self, type_name: impl Into<QualifiedName>) -> Option<Vec<String>> {
        self.shared
            .catalog
            .lock()
            .enum_type(&type_name.into())
            .map(|e| e.labels())
    }

    /// Raw enum oids stored in a column, `None` for null cells.
    pub fn stored_enum_oids(&self, table: impl Into<QualifiedName>, column: &str) -> Option<Vec<Option<u32>>> {
        let catalog = self.shared.catalog.lock();
        let table = catalog.table(&table.into())?;
        Some(
            table
                .rows
                .iter()
                .map(|row| match row.get(column) {
                    Some(Cell::Enum(oid)) => Some(*oid),
                    _ => None,
                })
                .collect(),
        )
    }

    pub fn index(&self, name: impl Into<QualifiedName>) -> Option<IndexDef> {
        self.shared.catalog.lock().index(&name.into()).cloned()
    }

    pub fn objects(&self) -> CatalogObjects {
        self.shared.catalog.lock().objects()
    }

    /// Apply a statement outside any session (fixture setup).
    pub fn execute(&self, op: &SchemaOp) -> DriverResult<()> {
        let mut catalog = self.shared.catalog.lock();
        let mut working = catalog.clone();
        working.apply(op)?;
        *catalog = working;
        Ok(())
    }

    fn lock_handle(&self, key: i64) -> Arc<AsyncMutex<()>> {
        self.shared
            .locks
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

struct Transaction {
    working: Catalog,
    aborted: bool,
}

/// One session on a [`MemoryDatabase`].
pub struct MemoryDriver {
    db: MemoryDatabase,
    tx: Option<Transaction>,
    locks: HashMap<i64, OwnedMutexGuard<()>>,
}

impl MemoryDriver {
    /// The database this session is connected to.
    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    /// Run `f` against the session's view of the catalog. Inside a
    /// transaction a failure aborts it; outside, the change is atomic.
    fn with_catalog<R>(&mut self, f: impl FnOnce(&mut Catalog) -> DriverResult<R>) -> DriverResult<R> {
        match &mut self.tx {
            Some(tx) if tx.aborted => Err(rejected(
                "current transaction is aborted, commands ignored until end of transaction block",
            )),
            Some(tx) => {
                let mut working = tx.working.clone();
                match f(&mut working) {
                    Ok(value) => {
                        tx.working = working;
                        Ok(value)
                    }
                    Err(e) => {
                        tx.aborted = true;
                        Err(e)
                    }
                }
            }
            None => {
                let mut catalog = self.db.shared.catalog.lock();
                let mut working = catalog.clone();
                let value = f(&mut working)?;
                *catalog = working;
                Ok(value)
            }
        }
    }
}

impl Driver for MemoryDriver {
    async fn acquire_lock(&mut self, key: i64) -> DriverResult<()> {
        if self.locks.contains_key(&key) {
            return Ok(());
        }
        let guard = self.db.lock_handle(key).lock_owned().await;
        debug!(key, "advisory lock acquired");
        self.locks.insert(key, guard);
        Ok(())
    }

    async fn release_lock(&mut self, key: i64) -> DriverResult<()> {
        self.locks
            .remove(&key)
            .map(drop)
            .ok_or(DriverError::LockNotHeld(key))
    }

    async fn begin(&mut self) -> DriverResult<()> {
        if self.tx.is_some() {
            return Err(DriverError::TransactionOpen);
        }
        let working = self.db.shared.catalog.lock().clone();
        self.tx = Some(Transaction {
            working,
            aborted: false,
        });
        Ok(())
    }

    async fn commit(&mut self) -> DriverResult<()> {
        let tx = self.tx.take().ok_or(DriverError::NoTransaction)?;
        if tx.aborted {
            // An aborted transaction rolls back on COMMIT.
            return Ok(());
        }
        *self.db.shared.catalog.lock() = tx.working;
        Ok(())
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        self.tx.take().map(drop).ok_or(DriverError::NoTransaction)
    }

    async fn execute(&mut self, op: &SchemaOp) -> DriverResult<()> {
        debug!(%op, "execute");
        self.with_catalog(|catalog| catalog.apply(op))
    }

    async fn enum_labels(&mut self, type_name: &QualifiedName) -> DriverResult<Option<Vec<String>>> {
        self.with_catalog(|catalog| Ok(catalog.enum_type(type_name).map(|e| e.labels())))
    }

    async fn ledger_entries(&mut self, table: &QualifiedName) -> DriverResult<Vec<LedgerEntry>> {
        let rows = self.with_catalog(|catalog| Ok(catalog.rows_json(table)))?;
        let mut entries = rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| decode_entry(&row))
            .collect::<DriverResult<Vec<_>>>()?;
        entries.sort_by_key(|e| e.version);
        Ok(entries)
    }

    async fn append_ledger(&mut self, table: &QualifiedName, entry: &LedgerEntry) -> DriverResult<()> {
        let row = json!({
            "version": entry.version.to_string(),
            "name": entry.name,
            "batch": entry.batch,
            "applied_at": entry.applied_at.to_rfc3339(),
        });
        let row = as_object(row)?;
        self.with_catalog(|catalog| catalog.insert_row(table, &row))
    }

    async fn remove_ledger(&mut self, table: &QualifiedName, version: Version) -> DriverResult<()> {
        let key = Value::String(version.to_string());
        self.with_catalog(|catalog| catalog.delete_rows(table, "version", &key).map(|_| ()))
    }
}

fn decode_entry(row: &Map<String, Value>) -> DriverResult<LedgerEntry> {
    let text = |column: &str| {
        row.get(column)
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Ledger(format!("missing {}", column)))
    };
    let version = Version::parse(text("version")?).map_err(|e| DriverError::Ledger(e.to_string()))?;
    let applied_at = DateTime::parse_from_rfc3339(text("applied_at")?)
        .map_err(|e| DriverError::Ledger(e.to_string()))?
        .with_timezone(&Utc);
    let batch = row
        .get("batch")
        .and_then(Value::as_i64)
        .ok_or_else(|| DriverError::Ledger("missing batch".to_string()))?;
    Ok(LedgerEntry {
        version,
        name: text("name")?.to_string(),
        batch: batch as i32,
        applied_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ColumnDef, DataType, TableDef};

    fn notes() -> SchemaOp {
        SchemaOp::create_table(
            TableDef::new("public.note")
                .column(ColumnDef::id())
                .column(ColumnDef::new("body", DataType::Text)),
        )
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let db = MemoryDatabase::new();
        let mut session = db.connect();
        session.begin().await.unwrap();
        session.execute(&notes()).await.unwrap();
        session.rollback().await.unwrap();
        assert!(db.rows("public.note").is_none());

        session.begin().await.unwrap();
        session.execute(&notes()).await.unwrap();
        session.commit().await.unwrap();
        assert_eq!(db.rows("public.note").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_failed_statement_aborts_transaction() {
        let db = MemoryDatabase::new();
        let mut session = db.connect();
        session.begin().await.unwrap();
        session.execute(&notes()).await.unwrap();
        assert!(session.execute(&notes()).await.is_err());
        let err = session.execute(&SchemaOp::create_schema("x")).await.unwrap_err();
        assert!(err.to_string().contains("aborted"));
        session.rollback().await.unwrap();
        assert!(db.objects().tables.is_empty());
    }

    #[tokio::test]
    async fn test_uncommitted_work_is_private() {
        let db = MemoryDatabase::new();
        let mut writer = db.connect();
        let mut reader = db.connect();
        writer.begin().await.unwrap();
        writer
            .execute(&SchemaOp::create_enum("public.mood", ["OK"]))
            .await
            .unwrap();
        assert!(reader.enum_labels(&"public.mood".into()).await.unwrap().is_none());
        writer.commit().await.unwrap();
        assert_eq!(
            reader.enum_labels(&"public.mood".into()).await.unwrap(),
            Some(vec!["OK".to_string()])
        );
    }

    #[tokio::test]
    async fn test_release_unheld_lock() {
        let db = MemoryDatabase::new();
        let mut session = db.connect();
        assert!(matches!(
            session.release_lock(7).await,
            Err(DriverError::LockNotHeld(7))
        ));
        session.acquire_lock(7).await.unwrap();
        session.release_lock(7).await.unwrap();
    }
}
