//! The record of applied units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ast::{ColumnDef, DataType, DefaultValue, QualifiedName, TableDef};
use crate::migrate::Version;

/// One applied unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub version: Version,
    pub name: String,
    pub batch: i32,
    pub applied_at: DateTime<Utc>,
}

/// Ledger table definition, bootstrapped from the AST like any other table.
pub fn ledger_table_def(name: &QualifiedName) -> TableDef {
    TableDef::new(name.clone())
        .if_not_exists()
        .column(ColumnDef::new("version", DataType::Varchar(32)).primary_key())
        .column(ColumnDef::new("name", DataType::Text).not_null())
        .column(ColumnDef::new("batch", DataType::Integer).not_null())
        .column(
            ColumnDef::new("applied_at", DataType::Timestamptz)
                .not_null()
                .default(DefaultValue::Now),
        )
}

/// Ledger contents, ordered by version.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new(mut entries: Vec<LedgerEntry>) -> Self {
        entries.sort_by_key(|e| e.version);
        Self { entries }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn get(&self, version: Version) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.version == version)
    }

    pub fn contains(&self, version: Version) -> bool {
        self.get(version).is_some()
    }

    pub fn latest_version(&self) -> Option<Version> {
        self.entries.last().map(|e| e.version)
    }

    pub fn latest_batch(&self) -> Option<i32> {
        self.entries.iter().map(|e| e.batch).max()
    }

    pub fn next_batch(&self) -> i32 {
        self.latest_batch().unwrap_or(0) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpiler::ToSql;

    fn entry(version: &str, batch: i32) -> LedgerEntry {
        LedgerEntry {
            version: Version::parse(version).unwrap(),
            name: "unit".into(),
            batch,
            applied_at: Utc::now(),
        }
    }

    #[test]
    fn test_batches() {
        let ledger = Ledger::new(vec![entry("20230301090500", 1), entry("20230301090000", 1)]);
        assert_eq!(ledger.latest_version(), Some(Version::parse("20230301090500").unwrap()));
        assert_eq!(ledger.next_batch(), 2);
        assert_eq!(Ledger::default().next_batch(), 1);
    }

    #[test]
    fn test_ledger_ddl() {
        let sql = ledger_table_def(&"_strata_migrations".into()).to_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"_strata_migrations\""));
        assert!(sql.contains("\"version\" VARCHAR(32) PRIMARY KEY"));
        assert!(sql.contains("\"applied_at\" TIMESTAMPTZ NOT NULL DEFAULT now()"));
    }
}
