//! PostgreSQL driver over a single `sqlx` connection.

use chrono::{DateTime, Utc};
use sqlx::{Connection, Executor, PgConnection, Row};
use tracing::debug;

use crate::ast::{QualifiedName, SchemaOp};
use crate::driver::{Driver, DriverError, DriverResult};
use crate::migrate::{LedgerEntry, Version};
use crate::transpiler::ToSql;

const ENUM_LABELS_SQL: &str = "SELECT e.enumlabel::text \
     FROM pg_catalog.pg_enum e \
     JOIN pg_catalog.pg_type t ON t.oid = e.enumtypid \
     JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace \
     WHERE n.nspname = $1 AND t.typname = $2 \
     ORDER BY e.enumsortorder";

/// PostgreSQL session.
pub struct PgDriver {
    conn: PgConnection,
}

impl PgDriver {
    /// Wrap an existing connection.
    pub fn new(conn: PgConnection) -> Self {
        Self { conn }
    }

    /// Connect with a `postgres://` URL.
    pub async fn connect(url: &str) -> DriverResult<Self> {
        let conn = PgConnection::connect(url).await?;
        Ok(Self::new(conn))
    }

    /// Execute raw SQL over the simple query protocol.
    pub async fn execute_raw(&mut self, sql: &str) -> DriverResult<u64> {
        debug!(sql, "execute");
        let result = (&mut self.conn).execute(sql).await?;
        Ok(result.rows_affected())
    }

    pub async fn close(self) -> DriverResult<()> {
        self.conn.close().await?;
        Ok(())
    }

    async fn table_exists(&mut self, table: &QualifiedName) -> DriverResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(table.resolved().quoted())
            .fetch_one(&mut self.conn)
            .await?;
        Ok(exists)
    }
}

impl Driver for PgDriver {
    async fn acquire_lock(&mut self, key: i64) -> DriverResult<()> {
        debug!(key, "pg_advisory_lock");
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(key)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn release_lock(&mut self, key: i64) -> DriverResult<()> {
        let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
            .bind(key)
            .fetch_one(&mut self.conn)
            .await?;
        if !released {
            return Err(DriverError::LockNotHeld(key));
        }
        Ok(())
    }

    async fn begin(&mut self) -> DriverResult<()> {
        self.execute_raw("BEGIN").await.map(|_| ())
    }

    async fn commit(&mut self) -> DriverResult<()> {
        self.execute_raw("COMMIT").await.map(|_| ())
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        self.execute_raw("ROLLBACK").await.map(|_| ())
    }

    async fn execute(&mut self, op: &SchemaOp) -> DriverResult<()> {
        self.execute_raw(&op.to_sql()).await.map(|_| ())
    }

    async fn enum_labels(&mut self, type_name: &QualifiedName) -> DriverResult<Option<Vec<String>>> {
        let labels: Vec<String> = sqlx::query_scalar(ENUM_LABELS_SQL)
            .bind(type_name.schema())
            .bind(&type_name.name)
            .fetch_all(&mut self.conn)
            .await?;
        Ok(if labels.is_empty() { None } else { Some(labels) })
    }

    async fn ledger_entries(&mut self, table: &QualifiedName) -> DriverResult<Vec<LedgerEntry>> {
        if !self.table_exists(table).await? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT version, name, batch, applied_at FROM {} ORDER BY version",
            table.resolved().quoted()
        );
        let rows = sqlx::query(&sql).fetch_all(&mut self.conn).await?;
        rows.iter()
            .map(|row| -> DriverResult<LedgerEntry> {
                let version: String = row.try_get("version")?;
                let version = Version::parse(&version)
                    .map_err(|e| DriverError::Ledger(e.to_string()))?;
                Ok(LedgerEntry {
                    version,
                    name: row.try_get("name")?,
                    batch: row.try_get("batch")?,
                    applied_at: row.try_get::<DateTime<Utc>, _>("applied_at")?,
                })
            })
            .collect()
    }

    async fn append_ledger(&mut self, table: &QualifiedName, entry: &LedgerEntry) -> DriverResult<()> {
        let sql = format!(
            "INSERT INTO {} (version, name, batch, applied_at) VALUES ($1, $2, $3, $4)",
            table.resolved().quoted()
        );
        debug!(version = %entry.version, batch = entry.batch, "ledger append");
        sqlx::query(&sql)
            .bind(entry.version.to_string())
            .bind(&entry.name)
            .bind(entry.batch)
            .bind(entry.applied_at)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn remove_ledger(&mut self, table: &QualifiedName, version: Version) -> DriverResult<()> {
        let sql = format!("DELETE FROM {} WHERE version = $1", table.resolved().quoted());
        debug!(%version, "ledger remove");
        sqlx::query(&sql)
            .bind(version.to_string())
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }
}
