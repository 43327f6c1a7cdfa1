//! PostgreSQL ledger backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{PgPool, Row};

use super::{ExecutionLedger, LedgerRecord};
use crate::error::{LedgerError, LedgerResult};

static TABLE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("table name pattern is valid")
});

/// Whether `name` can be interpolated into SQL as a table name
pub fn is_valid_table_name(name: &str) -> bool {
    TABLE_NAME.is_match(name)
}

/// Ledger stored in a PostgreSQL table
pub struct PostgresLedger {
    pool: PgPool,
    table: String,
}

impl PostgresLedger {
    /// Wrap an existing pool; call [`ensure_table`](Self::ensure_table)
    /// before first use
    pub fn new(pool: PgPool, table: impl Into<String>) -> LedgerResult<Self> {
        let table = table.into();
        if !is_valid_table_name(&table) {
            return Err(LedgerError::Backend(format!(
                "invalid ledger table name '{}'",
                table
            )));
        }
        Ok(Self { pool, table })
    }

    /// Connect to `database_url` and make sure the ledger table exists
    pub async fn connect(database_url: &str, table: impl Into<String>) -> LedgerResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        let ledger = Self::new(pool, table)?;
        ledger.ensure_table().await?;
        Ok(ledger)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the ledger table if it does not exist
    pub async fn ensure_table(&self) -> LedgerResult<()> {
        sqlx::query(&self.create_table_sql())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// SQL to create the ledger table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id VARCHAR(255) PRIMARY KEY,\n    \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP\n\
            );",
            self.table
        )
    }

    /// SQL to list records in creation order
    pub fn list_sql(&self) -> String {
        format!("SELECT id, applied_at FROM {} ORDER BY applied_at ASC, id ASC", self.table)
    }

    /// SQL to check whether a version is recorded
    pub fn exists_sql(&self) -> String {
        format!("SELECT id FROM {} WHERE id = $1", self.table)
    }

    /// SQL to record a version; a no-op if it is already recorded
    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (id, applied_at) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
            self.table
        )
    }

    /// SQL to remove a version's record
    pub fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE id = $1", self.table)
    }
}

#[async_trait]
impl ExecutionLedger for PostgresLedger {
    async fn records(&self) -> LedgerResult<Vec<LedgerRecord>> {
        let rows = sqlx::query(&self.list_sql()).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let version: String = row.try_get("id")?;
            let applied_at: DateTime<Utc> = row.try_get("applied_at")?;
            records.push(LedgerRecord { version, applied_at });
        }
        Ok(records)
    }

    async fn add(&self, version: &str) -> LedgerResult<bool> {
        let result = sqlx::query(&self.insert_sql())
            .bind(version)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, version: &str) -> LedgerResult<bool> {
        let result = sqlx::query(&self.delete_sql())
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn exists(&self, version: &str) -> LedgerResult<bool> {
        let row = sqlx::query(&self.exists_sql())
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
