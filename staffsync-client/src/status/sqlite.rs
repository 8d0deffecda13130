//! SQLite-backed status persistence
//!
//! One row per (attribute, entity). The value column holds the JSON encoding
//! of the status value so flags and labels share a table.

use super::persistence::StatusPersistence;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use staffsync_common::models::{StatusRecord, StatusSource, StatusValue};
use staffsync_common::{Error, Result};
use std::path::Path;
use tracing::info;

/// Status entries stored in a SQLite database
#[derive(Clone)]
pub struct SqliteStatusPersistence {
    pool: SqlitePool,
}

impl SqliteStatusPersistence {
    /// Open (creating if needed) the database at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Persistence(format!("{}: {}", parent.display(), e)))?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new status database: {}", db_path.display());
        } else {
            info!("Opened existing status database: {}", db_path.display());
        }

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the table if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        create_status_entries_table(&pool).await?;
        Ok(Self { pool })
    }
}

/// Create the status_entries table (idempotent)
pub async fn create_status_entries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS status_entries (
            attribute TEXT NOT NULL,
            entity TEXT NOT NULL,
            value TEXT NOT NULL,
            source TEXT NOT NULL CHECK (source IN ('manual', 'rule', 'default')),
            updated_by TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (attribute, entity)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait]
impl StatusPersistence for SqliteStatusPersistence {
    async fn load_all(&self, attribute: &str) -> Result<Vec<StatusRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT entity, value, source, updated_by
            FROM status_entries
            WHERE attribute = ?
            ORDER BY entity
            "#,
        )
        .bind(attribute)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<StatusRecord> {
                let entity: String = row.get("entity");
                let value_json: String = row.get("value");
                let source: String = row.get("source");
                let value: StatusValue = serde_json::from_str(&value_json).map_err(|e| {
                    Error::Persistence(format!("Corrupt value for {}: {}", entity, e))
                })?;
                let source: StatusSource = source
                    .parse()
                    .map_err(|e| Error::Persistence(format!("Corrupt source for {}: {}", entity, e)))?;
                Ok(StatusRecord {
                    entity,
                    value,
                    source,
                    updated_by: row.get("updated_by"),
                })
            })
            .collect()
    }

    async fn upsert(&self, attribute: &str, record: &StatusRecord) -> Result<()> {
        let value_json = serde_json::to_string(&record.value)
            .map_err(|e| Error::Persistence(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO status_entries (attribute, entity, value, source, updated_by, updated_at)
            VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT (attribute, entity) DO UPDATE SET
                value = excluded.value,
                source = excluded.source,
                updated_by = excluded.updated_by,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(attribute)
        .bind(&record.entity)
        .bind(value_json)
        .bind(record.source.as_str())
        .bind(&record.updated_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, attribute: &str, entity: &str) -> Result<()> {
        sqlx::query("DELETE FROM status_entries WHERE attribute = ? AND entity = ?")
            .bind(attribute)
            .bind(entity)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
