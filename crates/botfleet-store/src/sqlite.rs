// ABOUTME: SQLite persistence for bot configs.
// ABOUTME: One `bots` table keyed by id; params are stored as JSON text.

use async_trait::async_trait;
use botfleet_core::{ConfigStore, StoreError, WorkerConfig};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// Bot config store backed by SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl SqliteStore {
    /// Open or create the store at the given path
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("creating directory {}: {}", parent.display(), e))
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(backend)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.init_schema().await?;
        tracing::debug!(path = %path.display(), "Opened bot store");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bots (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL,
                params TEXT NOT NULL DEFAULT 'null',
                enabled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bots_created ON bots(created_at)")
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(())
    }
}

fn parse_time(id: &str, column: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("{column}: {e}"),
        })
}

fn config_from_row(row: &SqliteRow) -> Result<WorkerConfig, StoreError> {
    let id: String = row.get("id");
    let params: String = row.get("params");
    let params = serde_json::from_str(&params).map_err(|e| StoreError::Corrupt {
        id: id.clone(),
        reason: format!("params: {e}"),
    })?;
    let created_at = parse_time(&id, "created_at", &row.get::<String, _>("created_at"))?;
    let updated_at = parse_time(&id, "updated_at", &row.get::<String, _>("updated_at"))?;

    Ok(WorkerConfig {
        name: row.get("name"),
        kind: row.get("kind"),
        params,
        enabled: row.get::<i32, _>("enabled") != 0,
        created_at: Some(created_at),
        updated_at: Some(updated_at),
        id,
    })
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn list_all(&self) -> Result<Vec<WorkerConfig>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, kind, params, enabled, created_at, updated_at FROM bots ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(config_from_row).collect()
    }

    async fn get(&self, id: &str) -> Result<WorkerConfig, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, kind, params, enabled, created_at, updated_at FROM bots WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => config_from_row(&row),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn upsert(&self, config: &WorkerConfig) -> Result<(), StoreError> {
        let params = serde_json::to_string(&config.params).map_err(|e| StoreError::Corrupt {
            id: config.id.clone(),
            reason: format!("params: {e}"),
        })?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO bots (id, name, kind, params, enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                params = excluded.params,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&config.id)
        .bind(&config.name)
        .bind(&config.kind)
        .bind(&params)
        .bind(config.enabled)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM bots WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
