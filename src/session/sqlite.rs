use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::SessionStore;
use crate::config::DatabaseConfig;
use crate::error::{SessionError, SessionResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed session store; sessions survive process restarts.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `config.path`
    pub async fn new(config: &DatabaseConfig) -> SessionResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SessionError::Storage {
                    message: format!("Failed to create database directory: {}", e),
                })?;
            }
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| SessionError::Storage {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| SessionError::Storage {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// In-memory database for tests. A single connection keeps one shared database.
    pub async fn new_in_memory() -> SessionResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            SessionError::Storage {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| SessionError::Storage {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> SessionResult<()> {
        info!("Running session store migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| SessionError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Session store migrations completed successfully");
        Ok(())
    }
}

fn to_text(key: &str, value: &Value) -> SessionResult<String> {
    serde_json::to_string(value).map_err(|e| SessionError::Codec {
        key: key.to_string(),
        message: e.to_string(),
    })
}

const UPSERT_SLOT: &str = r#"
    INSERT INTO session_slots (session_id, key, value, updated_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(session_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
"#;

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get(&self, session_id: &str, key: &str) -> SessionResult<Value> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT value
            FROM session_slots
            WHERE session_id = ? AND key = ?
            "#,
        )
        .bind(session_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let (text,) = row.ok_or_else(|| SessionError::MissingKey {
            key: key.to_string(),
        })?;

        serde_json::from_str(&text).map_err(|e| SessionError::Codec {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    async fn set(&self, session_id: &str, key: &str, value: Value) -> SessionResult<()> {
        let text = to_text(key, &value)?;

        sqlx::query(UPSERT_SLOT)
            .bind(session_id)
            .bind(key)
            .bind(&text)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn has(&self, session_id: &str, key: &str) -> SessionResult<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM session_slots WHERE session_id = ? AND key = ?",
        )
        .bind(session_id)
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn set_many(
        &self,
        session_id: &str,
        entries: Vec<(String, Value)>,
    ) -> SessionResult<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for (key, value) in &entries {
            let text = to_text(key, value)?;
            sqlx::query(UPSERT_SLOT)
                .bind(session_id)
                .bind(key)
                .bind(&text)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, session_id: &str, key: &str) -> SessionResult<()> {
        sqlx::query("DELETE FROM session_slots WHERE session_id = ? AND key = ?")
            .bind(session_id)
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> SessionResult<()> {
        sqlx::query("DELETE FROM session_slots WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
