//! SQLite persistence via sqlx.
//!
//! Records are stored as JSON text in two tables keyed by client id. Each
//! `save_*` is a single upsert statement, so it either fully applies or
//! leaves the previous row in place.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use super::{Persistence, StorageError, StoredKeys};
use crate::Result;
use crate::identity::ClientId;
use crate::registry::AccessRecord;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS key_material (
    client_id TEXT PRIMARY KEY NOT NULL,
    record TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS access_records (
    client_id TEXT PRIMARY KEY NOT NULL,
    record TEXT NOT NULL
);
";

/// Extension trait converting sqlx errors into [`StorageError::SqlxError`]
/// with a context message.
trait SqlxResultExt<T> {
    fn sql_context(self, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            StorageError::SqlxError {
                reason: format!("{context}: {e}"),
                source: Some(e),
            }
            .into()
        })
    }
}

/// SQLite-backed [`Persistence`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) a database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .sql_context("Failed to open SQLite database")?;
        Self::init(pool).await
    }

    /// Open a private in-memory database.
    ///
    /// The pool is pinned to a single connection that is never recycled,
    /// since SQLite drops an in-memory database with its last connection.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .sql_context("Invalid SQLite URL")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .sql_context("Failed to open in-memory SQLite database")?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .sql_context("Failed to create schema")?;
        Ok(Self { pool })
    }

    async fn load_record<T: DeserializeOwned>(
        &self,
        table: &str,
        client_id: &ClientId,
    ) -> Result<Option<T>> {
        let sql = format!("SELECT record FROM {table} WHERE client_id = ?");
        let row = sqlx::query(&sql)
            .bind(client_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .sql_context("Failed to load record")?;
        match row {
            Some(row) => {
                let text: String = row.try_get("record").sql_context("Failed to read record")?;
                let record = serde_json::from_str(&text)
                    .map_err(|source| StorageError::DeserializationFailed { source })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn save_record<T: Serialize>(
        &self,
        table: &str,
        client_id: &ClientId,
        record: &T,
    ) -> Result<()> {
        let text = serde_json::to_string(record)
            .map_err(|source| StorageError::SerializationFailed { source })?;
        let sql = format!(
            "INSERT INTO {table} (client_id, record) VALUES (?, ?) \
             ON CONFLICT(client_id) DO UPDATE SET record = excluded.record"
        );
        sqlx::query(&sql)
            .bind(client_id.as_str())
            .bind(text)
            .execute(&self.pool)
            .await
            .sql_context("Failed to save record")?;
        Ok(())
    }
}

#[async_trait]
impl Persistence for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn load_keys(&self, client_id: &ClientId) -> Result<Option<StoredKeys>> {
        self.load_record("key_material", client_id).await
    }

    async fn save_keys(&self, record: &StoredKeys) -> Result<()> {
        self.save_record("key_material", &record.client_id, record)
            .await
    }

    async fn load_access(&self, client_id: &ClientId) -> Result<Option<AccessRecord>> {
        self.load_record("access_records", client_id).await
    }

    async fn save_access(&self, record: &AccessRecord) -> Result<()> {
        self.save_record("access_records", &record.client_id, record)
            .await
    }

    async fn delete(&self, client_id: &ClientId) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .sql_context("Failed to begin transaction")?;
        sqlx::query("DELETE FROM key_material WHERE client_id = ?")
            .bind(client_id.as_str())
            .execute(&mut *tx)
            .await
            .sql_context("Failed to delete key material")?;
        sqlx::query("DELETE FROM access_records WHERE client_id = ?")
            .bind(client_id.as_str())
            .execute(&mut *tx)
            .await
            .sql_context("Failed to delete access record")?;
        tx.commit().await.sql_context("Failed to commit delete")?;
        Ok(())
    }

    async fn client_ids(&self) -> Result<Vec<ClientId>> {
        let rows = sqlx::query(
            "SELECT client_id FROM key_material \
             UNION SELECT client_id FROM access_records \
             ORDER BY client_id",
        )
        .fetch_all(&self.pool)
        .await
        .sql_context("Failed to list clients")?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row
                .try_get("client_id")
                .sql_context("Failed to read client id")?;
            let id = ClientId::new(raw).map_err(|e| StorageError::Unavailable {
                reason: format!("Corrupt client id in database: {e}"),
            })?;
            ids.push(id);
        }
        Ok(ids)
    }
}
