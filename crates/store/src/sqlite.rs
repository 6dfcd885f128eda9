//! SQLite-backed depot backend.
//!
//! Partitions are logical here: every ledger record carries its day key in
//! the `day` column, so "one partition" is one distinct value rather than one
//! table. `rowid` preserves append order inside a day.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::instrument;

use depot_core::{BackendError, ItemTag, LedgerRecord, MovementKind, PartitionKey, RecordId};

use crate::backend::{DepotBackend, StockRow};

/// SQLite depot backend.
///
/// All sqlx failures surface as [`BackendError::Unavailable`]; rows that no
/// longer decode (tag blobs, kinds, timestamps) surface as
/// [`BackendError::Corrupted`] and are never retried.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (or create) the depot database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(unavailable)?;
        Self::migrate(pool).await
    }

    /// Open a fresh in-memory database.
    ///
    /// Limited to one pooled connection: every connection to
    /// `sqlite::memory:` would otherwise get its own empty database.
    pub async fn open_in_memory() -> Result<Self, BackendError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(unavailable)?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, BackendError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stock (
                item   TEXT PRIMARY KEY,
                amount INTEGER NOT NULL,
                tag    TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(unavailable)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger (
                id          TEXT PRIMARY KEY,
                day         TEXT NOT NULL,
                kind        TEXT NOT NULL,
                item        TEXT NOT NULL,
                quantity    INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                source      TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(unavailable)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_ledger_day ON ledger(day)")
            .execute(&pool)
            .await
            .map_err(unavailable)?;

        Ok(Self { pool })
    }

    /// Close the underlying pool. Pending operations fail afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait::async_trait]
impl DepotBackend for SqliteBackend {
    async fn fetch_stock(&self, item: &str) -> Result<Option<StockRow>, BackendError> {
        let row = sqlx::query("SELECT amount, tag FROM stock WHERE item = ?1")
            .bind(item)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let amount: i64 = row.try_get("amount").map_err(unavailable)?;
        let tag = decode_tag(item, row.try_get("tag").map_err(unavailable)?)?;
        Ok(Some(StockRow {
            item: item.to_string(),
            amount,
            tag,
        }))
    }

    #[instrument(skip(self, record), fields(day = %partition), err)]
    async fn commit_movement(
        &self,
        item: &str,
        new_amount: i64,
        partition: PartitionKey,
        record: &LedgerRecord,
    ) -> Result<(), BackendError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        sqlx::query(
            r#"
            INSERT INTO stock (item, amount, tag)
            VALUES (?1, ?2, '{}')
            ON CONFLICT(item) DO UPDATE SET amount = excluded.amount
            "#,
        )
        .bind(item)
        .bind(new_amount)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        sqlx::query(
            r#"
            INSERT INTO ledger (id, day, kind, item, quantity, recorded_at, source)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(record.id.to_string())
        .bind(partition.to_string())
        .bind(record.kind.as_str())
        .bind(&record.item)
        .bind(record.quantity)
        .bind(record.recorded_at.to_rfc3339())
        .bind(&record.source)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)
    }

    #[instrument(skip(self), err)]
    async fn remove_if_zero(&self, item: &str) -> Result<bool, BackendError> {
        let result = sqlx::query("DELETE FROM stock WHERE item = ?1 AND amount = 0")
            .bind(item)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    async fn snapshot_stock(&self) -> Result<BTreeMap<String, i64>, BackendError> {
        let rows = sqlx::query("SELECT item, amount FROM stock ORDER BY item")
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        let mut snapshot = BTreeMap::new();
        for row in rows {
            let item: String = row.try_get("item").map_err(unavailable)?;
            let amount: i64 = row.try_get("amount").map_err(unavailable)?;
            snapshot.insert(item, amount);
        }
        Ok(snapshot)
    }

    async fn fetch_tag(&self, item: &str) -> Result<Option<ItemTag>, BackendError> {
        let row = sqlx::query("SELECT tag FROM stock WHERE item = ?1")
            .bind(item)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        match row {
            Some(row) => {
                let tag = decode_tag(item, row.try_get("tag").map_err(unavailable)?)?;
                Ok(Some(tag))
            }
            None => Ok(None),
        }
    }

    async fn store_tag(&self, item: &str, tag: &ItemTag) -> Result<bool, BackendError> {
        let encoded = serde_json::to_string(tag)
            .map_err(|e| BackendError::corrupted(format!("tag for '{item}' failed to encode: {e}")))?;
        let result = sqlx::query("UPDATE stock SET tag = ?2 WHERE item = ?1")
            .bind(item)
            .bind(encoded)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_if_absent(
        &self,
        item: &str,
        amount: i64,
        tag: &ItemTag,
    ) -> Result<bool, BackendError> {
        let encoded = serde_json::to_string(tag)
            .map_err(|e| BackendError::corrupted(format!("tag for '{item}' failed to encode: {e}")))?;
        let result = sqlx::query(
            "INSERT INTO stock (item, amount, tag) VALUES (?1, ?2, ?3) ON CONFLICT(item) DO NOTHING",
        )
        .bind(item)
        .bind(amount)
        .bind(encoded)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionKey>, BackendError> {
        let rows = sqlx::query("SELECT DISTINCT day FROM ledger ORDER BY day")
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        let mut partitions = Vec::with_capacity(rows.len());
        for row in rows {
            let day: String = row.try_get("day").map_err(unavailable)?;
            let key = day
                .parse::<PartitionKey>()
                .map_err(|e| BackendError::corrupted(format!("ledger day '{day}': {e}")))?;
            partitions.push(key);
        }
        Ok(partitions)
    }

    async fn records_for(
        &self,
        partition: PartitionKey,
    ) -> Result<Option<Vec<LedgerRecord>>, BackendError> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, item, quantity, recorded_at, source
            FROM ledger
            WHERE day = ?1
            ORDER BY rowid
            "#,
        )
        .bind(partition.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(decode_record(&row)?);
        }
        Ok(Some(records))
    }
}

fn unavailable(err: sqlx::Error) -> BackendError {
    BackendError::unavailable(err.to_string())
}

fn decode_tag(item: &str, raw: String) -> Result<ItemTag, BackendError> {
    serde_json::from_str(&raw)
        .map_err(|e| BackendError::corrupted(format!("tag for '{item}' failed to decode: {e}")))
}

fn decode_record(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerRecord, BackendError> {
    let id: String = row.try_get("id").map_err(unavailable)?;
    let kind: String = row.try_get("kind").map_err(unavailable)?;
    let item: String = row.try_get("item").map_err(unavailable)?;
    let quantity: i64 = row.try_get("quantity").map_err(unavailable)?;
    let recorded_at: String = row.try_get("recorded_at").map_err(unavailable)?;
    let source: String = row.try_get("source").map_err(unavailable)?;

    let id = id
        .parse::<uuid::Uuid>()
        .map(RecordId::from_uuid)
        .map_err(|e| BackendError::corrupted(format!("record id '{id}': {e}")))?;
    let kind = kind
        .parse::<MovementKind>()
        .map_err(|e| BackendError::corrupted(format!("record kind: {e}")))?;
    let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BackendError::corrupted(format!("record timestamp '{recorded_at}': {e}")))?;

    Ok(LedgerRecord {
        id,
        kind,
        item,
        quantity,
        recorded_at,
        source,
    })
}
