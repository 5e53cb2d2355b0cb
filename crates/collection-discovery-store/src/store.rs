use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use collection_discovery::{CatalogRecord, CatalogSink, SinkError};
use tracing::{debug, info};

use crate::schema;

/// A record as persisted, body kept as serialized JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub source_id: String,
    pub kind: String,
    pub name: String,
    pub body: String,
}

impl StoredRecord {
    pub fn json(&self) -> Result<serde_json::Value, StoreError> {
        serde_json::from_str(&self.body).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// One applied full reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub source_id: String,
    pub applied_at: DateTime<Utc>,
    pub record_count: usize,
}

/// A SQLite-backed catalog that implements `CatalogSink`.
///
/// Records are owned by the source id that submitted them: a full
/// reconciliation for one source never touches rows of another.
pub struct CatalogStore {
    conn: Mutex<rusqlite::Connection>,
}

impl CatalogStore {
    /// Open a store backed by a file on disk.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn =
            rusqlite::Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: rusqlite::Connection) -> Result<Self, StoreError> {
        schema::migrations()
            .to_latest(&mut conn)
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace records without touching anything else.
    pub fn upsert(&self, source_id: &str, records: &[CatalogRecord]) -> Result<(), StoreError> {
        let rows = serialize(records)?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        insert_rows(&tx, source_id, &rows, &now)?;
        tx.commit().map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(source_id, records = rows.len(), "upserted records");
        Ok(())
    }

    /// Make `records` the complete set held for `source_id`, atomically.
    pub fn replace(&self, source_id: &str, records: &[CatalogRecord]) -> Result<usize, StoreError> {
        let rows = serialize(records)?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let removed = tx
            .execute("DELETE FROM records WHERE source_id = ?1", [source_id])
            .map_err(|e| StoreError::Database(e.to_string()))?;
        insert_rows(&tx, source_id, &rows, &now)?;
        tx.execute(
            "INSERT INTO reconciliations (source_id, applied_at, record_count)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![source_id, now, rows.len() as i64],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tx.commit().map_err(|e| StoreError::Database(e.to_string()))?;

        info!(
            source_id,
            previous = removed,
            current = rows.len(),
            "applied full reconciliation"
        );
        Ok(rows.len())
    }

    /// Records held for `source_id`, ordered by kind then name.
    pub fn records(&self, source_id: &str) -> Result<Vec<StoredRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT source_id, kind, name, body
                 FROM records
                 WHERE source_id = ?1
                 ORDER BY kind, name",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let records = stmt
            .query_map([source_id], Self::row_to_record)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(records)
    }

    /// Number of records, for one source or across all of them.
    pub fn record_count(&self, source_id: Option<&str>) -> Result<usize, StoreError> {
        let conn = self.conn();
        let count: i64 = match source_id {
            Some(id) => conn.query_row(
                "SELECT COUNT(*) FROM records WHERE source_id = ?1",
                [id],
                |row| row.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0)),
        }
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(count as usize)
    }

    /// Source ids that currently own at least one record.
    pub fn source_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT DISTINCT source_id FROM records ORDER BY source_id")
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(ids)
    }

    pub fn last_reconciliation(&self, source_id: &str) -> Result<Option<Reconciliation>, StoreError> {
        let conn = self.conn();
        let row = conn.query_row(
            "SELECT source_id, applied_at, record_count
             FROM reconciliations
             WHERE source_id = ?1
             ORDER BY id DESC
             LIMIT 1",
            [source_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        );

        let (source_id, applied_at, record_count) = match row {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(StoreError::Database(e.to_string())),
        };

        let applied_at = DateTime::parse_from_rfc3339(&applied_at)
            .map_err(|e| StoreError::Serialization(format!("bad timestamp '{applied_at}': {e}")))?
            .with_timezone(&Utc);

        Ok(Some(Reconciliation {
            source_id,
            applied_at,
            record_count: record_count as usize,
        }))
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<StoredRecord> {
        Ok(StoredRecord {
            source_id: row.get(0)?,
            kind: row.get(1)?,
            name: row.get(2)?,
            body: row.get(3)?,
        })
    }
}

struct Row {
    kind: &'static str,
    name: String,
    body: String,
}

fn serialize(records: &[CatalogRecord]) -> Result<Vec<Row>, StoreError> {
    records
        .iter()
        .map(|record| {
            Ok(Row {
                kind: record.kind.as_str(),
                name: record.name().to_owned(),
                body: record
                    .to_json()
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            })
        })
        .collect()
}

fn insert_rows(
    tx: &rusqlite::Transaction<'_>,
    source_id: &str,
    rows: &[Row],
    now: &str,
) -> Result<(), StoreError> {
    let mut stmt = tx
        .prepare(
            "INSERT OR REPLACE INTO records (source_id, kind, name, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

    for row in rows {
        stmt.execute(rusqlite::params![source_id, row.kind, row.name, row.body, now])
            .map_err(|e| StoreError::Database(e.to_string()))?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl CatalogSink for CatalogStore {
    async fn apply_delta(&self, source_id: &str, added: &[CatalogRecord]) -> Result<(), SinkError> {
        self.upsert(source_id, added).map_err(SinkError::from)
    }

    async fn apply_full(
        &self,
        source_id: &str,
        entities: &[CatalogRecord],
    ) -> Result<(), SinkError> {
        self.replace(source_id, entities)
            .map(|_| ())
            .map_err(SinkError::from)
    }
}

/// Errors specific to store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for SinkError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Serialization(msg) => SinkError::Rejected(msg),
            other => SinkError::Unavailable(other.to_string()),
        }
    }
}
