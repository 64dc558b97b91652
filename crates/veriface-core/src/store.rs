//! Embedding persistence: one SQLite row per identity key.
//!
//! Vectors are stored as little-endian f32 blobs. Upserts preserve the
//! row's original rowid, so snapshot enumeration order is insertion
//! order and stays stable across re-enrollments — the matcher's
//! tie-breaking depends on that.
//!
//! Writes to the same identity key serialize on a per-key mutex;
//! writes to different keys only contend on the connection itself.
//! Snapshot reads do not wait on the per-key locks: a match may miss an
//! embedding enrolled a moment earlier, which is an accepted race.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::EngineError;
use crate::types::{EmbeddingSummary, FaceEmbedding};

pub struct EmbeddingStore {
    conn: Mutex<Connection>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EmbeddingStore {
    /// Open (and initialize) a file-backed store.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| EngineError::StoreUnavailable(err.to_string()))?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store (tests, ephemeral deployments).
    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, EngineError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS embeddings (
                identity_key TEXT PRIMARY KEY,
                vector       BLOB NOT NULL,
                dim          INTEGER NOT NULL,
                source_ref   TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, EngineError> {
        self.conn
            .lock()
            .map_err(|_| EngineError::StoreUnavailable("store lock poisoned".into()))
    }

    fn key_lock(&self, identity_key: &str) -> Result<Arc<Mutex<()>>, EngineError> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| EngineError::StoreUnavailable("key lock table poisoned".into()))?;
        Ok(locks
            .entry(identity_key.to_string())
            .or_default()
            .clone())
    }

    /// Insert or wholesale-replace the embedding for `identity_key`.
    ///
    /// Returns `true` when a prior record was overwritten.
    pub fn upsert(
        &self,
        identity_key: &str,
        vector: &[f32],
        source_ref: &str,
    ) -> Result<bool, EngineError> {
        let lock = self.key_lock(identity_key)?;
        let _guard = lock
            .lock()
            .map_err(|_| EngineError::StoreUnavailable("key lock poisoned".into()))?;

        let now = Utc::now();
        let blob = encode_vector(vector);

        let conn = self.conn()?;
        let existed: bool = conn
            .query_row(
                "SELECT 1 FROM embeddings WHERE identity_key = ?1",
                params![identity_key],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        // ON CONFLICT UPDATE keeps the original rowid and created_at.
        conn.execute(
            "INSERT INTO embeddings (identity_key, vector, dim, source_ref, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(identity_key) DO UPDATE SET
                 vector = excluded.vector,
                 dim = excluded.dim,
                 source_ref = excluded.source_ref,
                 updated_at = excluded.updated_at",
            params![
                identity_key,
                blob,
                vector.len() as i64,
                source_ref,
                now.to_rfc3339(),
            ],
        )?;

        Ok(existed)
    }

    /// Fetch one embedding by key.
    pub fn get(&self, identity_key: &str) -> Result<Option<FaceEmbedding>, EngineError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT identity_key, vector, dim, source_ref, created_at, updated_at
             FROM embeddings WHERE identity_key = ?1",
            params![identity_key],
            row_to_embedding,
        )
        .optional()?
        .map(validate_record)
        .transpose()
    }

    /// All embeddings in stable insertion (rowid) order.
    pub fn snapshot(&self) -> Result<Vec<FaceEmbedding>, EngineError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT identity_key, vector, dim, source_ref, created_at, updated_at
             FROM embeddings ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], row_to_embedding)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(validate_record(row?)?);
        }
        Ok(out)
    }

    /// Record summaries (no vector payloads), insertion order.
    pub fn list(&self) -> Result<Vec<EmbeddingSummary>, EngineError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT identity_key, dim, source_ref, created_at, updated_at
             FROM embeddings ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (identity_key, dim, source_ref, created_at, updated_at) = row?;
            out.push(EmbeddingSummary {
                identity_key,
                dim: dim as usize,
                source_ref,
                created_at: parse_timestamp(&created_at)?,
                updated_at: parse_timestamp(&updated_at)?,
            });
        }
        Ok(out)
    }

    /// Delete by key. Returns `true` when a record existed.
    ///
    /// Deletion policy (who may delete, when) belongs to the caller.
    pub fn remove(&self, identity_key: &str) -> Result<bool, EngineError> {
        let lock = self.key_lock(identity_key)?;
        let _guard = lock
            .lock()
            .map_err(|_| EngineError::StoreUnavailable("key lock poisoned".into()))?;

        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM embeddings WHERE identity_key = ?1",
            params![identity_key],
        )?;
        Ok(affected > 0)
    }
}

type RawRecord = (String, Vec<u8>, i64, String, String, String);

fn row_to_embedding(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn validate_record(raw: RawRecord) -> Result<FaceEmbedding, EngineError> {
    let (identity_key, blob, dim, source_ref, created_at, updated_at) = raw;
    let vector = decode_vector(&blob);
    if vector.len() != dim as usize {
        return Err(EngineError::StoreUnavailable(format!(
            "corrupt embedding record for '{identity_key}': blob holds {} floats, dim column says {dim}",
            vector.len()
        )));
    }
    Ok(FaceEmbedding {
        identity_key,
        vector,
        dim: dim as usize,
        source_ref,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| EngineError::StoreUnavailable(format!("corrupt timestamp '{value}': {err}")))
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
