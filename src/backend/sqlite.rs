//! SQLite-backed document store.
//!
//! Persists documents, their ingest-time chunks, and recorded probing
//! feedback. The lexical index is rebuilt from this store at startup via
//! [`SqliteStore::index_into`]; the index itself is never persisted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::backend::feedback::{FeedbackRecord, FeedbackSink};
use crate::backend::lexical::LexicalIndex;
use crate::backend::store::{Document, DocumentStore, StoreStats};
use crate::core::types::{DocumentId, SourceMetadata};
use crate::error::EngineError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    source TEXT,
    authority REAL,
    updated_at TEXT
);
CREATE TABLE IF NOT EXISTS chunks (
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    PRIMARY KEY (document_id, chunk_id)
);
CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    query_text TEXT NOT NULL,
    summary TEXT NOT NULL,
    notes TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
";

/// SQLite reference implementation of [`DocumentStore`] and
/// [`FeedbackSink`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn storage_err(error: rusqlite::Error) -> EngineError {
    EngineError::Storage {
        message: error.to_string(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn row_metadata(
    source: Option<String>,
    authority: Option<f64>,
    updated_at: Option<String>,
) -> SourceMetadata {
    SourceMetadata {
        source,
        authority: authority.map(|a| a as f32),
        updated_at: updated_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

impl SqliteStore {
    /// Opens (and initializes) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] when the database cannot be
    /// opened or the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        Self::from_connection(Connection::open(path).map_err(storage_err)?)
    }

    /// Opens an in-memory store, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] when initialization fails.
    pub fn in_memory() -> Result<Self, EngineError> {
        Self::from_connection(Connection::open_in_memory().map_err(storage_err)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, EngineError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuilds a lexical index from every stored chunk. Documents that
    /// were ingested without chunks are indexed as one whole passage.
    ///
    /// Returns the number of indexed passages.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on query failure.
    pub fn index_into(&self, index: &LexicalIndex) -> Result<usize, EngineError> {
        let conn = self.conn();

        let mut metadata: HashMap<String, (SourceMetadata, String)> = HashMap::new();
        {
            let mut stmt = conn
                .prepare("SELECT id, text, source, authority, updated_at FROM documents")
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })
                .map_err(storage_err)?;
            for row in rows {
                let (id, text, source, authority, updated_at) = row.map_err(storage_err)?;
                metadata.insert(id, (row_metadata(source, authority, updated_at), text));
            }
        }

        let mut indexed = 0_usize;
        let mut chunked: HashMap<String, bool> = HashMap::new();
        {
            let mut stmt = conn
                .prepare(
                    "SELECT document_id, chunk_id, text FROM chunks \
                     ORDER BY document_id, chunk_id",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(storage_err)?;
            for row in rows {
                let (doc, chunk, text) = row.map_err(storage_err)?;
                let meta = metadata
                    .get(&doc)
                    .map(|(m, _)| m.clone())
                    .unwrap_or_default();
                let chunk_id = u32::try_from(chunk).ok();
                index.insert(DocumentId::new(doc.clone()), chunk_id, &text, meta);
                chunked.insert(doc, true);
                indexed += 1;
            }
        }

        for (id, (meta, text)) in &metadata {
            if !chunked.contains_key(id) {
                index.insert(DocumentId::new(id.clone()), None, text, meta.clone());
                indexed += 1;
            }
        }

        Ok(indexed)
    }
}

impl DocumentStore for SqliteStore {
    fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, EngineError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT text, source, authority, updated_at FROM documents WHERE id = ?1",
            params![id.as_str()],
            |row| {
                Ok(Document {
                    id: id.clone(),
                    text: row.get(0)?,
                    metadata: row_metadata(row.get(1)?, row.get(2)?, row.get(3)?),
                })
            },
        )
        .optional()
        .map_err(storage_err)
    }

    fn get_chunk_text(&self, id: &DocumentId, chunk_id: u32) -> Result<Option<String>, EngineError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT text FROM chunks WHERE document_id = ?1 AND chunk_id = ?2",
            params![id.as_str(), i64::from(chunk_id)],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn put_document(&self, document: &Document, chunks: &[String]) -> Result<(), EngineError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(storage_err)?;

        tx.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document.id.as_str()],
        )
        .map_err(storage_err)?;
        tx.execute(
            "INSERT OR REPLACE INTO documents (id, text, source, authority, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                document.id.as_str(),
                document.text,
                document.metadata.source,
                document.metadata.authority.map(f64::from),
                document.metadata.updated_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(storage_err)?;
        for (chunk_id, text) in chunks.iter().enumerate() {
            tx.execute(
                "INSERT INTO chunks (document_id, chunk_id, text) VALUES (?1, ?2, ?3)",
                params![document.id.as_str(), chunk_id as i64, text],
            )
            .map_err(storage_err)?;
        }

        tx.commit().map_err(storage_err)
    }

    fn delete_document(&self, id: &DocumentId) -> Result<bool, EngineError> {
        let conn = self.conn();
        let affected = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id.as_str()])
            .map_err(storage_err)?;
        Ok(affected > 0)
    }

    fn list_documents(&self) -> Result<Vec<DocumentId>, EngineError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id FROM documents ORDER BY id")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(storage_err)?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(DocumentId::new(row.map_err(storage_err)?));
        }
        Ok(ids)
    }

    fn stats(&self) -> Result<StoreStats, EngineError> {
        let conn = self.conn();
        let documents: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(storage_err)?;
        let chunks: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(storage_err)?;
        Ok(StoreStats {
            documents: usize::try_from(documents).unwrap_or(0),
            chunks: usize::try_from(chunks).unwrap_or(0),
        })
    }
}

impl FeedbackSink for SqliteStore {
    fn record(&self, record: &FeedbackRecord) -> Result<(), EngineError> {
        let summary = serde_json::to_string(&record.summary).map_err(|e| EngineError::Storage {
            message: format!("failed to encode feedback summary: {e}"),
        })?;
        let notes = serde_json::to_string(&record.notes).map_err(|e| EngineError::Storage {
            message: format!("failed to encode feedback notes: {e}"),
        })?;

        let conn = self.conn();
        conn.execute(
            "INSERT INTO feedback (conversation_id, query_text, summary, notes, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.conversation_id.to_string(),
                record.query_text,
                summary,
                notes,
                record.recorded_at.to_rfc3339(),
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FeedbackSummary;
    use uuid::Uuid;

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap_or_else(|_| unreachable!())
    }

    fn sample(id: &str) -> Document {
        Document {
            id: DocumentId::new(id),
            text: format!("full text of {id}"),
            metadata: SourceMetadata {
                source: Some("test".to_string()),
                authority: Some(0.8),
                updated_at: Some(Utc::now()),
            },
        }
    }

    #[test]
    fn test_roundtrip_document_and_chunks() {
        let store = store();
        let doc = sample("doc-1");
        store
            .put_document(&doc, &["alpha".to_string(), "beta".to_string()])
            .unwrap_or_else(|_| unreachable!());

        let fetched = store
            .get_document(&DocumentId::new("doc-1"))
            .unwrap_or_else(|_| unreachable!())
            .unwrap_or_else(|| unreachable!());
        assert_eq!(fetched.text, doc.text);
        assert_eq!(fetched.metadata.source.as_deref(), Some("test"));

        let chunk = store
            .get_chunk_text(&DocumentId::new("doc-1"), 1)
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(chunk.as_deref(), Some("beta"));
    }

    #[test]
    fn test_replace_document_replaces_chunks() {
        let store = store();
        let doc = sample("doc-1");
        store
            .put_document(&doc, &["old".to_string(), "chunks".to_string()])
            .unwrap_or_else(|_| unreachable!());
        store
            .put_document(&doc, &["new".to_string()])
            .unwrap_or_else(|_| unreachable!());

        let stats = store.stats().unwrap_or_else(|_| unreachable!());
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 1);
    }

    #[test]
    fn test_delete_cascades_to_chunks() {
        let store = store();
        store
            .put_document(&sample("doc-1"), &["a".to_string()])
            .unwrap_or_else(|_| unreachable!());
        assert!(store
            .delete_document(&DocumentId::new("doc-1"))
            .unwrap_or_else(|_| unreachable!()));
        let stats = store.stats().unwrap_or_else(|_| unreachable!());
        assert_eq!(stats.chunks, 0);
    }

    #[test]
    fn test_index_rebuild() {
        let store = store();
        store
            .put_document(&sample("doc-1"), &["release notes".to_string()])
            .unwrap_or_else(|_| unreachable!());
        store
            .put_document(&sample("doc-2"), &[])
            .unwrap_or_else(|_| unreachable!());

        let index = LexicalIndex::new();
        let indexed = store.index_into(&index).unwrap_or_else(|_| unreachable!());
        assert_eq!(indexed, 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_feedback_recorded() {
        let store = store();
        let record = FeedbackRecord {
            conversation_id: Uuid::new_v4(),
            query_text: "what changed in v2?".to_string(),
            summary: FeedbackSummary {
                main_issue: Some("answer lacked version numbers".to_string()),
                signals: vec!["answer lacked version numbers".to_string()],
                rounds: 1,
            },
            notes: Vec::new(),
            recorded_at: Utc::now(),
        };
        assert!(FeedbackSink::record(&store, &record).is_ok());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("store.db");
        {
            let store = SqliteStore::open(&path).unwrap_or_else(|_| unreachable!());
            store
                .put_document(&sample("doc-1"), &["persisted".to_string()])
                .unwrap_or_else(|_| unreachable!());
        }
        let reopened = SqliteStore::open(&path).unwrap_or_else(|_| unreachable!());
        let ids = reopened.list_documents().unwrap_or_else(|_| unreachable!());
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].as_str(), "doc-1");
    }
}
