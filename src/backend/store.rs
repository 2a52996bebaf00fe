//! Persistence collaborator contract and the in-memory reference store.
//!
//! The engine depends on a deliberately small surface: document lookup,
//! chunk text lookup, and the pass-through CRUD the caller-facing layer
//! exposes. Storage schema beyond these fields is an implementation
//! detail of each store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::core::types::{DocumentId, SourceMetadata};
use crate::error::EngineError;

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier.
    pub id: DocumentId,
    /// Full document text.
    pub text: String,
    /// Provenance fields used by scoring and attribution.
    #[serde(default)]
    pub metadata: SourceMetadata,
}

/// Counters surfaced by the stats pass-through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Number of stored documents.
    pub documents: usize,
    /// Number of stored chunks across all documents.
    pub chunks: usize,
}

/// Trait for the persistence collaborator.
///
/// Implementations must be safe to share across worker tasks; all
/// methods are synchronous because the reference stores are local.
pub trait DocumentStore: Send + Sync {
    /// Fetches a document by id, `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on backend failure.
    fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, EngineError>;

    /// Fetches the text of one ingested chunk, `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on backend failure.
    fn get_chunk_text(&self, id: &DocumentId, chunk_id: u32) -> Result<Option<String>, EngineError>;

    /// Stores a document together with its ingest-time chunks,
    /// replacing any previous version.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on backend failure.
    fn put_document(&self, document: &Document, chunks: &[String]) -> Result<(), EngineError>;

    /// Deletes a document and its chunks. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on backend failure.
    fn delete_document(&self, id: &DocumentId) -> Result<bool, EngineError>;

    /// Lists all document ids in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on backend failure.
    fn list_documents(&self) -> Result<Vec<DocumentId>, EngineError>;

    /// Returns document/chunk counters.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on backend failure.
    fn stats(&self) -> Result<StoreStats, EngineError>;
}

#[derive(Debug, Clone)]
struct StoredDocument {
    document: Document,
    chunks: Vec<String>,
}

/// In-memory reference store, used by tests and as a starting point for
/// embedding the engine without external storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<DocumentId, StoredDocument>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, EngineError> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        Ok(documents.get(id).map(|d| d.document.clone()))
    }

    fn get_chunk_text(&self, id: &DocumentId, chunk_id: u32) -> Result<Option<String>, EngineError> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        Ok(documents
            .get(id)
            .and_then(|d| d.chunks.get(chunk_id as usize).cloned()))
    }

    fn put_document(&self, document: &Document, chunks: &[String]) -> Result<(), EngineError> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        documents.insert(
            document.id.clone(),
            StoredDocument {
                document: document.clone(),
                chunks: chunks.to_vec(),
            },
        );
        Ok(())
    }

    fn delete_document(&self, id: &DocumentId) -> Result<bool, EngineError> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(documents.remove(id).is_some())
    }

    fn list_documents(&self) -> Result<Vec<DocumentId>, EngineError> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<DocumentId> = documents.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn stats(&self) -> Result<StoreStats, EngineError> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        Ok(StoreStats {
            documents: documents.len(),
            chunks: documents.values().map(|d| d.chunks.len()).sum(),
        })
    }
}
