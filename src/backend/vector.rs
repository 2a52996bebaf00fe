//! Nearest-neighbor search backend contract.
//!
//! The backend owns query embedding internally; the engine only sees
//! scored neighbors. Passage text is not part of the contract — the
//! retrieval component loads it through the persistence collaborator.

use async_trait::async_trait;

use crate::core::types::{DocumentId, SourceMetadata};
use crate::error::EngineError;

/// One scored match from the vector-search backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Document the match belongs to.
    pub document_id: DocumentId,
    /// Chunk within the document, when the index is chunk-granular.
    pub chunk_id: Option<u32>,
    /// Backend similarity in `0.0..=1.0`.
    pub similarity: f32,
    /// Source fields used by the scoring adjustment.
    pub metadata: SourceMetadata,
}

/// Trait for vector-similarity search backends.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Returns up to `k` nearest neighbors for the query text, ordered
    /// by descending similarity. Zero matches is an empty result, not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BackendUnavailable`] when the backend is
    /// unreachable.
    async fn nearest(&self, query_text: &str, k: usize) -> Result<Vec<Neighbor>, EngineError>;
}
