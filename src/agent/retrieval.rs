//! Retrieval component.
//!
//! Oversamples the vector-search backend, loads passage text through the
//! persistence collaborator, applies the shared relevance scoring, and
//! returns a bounded ordered candidate set.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::agent::config::EngineConfig;
use crate::backend::store::DocumentStore;
use crate::backend::vector::VectorSearch;
use crate::core::ranking::{candidate_order, combine_score, source_adjustment};
use crate::core::types::Candidate;
use crate::error::EngineError;

/// Agent that turns a query into ranked supporting passages.
pub struct RetrievalAgent {
    vector: Arc<dyn VectorSearch>,
    store: Arc<dyn DocumentStore>,
}

impl RetrievalAgent {
    /// Creates the agent over its two collaborators.
    #[must_use]
    pub fn new(vector: Arc<dyn VectorSearch>, store: Arc<dyn DocumentStore>) -> Self {
        Self { vector, store }
    }

    /// Retrieves up to `k` candidates for the query text.
    ///
    /// The backend is asked for `k * oversample_factor` neighbors so
    /// that the recency/authority adjustment has room to reorder before
    /// truncation. Neighbors whose text cannot be loaded are skipped.
    /// Zero matches yields an empty set, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidQuery`] for empty query text and
    /// propagates backend failures.
    pub async fn retrieve(
        &self,
        query_text: &str,
        k: usize,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<Candidate>, EngineError> {
        if query_text.trim().is_empty() {
            return Err(EngineError::InvalidQuery {
                message: "query text is empty".to_string(),
            });
        }

        let fetch = k.saturating_mul(config.oversample_factor.max(1));
        let neighbors = self.vector.nearest(query_text, fetch).await?;
        debug!(
            backend = self.vector.name(),
            requested = fetch,
            returned = neighbors.len(),
            "vector search complete"
        );

        let mut load_failures = 0_usize;
        let mut candidates: Vec<Candidate> = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let text = match neighbor.chunk_id {
                Some(chunk_id) => self.store.get_chunk_text(&neighbor.document_id, chunk_id)?,
                None => self
                    .store
                    .get_document(&neighbor.document_id)?
                    .map(|d| d.text),
            };
            let Some(text) = text else {
                load_failures += 1;
                continue;
            };

            let adjustment =
                source_adjustment(&neighbor.metadata, now, config.recency_half_life_days);
            candidates.push(Candidate {
                relevance_score: combine_score(
                    neighbor.similarity,
                    adjustment,
                    config.adjustment_weight,
                ),
                document_id: neighbor.document_id,
                chunk_id: neighbor.chunk_id,
                text,
                source_metadata: neighbor.metadata,
            });
        }

        if load_failures > 0 {
            debug!(load_failures, "skipped neighbors without stored text");
        }

        candidates.sort_by(candidate_order);
        candidates.truncate(k);
        Ok(candidates)
    }
}

impl std::fmt::Debug for RetrievalAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalAgent")
            .field("vector", &self.vector.name())
            .finish_non_exhaustive()
    }
}
