//! Doc-chat component: document-scoped question answering.
//!
//! Chunks the target document into overlapping segments, ranks each
//! chunk against the query with the same scoring function retrieval
//! uses, and composes an extractive response over the selected chunks.
//! The single generation call of the turn still happens at the
//! orchestrator's `Generating` transition, over the merged evidence.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::agent::config::EngineConfig;
use crate::backend::lexical::lexical_similarity;
use crate::backend::store::DocumentStore;
use crate::chunk::chunk_text;
use crate::core::ranking::{
    candidate_order, combine_score, evidence_confidence, source_adjustment,
};
use crate::core::types::{AgentResponse, Candidate, DocumentId};
use crate::error::EngineError;

/// Leading characters of a selected chunk shown in the extractive reply.
const EXCERPT_LEN: usize = 240;

/// Agent that answers questions scoped to one document.
pub struct DocChatAgent {
    store: Arc<dyn DocumentStore>,
}

impl DocChatAgent {
    /// Creates the agent over the persistence collaborator.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Answers a query against a single document.
    ///
    /// Returns the component response plus the selected chunks as
    /// candidates for the merge step; the citations set names the
    /// document of every selected chunk.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidQuery`] for empty query text and
    /// [`EngineError::DocumentNotFound`] when the document id does not
    /// resolve.
    pub fn answer(
        &self,
        document_id: &DocumentId,
        query_text: &str,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<(AgentResponse, Vec<Candidate>), EngineError> {
        if query_text.trim().is_empty() {
            return Err(EngineError::InvalidQuery {
                message: "query text is empty".to_string(),
            });
        }

        let document = self
            .store
            .get_document(document_id)?
            .ok_or_else(|| EngineError::DocumentNotFound {
                document_id: document_id.clone(),
            })?;

        let adjustment = source_adjustment(&document.metadata, now, config.recency_half_life_days);
        let chunks = chunk_text(&document.text, config.chunk_size, config.chunk_overlap);
        debug!(
            document_id = %document_id,
            chunks = chunks.len(),
            "document chunked for scoring"
        );

        let mut candidates: Vec<Candidate> = chunks
            .into_iter()
            .enumerate()
            .filter_map(|(i, text)| {
                let similarity = lexical_similarity(query_text, &text);
                (similarity > 0.0).then(|| Candidate {
                    document_id: document_id.clone(),
                    chunk_id: u32::try_from(i).ok(),
                    relevance_score: combine_score(
                        similarity,
                        adjustment,
                        config.adjustment_weight,
                    ),
                    text,
                    source_metadata: document.metadata.clone(),
                })
            })
            .collect();

        candidates.sort_by(candidate_order);
        candidates.truncate(config.chunk_top_k);

        let response = if candidates.is_empty() {
            AgentResponse {
                text: format!(
                    "No passage in '{document_id}' appears relevant to the question."
                ),
                confidence: 0.0,
                citations: BTreeSet::new(),
                error: None,
            }
        } else {
            let citations: BTreeSet<DocumentId> =
                candidates.iter().map(|c| c.document_id.clone()).collect();
            AgentResponse {
                text: compose_extractive(&candidates),
                confidence: evidence_confidence(&candidates),
                citations,
                error: None,
            }
        };

        Ok((response, candidates))
    }
}

/// Composes a reply directly from the selected passages.
fn compose_extractive(candidates: &[Candidate]) -> String {
    let mut out = String::from("Relevant passages:\n");
    for candidate in candidates {
        let excerpt: String = candidate.text.chars().take(EXCERPT_LEN).collect();
        let ellipsis = if candidate.text.chars().count() > EXCERPT_LEN {
            "…"
        } else {
            ""
        };
        let _ = writeln!(out, "- {} — {}{}", candidate.document_id, excerpt.trim(), ellipsis);
    }
    out
}

impl std::fmt::Debug for DocChatAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocChatAgent").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::store::{Document, MemoryStore};
    use crate::core::types::SourceMetadata;

    fn agent_with(doc: Option<(&str, &str)>) -> DocChatAgent {
        let store = MemoryStore::new();
        if let Some((id, text)) = doc {
            store
                .put_document(
                    &Document {
                        id: DocumentId::new(id),
                        text: text.to_string(),
                        metadata: SourceMetadata::default(),
                    },
                    &[],
                )
                .unwrap_or_else(|_| unreachable!());
        }
        DocChatAgent::new(Arc::new(store))
    }

    fn config() -> EngineConfig {
        EngineConfig::builder()
            .chunk_size(12)
            .chunk_overlap(3)
            .chunk_top_k(3)
            .adjustment_weight(0.0)
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn test_unknown_document_fails_terminally() {
        let agent = agent_with(None);
        let result = agent.answer(
            &DocumentId::new("ghost"),
            "anything",
            &config(),
            Utc::now(),
        );
        assert!(matches!(
            result,
            Err(EngineError::DocumentNotFound { .. })
        ));
    }

    #[test]
    fn test_empty_query_is_invalid() {
        let agent = agent_with(Some(("doc", "text")));
        let result = agent.answer(&DocumentId::new("doc"), "  ", &config(), Utc::now());
        assert!(matches!(result, Err(EngineError::InvalidQuery { .. })));
    }

    #[test]
    fn test_selects_matching_chunks_with_citations() {
        let agent = agent_with(Some((
            "runbook",
            "restart the cache daily. unrelated filler text here. cache restart steps follow.",
        )));
        let (response, candidates) = agent
            .answer(
                &DocumentId::new("runbook"),
                "cache restart",
                &config(),
                Utc::now(),
            )
            .unwrap_or_else(|_| unreachable!());

        assert!(!candidates.is_empty());
        assert!(candidates.len() <= 3);
        assert!(response.confidence > 0.0);
        assert!(response.citations.contains(&DocumentId::new("runbook")));
        // Every candidate points back at the target document.
        for candidate in &candidates {
            assert_eq!(candidate.document_id.as_str(), "runbook");
            assert!(candidate.chunk_id.is_some());
        }
        // Ranked descending.
        for pair in candidates.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    #[test]
    fn test_no_match_returns_empty_answer_without_error() {
        let agent = agent_with(Some(("notes", "entirely unrelated content")));
        let (response, candidates) = agent
            .answer(
                &DocumentId::new("notes"),
                "quantum cryptography",
                &config(),
                Utc::now(),
            )
            .unwrap_or_else(|_| unreachable!());
        assert!(candidates.is_empty());
        assert!((response.confidence - 0.0).abs() < f32::EPSILON);
        assert!(response.citations.is_empty());
        assert!(response.text.contains("notes"));
    }
}
