//! In-process lexical nearest-neighbor index.
//!
//! The embedding-free reference implementation of [`VectorSearch`]:
//! hashed bag-of-words vectors compared by cosine similarity. No model
//! download, fully deterministic, and good enough for tests, small
//! corpora, and air-gapped deployments. Swap in a real embedding
//! backend behind the same trait for semantic quality.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

use crate::backend::vector::{Neighbor, VectorSearch};
use crate::core::types::{DocumentId, SourceMetadata};
use crate::error::EngineError;

/// A hashed term-frequency vector with its precomputed L2 norm.
#[derive(Debug, Clone)]
struct TermVector {
    terms: HashMap<u64, f32>,
    norm: f32,
}

impl TermVector {
    fn build(text: &str) -> Self {
        let mut terms: HashMap<u64, f32> = HashMap::new();
        for word in text.unicode_words() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            *terms.entry(hasher.finish()).or_insert(0.0) += 1.0;
        }
        let norm = terms.values().map(|v| v * v).sum::<f32>().sqrt();
        Self { terms, norm }
    }

    fn cosine(&self, other: &Self) -> f32 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }
        // Iterate the smaller map.
        let (small, large) = if self.terms.len() <= other.terms.len() {
            (&self.terms, &other.terms)
        } else {
            (&other.terms, &self.terms)
        };
        let dot: f32 = small
            .iter()
            .filter_map(|(term, count)| large.get(term).map(|c| c * count))
            .sum();
        (dot / (self.norm * other.norm)).clamp(0.0, 1.0)
    }
}

/// Term-overlap similarity between two texts in `0.0..=1.0`.
///
/// The same measure the index uses, exposed so that chunk selection in
/// doc-chat ranks with identical semantics.
#[must_use]
pub fn lexical_similarity(a: &str, b: &str) -> f32 {
    TermVector::build(a).cosine(&TermVector::build(b))
}

#[derive(Debug, Clone)]
struct IndexEntry {
    document_id: DocumentId,
    chunk_id: Option<u32>,
    vector: TermVector,
    metadata: SourceMetadata,
}

/// In-memory lexical index over ingested passages.
#[derive(Debug, Default)]
pub struct LexicalIndex {
    entries: RwLock<Vec<IndexEntry>>,
}

impl LexicalIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes one passage.
    pub fn insert(
        &self,
        document_id: DocumentId,
        chunk_id: Option<u32>,
        text: &str,
        metadata: SourceMetadata,
    ) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push(IndexEntry {
            document_id,
            chunk_id,
            vector: TermVector::build(text),
            metadata,
        });
    }

    /// Drops every passage of a document. Returns how many were removed.
    pub fn remove_document(&self, document_id: &DocumentId) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| &e.document_id != document_id);
        before - entries.len()
    }

    /// Number of indexed passages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the index holds no passages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorSearch for LexicalIndex {
    fn name(&self) -> &'static str {
        "lexical"
    }

    async fn nearest(&self, query_text: &str, k: usize) -> Result<Vec<Neighbor>, EngineError> {
        let query = TermVector::build(query_text);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        let mut matches: Vec<Neighbor> = entries
            .iter()
            .filter_map(|entry| {
                let similarity = entry.vector.cosine(&query);
                (similarity > 0.0).then(|| Neighbor {
                    document_id: entry.document_id.clone(),
                    chunk_id: entry.chunk_id,
                    similarity,
                    metadata: entry.metadata.clone(),
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        matches.truncate(k);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(entries: &[(&str, Option<u32>, &str)]) -> LexicalIndex {
        let index = LexicalIndex::new();
        for (doc, chunk, text) in entries {
            index.insert(
                DocumentId::new(*doc),
                *chunk,
                text,
                SourceMetadata::default(),
            );
        }
        index
    }

    #[test]
    fn test_similarity_identical_texts() {
        let sim = lexical_similarity("release pipeline status", "release pipeline status");
        assert!((sim - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similarity_disjoint_texts() {
        let sim = lexical_similarity("kernel scheduler", "marketing brochure");
        assert!((sim - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_similarity_is_case_insensitive() {
        let a = lexical_similarity("Release Pipeline", "release pipeline");
        assert!((a - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_nearest_orders_by_similarity() {
        let index = index_with(&[
            ("weather", Some(0), "rain and storms expected tomorrow"),
            ("sports", Some(0), "the match ended in a draw"),
            ("climate", Some(0), "storms and rain patterns over decades"),
        ]);
        let results = index
            .nearest("rain storms", 10)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(results.len(), 2);
        assert!(results[0].similarity >= results[1].similarity);
        for neighbor in &results {
            assert_ne!(neighbor.document_id.as_str(), "sports");
        }
    }

    #[tokio::test]
    async fn test_nearest_truncates_to_k() {
        let index = index_with(&[
            ("a", Some(0), "shared token"),
            ("b", Some(0), "shared token"),
            ("c", Some(0), "shared token"),
        ]);
        let results = index
            .nearest("shared", 2)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(results.len(), 2);
        // Equal similarity resolved by ascending document id.
        assert_eq!(results[0].document_id.as_str(), "a");
        assert_eq!(results[1].document_id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_nearest_empty_query_matches_nothing() {
        let index = index_with(&[("a", Some(0), "content")]);
        let results = index
            .nearest("", 5)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(results.is_empty());
    }

    #[test]
    fn test_remove_document() {
        let index = index_with(&[("a", Some(0), "one"), ("a", Some(1), "two"), ("b", None, "three")]);
        assert_eq!(index.remove_document(&DocumentId::new("a")), 2);
        assert_eq!(index.len(), 1);
    }
}
