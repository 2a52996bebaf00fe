//! Shared data model for the query pipeline.
//!
//! These types cross component boundaries: they are produced by the
//! retrieval/probing/doc-chat agents and consumed by the orchestrator's
//! merge and generation steps. They live in `core` so that backends and
//! agents can share them without depending on each other.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered, human-assigned document identifier.
///
/// Ordering matters: candidate ranking breaks score ties by ascending
/// document id to keep the merge order total and deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a document id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A user query, immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Unique id for this query.
    pub id: Uuid,
    /// The query text.
    pub text: String,
    /// Conversation this query belongs to.
    pub conversation_id: Uuid,
    /// When set, scopes the query to a single document.
    pub target_document_id: Option<DocumentId>,
}

impl Query {
    /// Creates a new query with a fresh id.
    #[must_use]
    pub fn new(
        conversation_id: Uuid,
        text: impl Into<String>,
        target_document_id: Option<DocumentId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            conversation_id,
            target_document_id,
        }
    }
}

/// The closed set of agent capabilities the orchestrator dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Vector-backed passage retrieval.
    Retrieval,
    /// Interactive feedback probing.
    Probing,
    /// Document-scoped chat.
    DocChat,
    /// Direct generation without evidence (conversational fast path).
    Chat,
}

impl CapabilityKind {
    /// Capability name for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retrieval => "retrieval",
            Self::Probing => "probing",
            Self::DocChat => "doc-chat",
            Self::Chat => "chat",
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal source fields the scoring function depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Human-readable source label (collection, path, URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Authority weight in `0.0..=1.0` assigned at ingest time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<f32>,
    /// Last content update, used for the recency adjustment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A scored piece of retrieved evidence.
///
/// Relevance scores are comparable only within one retrieval call; the
/// merge step never mixes scores across calls without re-sorting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Document the evidence comes from.
    pub document_id: DocumentId,
    /// Chunk within the document, when chunk-granular.
    pub chunk_id: Option<u32>,
    /// The passage text.
    pub text: String,
    /// Combined relevance in `0.0..=1.0`.
    pub relevance_score: f32,
    /// Provenance fields consumed by scoring and attribution.
    pub source_metadata: SourceMetadata,
}

/// Uniform output every component returns to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// The component's text output.
    pub text: String,
    /// Self-assessed confidence in `0.0..=1.0`.
    pub confidence: f32,
    /// Documents the response draws on.
    pub citations: BTreeSet<DocumentId>,
    /// Set when the component failed but a degraded answer was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    /// A response carrying only an error, with zero confidence.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            citations: BTreeSet::new(),
            error: Some(error.into()),
        }
    }
}

/// One question/answer exchange inside a probing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackNote {
    /// The follow-up question that was asked.
    pub question: String,
    /// The caller's answer.
    pub answer: String,
    /// Normalized signal extracted from the answer.
    pub extracted_signal: String,
}

/// Structured reduction of a probing session, consumed by the merge step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    /// The first (and usually dominant) signal of the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_issue: Option<String>,
    /// Every extracted signal, in session order.
    pub signals: Vec<String>,
    /// How many question rounds the session ran.
    pub rounds: usize,
}

impl FeedbackSummary {
    /// Whether the session produced any usable signal.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_ordering() {
        let a = DocumentId::new("alpha");
        let b = DocumentId::new("beta");
        assert!(a < b);
        assert_eq!(a.to_string(), "alpha");
    }

    #[test]
    fn test_document_id_serde_transparent() {
        let id = DocumentId::new("doc-1");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"doc-1\"");
    }

    #[test]
    fn test_query_immutable_fields() {
        let conversation = Uuid::new_v4();
        let query = Query::new(conversation, "what is the uptime SLA?", None);
        assert_eq!(query.conversation_id, conversation);
        assert!(query.target_document_id.is_none());
        assert!(!query.id.is_nil());
    }

    #[test]
    fn test_agent_response_failure() {
        let response = AgentResponse::failure("backend down");
        assert!(response.text.is_empty());
        assert!((response.confidence - 0.0).abs() < f32::EPSILON);
        assert_eq!(response.error.as_deref(), Some("backend down"));
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(CapabilityKind::DocChat.to_string(), "doc-chat");
        assert_eq!(CapabilityKind::Retrieval.to_string(), "retrieval");
    }
}
