//! Capability contract and query routing.
//!
//! Every component consumes a [`Query`] and produces an
//! [`AgentResponse`](crate::core::types::AgentResponse); which component
//! runs is decided by [`classify`], an explicit routing function over a
//! closed set of capabilities rather than polymorphic dispatch. The
//! classification is a pure function of the query and the conversation's
//! pending-probe flag, so identical history always routes identically.

pub use crate::core::types::CapabilityKind;
use crate::core::types::{DocumentId, Query};

/// Conversational openers answered without retrieval.
const SMALL_TALK: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "thanks",
    "thank you",
    "how are you",
    "who are you",
];

/// Dissatisfied reactions to a previous answer that request the
/// feedback loop.
const UNSATISFIED: &[&str] = &[
    "no",
    "wrong",
    "incorrect",
    "bad",
    "not helpful",
    "that's wrong",
    "not what i asked",
];

/// Where a query is routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Conversational fast path: single generation call, no evidence.
    SmallTalk,
    /// General knowledge query, served by retrieval.
    General,
    /// Scoped to one document, served by doc-chat.
    DocScoped(DocumentId),
    /// The caller is answering a pending probing question.
    FeedbackAnswer,
    /// The caller is dissatisfied with the previous answer and requests
    /// the feedback loop.
    FeedbackRequest,
}

/// Classifies a query.
///
/// Pure function of the query and the conversation's visible state:
/// `awaiting_feedback` is true when suspended on a probing question
/// (any input then resumes the loop), `has_history` gates the
/// dissatisfied-feedback route (there must be an answer to complain
/// about). A target document always wins over text heuristics.
#[must_use]
pub fn classify(query: &Query, awaiting_feedback: bool, has_history: bool) -> Route {
    if awaiting_feedback {
        return Route::FeedbackAnswer;
    }
    if has_history && is_unsatisfied(&query.text) {
        return Route::FeedbackRequest;
    }
    if let Some(document_id) = &query.target_document_id {
        return Route::DocScoped(document_id.clone());
    }
    if is_small_talk(&query.text) {
        return Route::SmallTalk;
    }
    Route::General
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(['!', '?', '.', ','])
        .to_lowercase()
}

/// Whether the text is a conversational opener rather than an
/// information need.
#[must_use]
pub fn is_small_talk(text: &str) -> bool {
    SMALL_TALK.contains(&normalize(text).as_str())
}

/// Whether the text rejects the previous answer.
#[must_use]
pub fn is_unsatisfied(text: &str) -> bool {
    UNSATISFIED.contains(&normalize(text).as_str())
}
