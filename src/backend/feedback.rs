//! Feedback sink collaborator.
//!
//! When a probing session is summarized, the orchestrator hands the
//! structured summary to a sink so dissatisfaction signals reach
//! whoever improves the corpus. Sink failures are logged and never
//! surfaced to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::core::types::{FeedbackNote, FeedbackSummary};
use crate::error::EngineError;

/// A completed probing session ready for recording.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRecord {
    /// Conversation the session belonged to.
    pub conversation_id: Uuid,
    /// The query that triggered probing.
    pub query_text: String,
    /// Structured reduction of the session.
    pub summary: FeedbackSummary,
    /// The full note sequence, in session order.
    pub notes: Vec<FeedbackNote>,
    /// When the session was summarized.
    pub recorded_at: DateTime<Utc>,
}

/// Trait for feedback recording backends.
pub trait FeedbackSink: Send + Sync {
    /// Records one completed probing session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on backend failure.
    fn record(&self, record: &FeedbackRecord) -> Result<(), EngineError>;
}

/// Sink that emits feedback as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFeedbackSink;

impl FeedbackSink for LogFeedbackSink {
    fn record(&self, record: &FeedbackRecord) -> Result<(), EngineError> {
        info!(
            conversation_id = %record.conversation_id,
            query = %record.query_text,
            rounds = record.summary.rounds,
            main_issue = record.summary.main_issue.as_deref().unwrap_or("-"),
            "probing feedback recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sink_never_fails() {
        let sink = LogFeedbackSink;
        let record = FeedbackRecord {
            conversation_id: Uuid::new_v4(),
            query_text: "why is the build slow?".to_string(),
            summary: FeedbackSummary::default(),
            notes: Vec::new(),
            recorded_at: Utc::now(),
        };
        assert!(sink.record(&record).is_ok());
    }
}
