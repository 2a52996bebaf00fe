//! Probing component: the interactive feedback sub-loop.
//!
//! Generates exactly one clarifying question per invocation — each
//! question depends on the previous answer, so batching is impossible.
//! Signal extraction and summarization are pure functions over the note
//! sequence; only question generation touches the generation backend.

use std::sync::Arc;

use crate::agent::prompt::{DEFAULT_PROBE_QUESTION, PROBING_INSTRUCTIONS, build_probe_context};
use crate::agent::state::Turn;
use crate::backend::generation::{GenerationBackend, SamplingParams};
use crate::core::types::{FeedbackNote, FeedbackSummary};
use crate::error::EngineError;

/// Sampling temperature for question generation.
const PROBE_TEMPERATURE: f32 = 0.7;
/// Token budget for a single question.
const PROBE_MAX_TOKENS: u32 = 256;
/// Extracted signals are capped at this many characters.
const MAX_SIGNAL_LEN: usize = 240;

/// Bare acknowledgments that carry no usable signal.
const EMPTY_SIGNALS: &[&str] = &["yes", "no", "ok", "okay", "idk", "n/a", "none", "not sure"];

/// Outcome of one probing invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStep {
    /// Ask the caller this follow-up question.
    Question(String),
    /// The component judges no further question would raise confidence.
    Done,
}

/// Agent that drives the clarifying-question loop.
pub struct ProbingAgent {
    generation: Arc<dyn GenerationBackend>,
}

impl ProbingAgent {
    /// Creates the agent over the generation backend.
    #[must_use]
    pub fn new(generation: Arc<dyn GenerationBackend>) -> Self {
        Self { generation }
    }

    /// Produces the next clarifying question, or [`ProbeStep::Done`]
    /// when the component judges the session complete. The orchestrator
    /// enforces its round cap independently of this judgment.
    ///
    /// An empty or unusable model reply falls back to a fixed question
    /// rather than failing the round.
    ///
    /// # Errors
    ///
    /// Propagates generation backend failures.
    pub async fn next_question(
        &self,
        history: &[Turn],
        notes: &[FeedbackNote],
    ) -> Result<ProbeStep, EngineError> {
        let context = build_probe_context(history, notes);
        let params = SamplingParams {
            temperature: PROBE_TEMPERATURE,
            max_tokens: PROBE_MAX_TOKENS,
        };
        let reply = self
            .generation
            .generate(&context, PROBING_INSTRUCTIONS, &params)
            .await?;

        let line = reply
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default();

        if line.eq_ignore_ascii_case("done") {
            return Ok(ProbeStep::Done);
        }
        if line.is_empty() {
            return Ok(ProbeStep::Question(DEFAULT_PROBE_QUESTION.to_string()));
        }
        Ok(ProbeStep::Question(line.to_string()))
    }

    /// Extracts the normalized signal from a caller's answer.
    ///
    /// Pure: collapses whitespace, drops bare acknowledgments, caps the
    /// length at a character boundary.
    #[must_use]
    pub fn extract_signal(answer: &str) -> String {
        let normalized = answer.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() || EMPTY_SIGNALS.contains(&normalized.to_lowercase().as_str()) {
            return String::new();
        }
        normalized.chars().take(MAX_SIGNAL_LEN).collect()
    }

    /// Reduces the note sequence into the structured summary consumed
    /// by the merge step. Pure.
    #[must_use]
    pub fn summarize(notes: &[FeedbackNote]) -> FeedbackSummary {
        let signals: Vec<String> = notes
            .iter()
            .filter(|n| !n.extracted_signal.is_empty())
            .map(|n| n.extracted_signal.clone())
            .collect();
        FeedbackSummary {
            main_issue: signals.first().cloned(),
            signals,
            rounds: notes.len(),
        }
    }
}

impl std::fmt::Debug for ProbingAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbingAgent")
            .field("generation", &self.generation.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use test_case::test_case;

    /// Generation backend returning a fixed reply.
    struct FixedReply(&'static str);

    #[async_trait]
    impl GenerationBackend for FixedReply {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn generate(
            &self,
            _context: &str,
            _instructions: &str,
            _params: &SamplingParams,
        ) -> Result<String, EngineError> {
            Ok(self.0.to_string())
        }
    }

    async fn step_for(reply: &'static str) -> ProbeStep {
        ProbingAgent::new(Arc::new(FixedReply(reply)))
            .next_question(&[], &[])
            .await
            .unwrap_or_else(|_| unreachable!())
    }

    #[tokio::test]
    async fn test_question_passthrough() {
        let step = step_for("Which release are you asking about?").await;
        assert_eq!(
            step,
            ProbeStep::Question("Which release are you asking about?".to_string())
        );
    }

    #[tokio::test]
    async fn test_done_sentinel() {
        assert_eq!(step_for("DONE").await, ProbeStep::Done);
        assert_eq!(step_for("done").await, ProbeStep::Done);
    }

    #[tokio::test]
    async fn test_blank_reply_falls_back() {
        let step = step_for("   \n  ").await;
        assert_eq!(
            step,
            ProbeStep::Question(DEFAULT_PROBE_QUESTION.to_string())
        );
    }

    #[tokio::test]
    async fn test_multiline_reply_takes_first_line() {
        let step = step_for("\nWhat timeframe matters?\nSome trailing chatter.").await;
        assert_eq!(step, ProbeStep::Question("What timeframe matters?".to_string()));
    }

    #[test_case("  the exact   dates " => "the exact dates"; "whitespace collapsed")]
    #[test_case("yes" => ""; "bare ack dropped")]
    #[test_case("OK" => ""; "case insensitive ack")]
    #[test_case("" => ""; "empty stays empty")]
    fn test_extract_signal(answer: &str) -> String {
        ProbingAgent::extract_signal(answer)
    }

    #[test]
    fn test_extract_signal_caps_length() {
        let long = "x".repeat(MAX_SIGNAL_LEN + 100);
        assert_eq!(ProbingAgent::extract_signal(&long).chars().count(), MAX_SIGNAL_LEN);
    }

    #[test]
    fn test_summarize_keeps_order_and_counts_rounds() {
        let notes = vec![
            FeedbackNote {
                question: "q1".to_string(),
                answer: "needs dates".to_string(),
                extracted_signal: "needs dates".to_string(),
            },
            FeedbackNote {
                question: "q2".to_string(),
                answer: "ok".to_string(),
                extracted_signal: String::new(),
            },
            FeedbackNote {
                question: "q3".to_string(),
                answer: "and versions".to_string(),
                extracted_signal: "and versions".to_string(),
            },
        ];
        let summary = ProbingAgent::summarize(&notes);
        assert_eq!(summary.rounds, 3);
        assert_eq!(summary.main_issue.as_deref(), Some("needs dates"));
        assert_eq!(summary.signals, vec!["needs dates", "and versions"]);
    }

    #[test]
    fn test_summarize_empty_session() {
        let summary = ProbingAgent::summarize(&[]);
        assert!(summary.is_empty());
        assert!(summary.main_issue.is_none());
    }
}
