//! Orchestrator for the conversational query pipeline.
//!
//! Owns the per-conversation state machine, routes queries to the
//! retrieval/probing/doc-chat components, applies retry and timeout
//! policy, merges evidence, and calls the generation backend once per
//! turn. Probing is a genuine suspension point: the orchestrator
//! persists the session and returns the pending question; a later call
//! carrying the same conversation id resumes the loop.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::agent::capability::{Route, classify};
use crate::agent::config::EngineConfig;
use crate::agent::doc_chat::DocChatAgent;
use crate::agent::gate::ConcurrencyGate;
use crate::agent::probing::{ProbeStep, ProbingAgent};
use crate::agent::prompt::{
    CHAT_INSTRUCTIONS, GENERATION_INSTRUCTIONS, build_chat_context, build_evidence_context,
};
use crate::agent::retrieval::RetrievalAgent;
use crate::agent::retry::RetryPolicy;
use crate::agent::state::{ConversationArena, ConversationState, Phase, ProbingSession, Turn};
use crate::backend::feedback::{FeedbackRecord, FeedbackSink};
use crate::backend::generation::{GenerationBackend, SamplingParams};
use crate::backend::store::DocumentStore;
use crate::backend::vector::VectorSearch;
use crate::core::ranking::{effective_confidence, evidence_confidence, merge_candidates};
use crate::core::types::{
    AgentResponse, Candidate, CapabilityKind, DocumentId, FeedbackNote, FeedbackSummary, Query,
};
use crate::error::EngineError;

/// Confidence reported for the conversational fast path.
const SMALL_TALK_CONFIDENCE: f32 = 0.9;
/// Sampling temperature for the conversational fast path.
const CHAT_TEMPERATURE: f32 = 0.7;
/// Degraded responses report this share of the evidence confidence.
const DEGRADED_CONFIDENCE_FACTOR: f32 = 0.5;
/// Leading characters of a passage shown in degraded responses.
const DEGRADED_EXCERPT_LEN: usize = 240;

/// One call into the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Conversation to run the query in.
    pub conversation_id: Uuid,
    /// The query text.
    pub query_text: String,
    /// When set, scopes the query to one document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_document_id: Option<DocumentId>,
    /// Answer to a pending probing question, when resuming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_to_pending_question: Option<String>,
}

impl QueryRequest {
    /// Creates a plain query request.
    #[must_use]
    pub fn new(conversation_id: Uuid, query_text: impl Into<String>) -> Self {
        Self {
            conversation_id,
            query_text: query_text.into(),
            target_document_id: None,
            answer_to_pending_question: None,
        }
    }

    /// Scopes the request to one document.
    #[must_use]
    pub fn with_document(mut self, document_id: DocumentId) -> Self {
        self.target_document_id = Some(document_id);
        self
    }

    /// Attaches the answer to a pending probing question.
    #[must_use]
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer_to_pending_question = Some(answer.into());
        self
    }
}

/// What the engine returns for one call.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    /// Final answer, degraded answer, or pending probing question.
    pub response_text: String,
    /// Documents the response draws on, in ascending id order.
    pub citations: Vec<DocumentId>,
    /// Confidence in `0.0..=1.0`.
    pub confidence: f32,
    /// Conversation phase after this call.
    pub phase: Phase,
    /// Set while the conversation is suspended on a probing question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<String>,
}

/// Coordinates the full query pipeline.
pub struct Orchestrator {
    generation: Arc<dyn GenerationBackend>,
    feedback: Arc<dyn FeedbackSink>,
    retrieval: RetrievalAgent,
    doc_chat: DocChatAgent,
    probing: ProbingAgent,
    arena: ConversationArena,
    gate: ConcurrencyGate,
    retry: RetryPolicy,
    config: EngineConfig,
}

impl Orchestrator {
    /// Creates an orchestrator over its collaborators.
    #[must_use]
    pub fn new(
        generation: Arc<dyn GenerationBackend>,
        vector: Arc<dyn VectorSearch>,
        store: Arc<dyn DocumentStore>,
        feedback: Arc<dyn FeedbackSink>,
        config: EngineConfig,
    ) -> Self {
        let gate = ConcurrencyGate::new(config.gate_permits, config.gate_queue_timeout);
        let retry = RetryPolicy::from_config(&config);
        Self {
            retrieval: RetrievalAgent::new(vector, Arc::clone(&store)),
            doc_chat: DocChatAgent::new(store),
            probing: ProbingAgent::new(Arc::clone(&generation)),
            generation,
            feedback,
            arena: ConversationArena::new(),
            gate,
            retry,
            config,
        }
    }

    /// Handles one call: a fresh query, or an answer resuming a
    /// suspended probing loop.
    ///
    /// Work on one conversation is serialized; different conversations
    /// run in parallel.
    ///
    /// # Errors
    ///
    /// Terminal failures ([`EngineError::InvalidQuery`],
    /// [`EngineError::DocumentNotFound`], exhausted retries with no
    /// evidence, [`EngineError::Overloaded`]) surface here. Transient
    /// failures with gathered evidence yield an `Ok` degraded outcome
    /// instead.
    pub async fn handle(&self, request: QueryRequest) -> Result<QueryOutcome, EngineError> {
        let slot = self.arena.checkout(request.conversation_id).await;
        let mut state = slot.lock().await;
        state.touch();

        match self.run_turn(&mut state, &request).await {
            Err(err) => {
                if matches!(err, EngineError::InternalInconsistency { .. }) {
                    error!(
                        conversation_id = %state.conversation_id,
                        error = %err,
                        "state machine invariant violated, resetting conversation"
                    );
                    state.reset_to_init();
                }
                Err(err)
            }
            ok => ok,
        }
    }

    /// Discards a conversation's state. Safe between suspension points;
    /// other conversations are unaffected.
    pub async fn cancel(&self, conversation_id: Uuid) -> bool {
        self.arena.cancel(conversation_id).await
    }

    /// Evicts conversations idle beyond the configured timeout.
    /// Returns how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        self.arena.evict_idle(self.config.idle_timeout).await
    }

    /// Number of live conversations.
    pub async fn active_conversations(&self) -> usize {
        self.arena.len().await
    }

    /// Snapshot of a conversation's turn history, oldest first.
    pub async fn history(&self, conversation_id: Uuid) -> Vec<Turn> {
        match self.arena.get(conversation_id).await {
            Some(slot) => slot.lock().await.history.clone(),
            None => Vec::new(),
        }
    }

    /// Current phase of a conversation, if it exists.
    pub async fn phase(&self, conversation_id: Uuid) -> Option<Phase> {
        match self.arena.get(conversation_id).await {
            Some(slot) => Some(slot.lock().await.phase),
            None => None,
        }
    }

    async fn run_turn(
        &self,
        state: &mut ConversationState,
        request: &QueryRequest,
    ) -> Result<QueryOutcome, EngineError> {
        match state.phase {
            Phase::Init | Phase::Error => state.transition(Phase::Routing)?,
            Phase::Routing | Phase::Probing => {}
            other => {
                return Err(EngineError::InternalInconsistency {
                    message: format!("conversation entered with in-flight phase {other}"),
                });
            }
        }

        let query = Query::new(
            request.conversation_id,
            request.query_text.clone(),
            request.target_document_id.clone(),
        );
        let route = classify(&query, state.probing.is_some(), !state.history.is_empty());
        debug!(conversation_id = %state.conversation_id, route = ?route, "query routed");

        match route {
            Route::FeedbackAnswer => {
                let answer = request
                    .answer_to_pending_question
                    .clone()
                    .or_else(|| {
                        let text = request.query_text.trim();
                        (!text.is_empty()).then(|| request.query_text.clone())
                    })
                    .ok_or_else(|| EngineError::InvalidQuery {
                        message: "a probing question is pending; provide an answer".to_string(),
                    })?;
                self.resume_probing(state, answer).await
            }
            Route::FeedbackRequest => self.feedback_request_turn(state, query).await,
            Route::SmallTalk => self.small_talk_turn(state, query).await,
            Route::General => self.retrieval_turn(state, query).await,
            Route::DocScoped(document_id) => self.doc_chat_turn(state, query, document_id).await,
        }
    }

    /// Starts a probing session because the caller rejected the
    /// previous answer. The session refines the previous turn's query;
    /// its summary feeds both the feedback sink and the regenerated
    /// answer.
    async fn feedback_request_turn(
        &self,
        state: &mut ConversationState,
        query: Query,
    ) -> Result<QueryOutcome, EngineError> {
        state.transition(Phase::Probing)?;
        let refined = state
            .history
            .last()
            .map_or_else(|| query.clone(), |turn| turn.query.clone());

        if self.config.max_probe_rounds == 0 {
            return self
                .generate_final(state, refined, CapabilityKind::Probing, Vec::new(), None, 0.0)
                .await;
        }

        match self.ask_probe(state, &[]).await {
            Ok(ProbeStep::Question(question)) => {
                let outcome = QueryOutcome {
                    response_text: question.clone(),
                    citations: Vec::new(),
                    confidence: 0.0,
                    phase: Phase::Probing,
                    pending_question: Some(question.clone()),
                };
                state.probing = Some(ProbingSession {
                    origin: CapabilityKind::Probing,
                    query: refined,
                    base_confidence: 0.0,
                    candidates: Vec::new(),
                    pending_question: question,
                    notes: Vec::new(),
                    rounds: 1,
                });
                Ok(outcome)
            }
            Ok(ProbeStep::Done) => {
                self.generate_final(state, refined, CapabilityKind::Probing, Vec::new(), None, 0.0)
                    .await
            }
            Err(err) => self.fail_turn(state, query, CapabilityKind::Probing, err),
        }
    }

    async fn retrieval_turn(
        &self,
        state: &mut ConversationState,
        query: Query,
    ) -> Result<QueryOutcome, EngineError> {
        state.transition(Phase::Retrieving)?;
        let now = Utc::now();

        let gathered = self
            .call_with_recovery(state, Phase::Retrieving, || {
                let text = query.text.clone();
                async move {
                    self.gate
                        .run("retrieve", self.config.call_timeout, async {
                            self.retrieval
                                .retrieve(&text, self.config.retrieval_k, &self.config, now)
                                .await
                        })
                        .await
                }
            })
            .await;

        match gathered {
            Ok(candidates) => {
                self.after_evidence(state, query, CapabilityKind::Retrieval, candidates)
                    .await
            }
            Err(err) => self.fail_turn(state, query, CapabilityKind::Retrieval, err),
        }
    }

    async fn doc_chat_turn(
        &self,
        state: &mut ConversationState,
        query: Query,
        document_id: DocumentId,
    ) -> Result<QueryOutcome, EngineError> {
        state.transition(Phase::Retrieving)?;
        let now = Utc::now();

        let answered = self
            .call_with_recovery(state, Phase::Retrieving, || {
                let document_id = document_id.clone();
                let text = query.text.clone();
                async move { self.doc_chat.answer(&document_id, &text, &self.config, now) }
            })
            .await;

        match answered {
            Ok((component_response, candidates)) => {
                debug!(
                    document_id = %document_id,
                    component_confidence = component_response.confidence,
                    selected = candidates.len(),
                    "doc-chat selection complete"
                );
                self.after_evidence(state, query, CapabilityKind::DocChat, candidates)
                    .await
            }
            Err(err) => self.fail_turn(state, query, CapabilityKind::DocChat, err),
        }
    }

    async fn small_talk_turn(
        &self,
        state: &mut ConversationState,
        query: Query,
    ) -> Result<QueryOutcome, EngineError> {
        state.transition(Phase::Generating)?;
        let context = build_chat_context(&query.text, &state.history);
        let params = SamplingParams {
            temperature: CHAT_TEMPERATURE,
            max_tokens: self.config.max_tokens,
        };

        let generated = self
            .call_with_recovery(state, Phase::Generating, || {
                let context = context.clone();
                async move {
                    self.gate
                        .run("generate", self.config.call_timeout, async {
                            self.generation
                                .generate(&context, CHAT_INSTRUCTIONS, &params)
                                .await
                        })
                        .await
                }
            })
            .await;

        match generated {
            Ok(text) => self.finish_turn(
                state,
                query,
                CapabilityKind::Chat,
                AgentResponse {
                    text,
                    confidence: SMALL_TALK_CONFIDENCE,
                    citations: BTreeSet::new(),
                    error: None,
                },
            ),
            Err(err) => self.fail_turn(state, query, CapabilityKind::Chat, err),
        }
    }

    /// Decides, from gathered evidence, whether to probe or generate.
    async fn after_evidence(
        &self,
        state: &mut ConversationState,
        query: Query,
        used: CapabilityKind,
        candidates: Vec<Candidate>,
    ) -> Result<QueryOutcome, EngineError> {
        let confidence = evidence_confidence(&candidates);
        debug!(
            conversation_id = %state.conversation_id,
            agent = %used,
            confidence,
            gathered = candidates.len(),
            "evidence gathered"
        );

        if confidence < self.config.confidence_threshold && self.config.max_probe_rounds > 0 {
            state.transition(Phase::Probing)?;
            match self.ask_probe(state, &[]).await {
                Ok(ProbeStep::Question(question)) => {
                    let outcome = QueryOutcome {
                        response_text: question.clone(),
                        citations: Vec::new(),
                        confidence,
                        phase: Phase::Probing,
                        pending_question: Some(question.clone()),
                    };
                    state.probing = Some(ProbingSession {
                        origin: used,
                        query,
                        base_confidence: confidence,
                        candidates,
                        pending_question: question,
                        notes: Vec::new(),
                        rounds: 1,
                    });
                    return Ok(outcome);
                }
                Ok(ProbeStep::Done) => {
                    debug!("probing component declined, proceeding to generation");
                }
                Err(err) => {
                    // Partial success: probing is optional enrichment.
                    warn!(error = %err, "probing unavailable, generating from gathered evidence");
                }
            }
        }

        self.generate_final(state, query, used, candidates, None, confidence)
            .await
    }

    /// Resumes a suspended probing loop with the caller's answer.
    async fn resume_probing(
        &self,
        state: &mut ConversationState,
        answer: String,
    ) -> Result<QueryOutcome, EngineError> {
        if state.phase != Phase::Probing {
            return Err(EngineError::InternalInconsistency {
                message: format!("probing session stored in phase {}", state.phase),
            });
        }
        let mut session = state
            .probing
            .take()
            .ok_or_else(|| EngineError::InternalInconsistency {
                message: "probing phase without a stored session".to_string(),
            })?;

        let extracted_signal = ProbingAgent::extract_signal(&answer);
        session.notes.push(FeedbackNote {
            question: session.pending_question.clone(),
            answer,
            extracted_signal,
        });

        let confidence = effective_confidence(
            session.base_confidence,
            &session.notes,
            self.config.note_confidence_uplift,
        );
        debug!(
            conversation_id = %state.conversation_id,
            rounds = session.rounds,
            confidence,
            "probing answer recorded"
        );

        // The round cap is enforced here regardless of what the probing
        // component would report.
        if confidence < self.config.confidence_threshold
            && session.rounds < self.config.max_probe_rounds
        {
            match self.ask_probe(state, &session.notes).await {
                Ok(ProbeStep::Question(question)) => {
                    state.transition(Phase::Probing)?;
                    session.pending_question = question.clone();
                    session.rounds += 1;
                    let outcome = QueryOutcome {
                        response_text: question.clone(),
                        citations: Vec::new(),
                        confidence,
                        phase: Phase::Probing,
                        pending_question: Some(question),
                    };
                    state.probing = Some(session);
                    return Ok(outcome);
                }
                Ok(ProbeStep::Done) => {
                    debug!("probing component reported done");
                }
                Err(err) => {
                    warn!(error = %err, "probing failed, summarizing collected notes");
                }
            }
        }

        let summary = ProbingAgent::summarize(&session.notes);
        self.record_feedback(&session, &summary);
        let ProbingSession {
            origin,
            query,
            candidates,
            ..
        } = session;
        self.generate_final(state, query, origin, candidates, Some(summary), confidence)
            .await
    }

    /// Merges evidence, calls the generation backend once, and closes
    /// the turn.
    async fn generate_final(
        &self,
        state: &mut ConversationState,
        query: Query,
        used: CapabilityKind,
        candidates: Vec<Candidate>,
        summary: Option<FeedbackSummary>,
        confidence: f32,
    ) -> Result<QueryOutcome, EngineError> {
        state.transition(Phase::Generating)?;
        let merged = merge_candidates(candidates, self.config.merge_top_k);
        let context = build_evidence_context(&query.text, &merged, summary.as_ref());
        let params = SamplingParams {
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let generated = self
            .call_with_recovery(state, Phase::Generating, || {
                let context = context.clone();
                async move {
                    self.gate
                        .run("generate", self.config.call_timeout, async {
                            self.generation
                                .generate(&context, GENERATION_INSTRUCTIONS, &params)
                                .await
                        })
                        .await
                }
            })
            .await;

        let citations: BTreeSet<DocumentId> =
            merged.iter().map(|c| c.document_id.clone()).collect();

        match generated {
            Ok(text) => self.finish_turn(
                state,
                query,
                used,
                AgentResponse {
                    text,
                    confidence,
                    citations,
                    error: None,
                },
            ),
            Err(err)
                if merged.is_empty()
                    || err.is_terminal()
                    || matches!(err, EngineError::Overloaded { .. }) =>
            {
                self.fail_turn(state, query, used, err)
            }
            Err(err) => {
                // Degraded: best-effort answer straight from the evidence.
                warn!(error = %err, "generation failed, returning degraded evidence summary");
                state.last_error = Some(err.to_string());
                state.probing = None;
                state.transition(Phase::Error)?;
                let response = AgentResponse {
                    text: compose_degraded(&merged),
                    confidence: confidence * DEGRADED_CONFIDENCE_FACTOR,
                    citations,
                    error: Some(err.to_string()),
                };
                let outcome = QueryOutcome {
                    response_text: response.text.clone(),
                    citations: response.citations.iter().cloned().collect(),
                    confidence: response.confidence,
                    phase: Phase::Error,
                    pending_question: None,
                };
                state.append_turn(Turn {
                    query,
                    agent_used: used,
                    response,
                    score: None,
                    timestamp: Utc::now(),
                });
                Ok(outcome)
            }
        }
    }

    /// Appends the turn and returns the conversation to `Routing`.
    fn finish_turn(
        &self,
        state: &mut ConversationState,
        query: Query,
        used: CapabilityKind,
        response: AgentResponse,
    ) -> Result<QueryOutcome, EngineError> {
        state.transition(Phase::Done)?;
        let outcome = QueryOutcome {
            response_text: response.text.clone(),
            citations: response.citations.iter().cloned().collect(),
            confidence: response.confidence,
            phase: Phase::Done,
            pending_question: None,
        };
        let score = Some(response.confidence);
        state.append_turn(Turn {
            query,
            agent_used: used,
            response,
            score,
            timestamp: Utc::now(),
        });
        state.last_error = None;
        // The conversation persists: ready for the next query.
        state.transition(Phase::Routing)?;
        Ok(outcome)
    }

    /// Records a terminal failure and surfaces it.
    fn fail_turn(
        &self,
        state: &mut ConversationState,
        query: Query,
        used: CapabilityKind,
        err: EngineError,
    ) -> Result<QueryOutcome, EngineError> {
        state.last_error = Some(err.to_string());
        state.probing = None;
        state.transition(Phase::Error)?;
        if !matches!(err, EngineError::InvalidQuery { .. }) {
            state.append_turn(Turn {
                query,
                agent_used: used,
                response: AgentResponse::failure(err.to_string()),
                score: None,
                timestamp: Utc::now(),
            });
        }
        Err(err)
    }

    /// Asks the probing component for the next question under gate,
    /// timeout, and retry policy.
    async fn ask_probe(
        &self,
        state: &mut ConversationState,
        notes: &[FeedbackNote],
    ) -> Result<ProbeStep, EngineError> {
        let history = state.history.clone();
        let notes = notes.to_vec();
        self.call_with_recovery(state, Phase::Probing, || {
            let history = history.clone();
            let notes = notes.clone();
            async move {
                self.gate
                    .run("probe", self.config.call_timeout, async {
                        self.probing.next_question(&history, &notes).await
                    })
                    .await
            }
        })
        .await
    }

    /// Hands a summarized probing session to the feedback sink.
    /// Sink failures are logged, never surfaced.
    fn record_feedback(&self, session: &ProbingSession, summary: &FeedbackSummary) {
        if summary.rounds == 0 {
            return;
        }
        let record = FeedbackRecord {
            conversation_id: session.query.conversation_id,
            query_text: session.query.text.clone(),
            summary: summary.clone(),
            notes: session.notes.clone(),
            recorded_at: Utc::now(),
        };
        if let Err(err) = self.feedback.record(&record) {
            warn!(error = %err, "feedback sink failed");
        }
    }

    /// Runs a component call, retrying transient failures with
    /// exponential backoff up to the policy budget. A retried call
    /// yields one result (and therefore at most one turn), never one
    /// per attempt.
    async fn call_with_recovery<T, F, Fut>(
        &self,
        state: &mut ConversationState,
        phase: Phase,
        mut op: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut retries = 0_u32;
        loop {
            match op().await {
                Ok(value) => {
                    state.pending_retries = 0;
                    return Ok(value);
                }
                Err(err) if err.is_transient() && retries + 1 < self.retry.max_attempts() => {
                    retries += 1;
                    state.pending_retries = retries;
                    state.last_error = Some(err.to_string());
                    warn!(
                        conversation_id = %state.conversation_id,
                        retry = retries,
                        error = %err,
                        "transient failure, backing off"
                    );
                    state.transition(Phase::Retrying)?;
                    tokio::time::sleep(self.retry.delay_for(retries)).await;
                    state.transition(phase)?;
                }
                Err(err) => {
                    state.pending_retries = 0;
                    return Err(err);
                }
            }
        }
    }
}

/// Composes a best-effort reply straight from merged evidence.
fn compose_degraded(candidates: &[Candidate]) -> String {
    let mut out =
        String::from("The answer could not be generated; closest matching passages:\n");
    for candidate in candidates {
        let excerpt: String = candidate.text.chars().take(DEGRADED_EXCERPT_LEN).collect();
        let _ = writeln!(out, "- {}: {}", candidate.document_id, excerpt.trim());
    }
    out
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("generation", &self.generation.name())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::feedback::LogFeedbackSink;
    use crate::backend::lexical::LexicalIndex;
    use crate::backend::store::{Document, MemoryStore};
    use crate::core::types::SourceMetadata;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    /// Generation backend that pops scripted replies, then repeats the
    /// last one.
    struct ScriptedGeneration {
        replies: Mutex<VecDeque<String>>,
        fallback: String,
        calls: AtomicUsize,
    }

    impl ScriptedGeneration {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| (*r).to_string()).collect()),
                fallback: "scripted answer".to_string(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedGeneration {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(
            &self,
            _context: &str,
            _instructions: &str,
            _params: &SamplingParams,
        ) -> Result<String, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap_or_else(|e| e.into_inner());
            Ok(replies.pop_front().unwrap_or_else(|| self.fallback.clone()))
        }
    }

    fn seeded_store_and_index() -> (Arc<MemoryStore>, Arc<LexicalIndex>) {
        let store = MemoryStore::new();
        let index = LexicalIndex::new();
        let docs = [
            ("sla", "uptime target is four nines with monthly reporting"),
            ("oncall", "the rotation hands off every monday morning"),
        ];
        for (id, text) in docs {
            store
                .put_document(
                    &Document {
                        id: DocumentId::new(id),
                        text: text.to_string(),
                        metadata: SourceMetadata::default(),
                    },
                    &[text.to_string()],
                )
                .unwrap_or_else(|_| unreachable!());
            index.insert(DocumentId::new(id), Some(0), text, SourceMetadata::default());
        }
        (Arc::new(store), Arc::new(index))
    }

    fn test_config(threshold: f32) -> EngineConfig {
        EngineConfig::builder()
            .confidence_threshold(threshold)
            .adjustment_weight(0.0)
            .retry_base_delay(Duration::ZERO)
            .call_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    fn orchestrator_with(
        generation: Arc<ScriptedGeneration>,
        threshold: f32,
    ) -> Orchestrator {
        let (store, index) = seeded_store_and_index();
        Orchestrator::new(
            generation,
            index,
            store,
            Arc::new(LogFeedbackSink),
            test_config(threshold),
        )
    }

    #[tokio::test]
    async fn test_small_talk_skips_retrieval() {
        let generation = Arc::new(ScriptedGeneration::new(&["Hello! Ask me about the docs."]));
        let orchestrator = orchestrator_with(Arc::clone(&generation), 0.0);

        let outcome = orchestrator
            .handle(QueryRequest::new(Uuid::new_v4(), "hello"))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(outcome.phase, Phase::Done);
        assert!(outcome.citations.is_empty());
        assert_eq!(outcome.response_text, "Hello! Ask me about the docs.");
        assert_eq!(generation.calls(), 1);
    }

    #[tokio::test]
    async fn test_general_query_cites_evidence() {
        let generation = Arc::new(ScriptedGeneration::new(&["Four nines, per the SLA."]));
        let orchestrator = orchestrator_with(Arc::clone(&generation), 0.0);

        let outcome = orchestrator
            .handle(QueryRequest::new(
                Uuid::new_v4(),
                "what is the uptime target",
            ))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(outcome.phase, Phase::Done);
        assert!(outcome.citations.iter().any(|c| c.as_str() == "sla"));
        assert!(outcome.confidence > 0.0);
        // One generation call per turn.
        assert_eq!(generation.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_query_surfaces_invalid_without_turn() {
        let generation = Arc::new(ScriptedGeneration::new(&[]));
        let orchestrator = orchestrator_with(generation, 0.0);
        let conversation_id = Uuid::new_v4();

        let result = orchestrator
            .handle(QueryRequest::new(conversation_id, "   "))
            .await;
        assert!(matches!(result, Err(EngineError::InvalidQuery { .. })));

        // Conversation recovers on the next query.
        let outcome = orchestrator
            .handle(QueryRequest::new(conversation_id, "hello"))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(outcome.phase, Phase::Done);
    }

    #[tokio::test]
    async fn test_probing_suspends_and_resumes() {
        // Low-evidence query (no index match) forces probing; the first
        // generation call is the probe question, the second the final
        // answer after DONE.
        let generation = Arc::new(ScriptedGeneration::new(&[
            "What topic should the answer focus on?",
            "DONE",
            "Final synthesized answer.",
        ]));
        let orchestrator = orchestrator_with(generation, 0.9);
        let conversation_id = Uuid::new_v4();

        let suspended = orchestrator
            .handle(QueryRequest::new(conversation_id, "tell me about zzyzx"))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(suspended.phase, Phase::Probing);
        assert_eq!(
            suspended.pending_question.as_deref(),
            Some("What topic should the answer focus on?")
        );

        let resumed = orchestrator
            .handle(
                QueryRequest::new(conversation_id, "")
                    .with_answer("the roadside town, mostly its history"),
            )
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(resumed.phase, Phase::Done);
        assert_eq!(resumed.response_text, "Final synthesized answer.");
    }

    #[tokio::test]
    async fn test_degraded_outcome_when_generation_fails_with_evidence() {
        /// Generation that always fails transiently.
        struct DownGeneration;

        #[async_trait]
        impl GenerationBackend for DownGeneration {
            fn name(&self) -> &'static str {
                "down"
            }

            async fn generate(
                &self,
                _context: &str,
                _instructions: &str,
                _params: &SamplingParams,
            ) -> Result<String, EngineError> {
                Err(EngineError::Generation {
                    message: "provider down".to_string(),
                })
            }
        }

        let (store, index) = seeded_store_and_index();
        let orchestrator = Orchestrator::new(
            Arc::new(DownGeneration),
            index,
            store,
            Arc::new(LogFeedbackSink),
            test_config(0.0),
        );

        let outcome = orchestrator
            .handle(QueryRequest::new(
                Uuid::new_v4(),
                "what is the uptime target",
            ))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(outcome.phase, Phase::Error);
        assert!(outcome.response_text.contains("closest matching passages"));
        assert!(outcome.citations.iter().any(|c| c.as_str() == "sla"));
    }

    #[tokio::test]
    async fn test_cancel_discards_state() {
        let generation = Arc::new(ScriptedGeneration::new(&[]));
        let orchestrator = orchestrator_with(generation, 0.0);
        let conversation_id = Uuid::new_v4();

        orchestrator
            .handle(QueryRequest::new(conversation_id, "hello"))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(orchestrator.active_conversations().await, 1);
        assert!(orchestrator.cancel(conversation_id).await);
        assert_eq!(orchestrator.active_conversations().await, 0);
    }
}
