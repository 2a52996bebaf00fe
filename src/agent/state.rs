//! Conversation state machine and the per-conversation state arena.
//!
//! Each conversation owns exactly one [`ConversationState`], mutated
//! only through validated phase transitions. The arena serializes all
//! work on one conversation behind a per-key async mutex (waiters are
//! served in FIFO order) while distinct conversations proceed fully in
//! parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::core::types::{AgentResponse, Candidate, CapabilityKind, FeedbackNote, Query};
use crate::error::EngineError;

/// Phases of the conversation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Fresh conversation, no query processed yet.
    Init,
    /// Ready to classify the next query.
    Routing,
    /// Retrieval or doc-chat invocation in flight.
    Retrieving,
    /// Suspended on a probing question.
    Probing,
    /// Merging evidence and calling the generation backend.
    Generating,
    /// Final response delivered for the current query.
    Done,
    /// Transient: backing off before re-attempting a failed call.
    Retrying,
    /// A component call failed terminally for the current query.
    Error,
}

impl Phase {
    /// Phase name for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Routing => "routing",
            Self::Retrieving => "retrieving",
            Self::Probing => "probing",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Retrying => "retrying",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `from → to` is a legal state-machine transition.
#[must_use]
pub const fn can_transition(from: Phase, to: Phase) -> bool {
    use Phase::{Done, Error, Generating, Init, Probing, Retrieving, Retrying, Routing};
    // Error is reachable from any non-terminal phase.
    if matches!(to, Error) {
        return !matches!(from, Done);
    }
    matches!(
        (from, to),
        (Init, Routing)
            | (Routing, Retrieving | Probing | Generating)
            | (Retrieving, Probing | Generating | Retrying)
            | (Probing, Probing | Generating | Retrying)
            | (Generating, Done | Retrying)
            | (Retrying, Retrieving | Probing | Generating)
            | (Done, Routing)
            | (Error, Routing)
    )
}

/// One completed exchange, append-only.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    /// The query that started the turn.
    pub query: Query,
    /// Which capability served it.
    pub agent_used: CapabilityKind,
    /// The response delivered to the caller.
    pub response: AgentResponse,
    /// Final confidence, when the turn produced one.
    pub score: Option<f32>,
    /// When the turn completed.
    pub timestamp: DateTime<Utc>,
}

/// Suspended probing-loop state, discarded once summarized.
#[derive(Debug, Clone)]
pub struct ProbingSession {
    /// Capability that gathered the evidence before probing started.
    pub origin: CapabilityKind,
    /// The query being refined.
    pub query: Query,
    /// Evidence confidence before any feedback.
    pub base_confidence: f32,
    /// Evidence gathered before probing started.
    pub candidates: Vec<Candidate>,
    /// The question the caller has not answered yet.
    pub pending_question: String,
    /// Collected notes, in session order.
    pub notes: Vec<FeedbackNote>,
    /// Questions asked so far (the orchestrator's hard cap counts these).
    pub rounds: usize,
}

/// Per-conversation state, owned exclusively by the orchestrator.
#[derive(Debug)]
pub struct ConversationState {
    /// The conversation this state belongs to.
    pub conversation_id: Uuid,
    /// Current state-machine phase.
    pub phase: Phase,
    /// Append-only turn history, ordered by invocation sequence.
    pub history: Vec<Turn>,
    /// Retry attempts consumed by the in-flight call.
    pub pending_retries: u32,
    /// Last failure observed for this conversation.
    pub last_error: Option<String>,
    /// Active probing session, when suspended.
    pub probing: Option<ProbingSession>,
    /// Last time this conversation was touched (drives eviction).
    pub last_activity: Instant,
}

impl ConversationState {
    /// Creates state for a fresh conversation with empty history.
    #[must_use]
    pub fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            phase: Phase::Init,
            history: Vec::new(),
            pending_retries: 0,
            last_error: None,
            probing: None,
            last_activity: Instant::now(),
        }
    }

    /// Moves to a new phase, rejecting illegal transitions.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InternalInconsistency`] when the
    /// transition is not part of the state machine.
    pub fn transition(&mut self, to: Phase) -> Result<(), EngineError> {
        if !can_transition(self.phase, to) {
            return Err(EngineError::InternalInconsistency {
                message: format!(
                    "illegal transition {} -> {} for conversation {}",
                    self.phase, to, self.conversation_id
                ),
            });
        }
        debug!(
            conversation_id = %self.conversation_id,
            from = %self.phase,
            to = %to,
            "phase transition"
        );
        self.phase = to;
        Ok(())
    }

    /// Appends a completed turn. Turns are never mutated or reordered.
    pub fn append_turn(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    /// Resets to a fresh state after an invariant violation.
    pub fn reset_to_init(&mut self) {
        self.phase = Phase::Init;
        self.history.clear();
        self.pending_retries = 0;
        self.probing = None;
    }

    /// Marks the conversation as recently active.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Arena of conversation states keyed by conversation id.
#[derive(Debug, Default)]
pub struct ConversationArena {
    slots: Mutex<HashMap<Uuid, Arc<Mutex<ConversationState>>>>,
}

impl ConversationArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for a conversation, creating it on first use.
    ///
    /// The caller locks the returned mutex for the duration of the turn;
    /// that lock is the single-writer discipline.
    pub async fn checkout(&self, conversation_id: Uuid) -> Arc<Mutex<ConversationState>> {
        let mut slots = self.slots.lock().await;
        Arc::clone(
            slots
                .entry(conversation_id)
                .or_insert_with(|| Arc::new(Mutex::new(ConversationState::new(conversation_id)))),
        )
    }

    /// Returns the slot for a conversation without creating one.
    pub async fn get(&self, conversation_id: Uuid) -> Option<Arc<Mutex<ConversationState>>> {
        let slots = self.slots.lock().await;
        slots.get(&conversation_id).map(Arc::clone)
    }

    /// Discards a conversation's state. Returns whether it existed.
    ///
    /// Safe between suspension points: an in-flight turn keeps its own
    /// `Arc` and finishes against the detached state.
    pub async fn cancel(&self, conversation_id: Uuid) -> bool {
        let mut slots = self.slots.lock().await;
        slots.remove(&conversation_id).is_some()
    }

    /// Evicts conversations idle for longer than `max_idle`. Slots that
    /// are currently locked by a turn are left alone. Returns how many
    /// were evicted.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|_, slot| {
            slot.try_lock()
                .map(|state| state.last_activity.elapsed() <= max_idle)
                .unwrap_or(true)
        });
        before - slots.len()
    }

    /// Number of live conversations.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Whether the arena holds no conversations.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
