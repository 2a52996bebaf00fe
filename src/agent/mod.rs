//! Multi-agent query orchestration.
//!
//! A query is routed through specialized components under a coordinating
//! orchestrator that owns conversation state, sequences invocations,
//! recovers from failures, and merges results into one final response.
//!
//! # Architecture
//!
//! ```text
//! QueryRequest → Orchestrator (state machine per conversation)
//!   ├── classify → {small-talk, general, doc-scoped, feedback-answer}
//!   ├── RetrievalAgent  → ranked Candidates (vector search + store)
//!   ├── DocChatAgent    → ranked Candidates from one document
//!   ├── ProbingAgent    → suspend/resume clarifying-question loop
//!   ├── merge → deterministic top-K evidence set
//!   └── generation backend (one call) → QueryOutcome with provenance
//! ```

pub mod capability;
pub mod config;
pub mod doc_chat;
pub mod gate;
pub mod orchestrator;
pub mod probing;
pub mod prompt;
pub mod retrieval;
pub mod retry;
pub mod state;

// Re-export key types
pub use capability::{CapabilityKind, Route, classify};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use doc_chat::DocChatAgent;
pub use gate::ConcurrencyGate;
pub use orchestrator::{Orchestrator, QueryOutcome, QueryRequest};
pub use probing::{ProbeStep, ProbingAgent};
pub use retrieval::RetrievalAgent;
pub use retry::RetryPolicy;
pub use state::{ConversationArena, ConversationState, Phase, ProbingSession, Turn};
