//! Conversational query orchestration engine.
//!
//! `querylytics-rs` routes user queries through specialized agents —
//! vector-backed retrieval, interactive probing, and document-scoped
//! chat — under a coordinating orchestrator that owns per-conversation
//! state machines, recovers from backend failures with bounded retries,
//! merges ranked evidence deterministically, and calls the generation
//! backend once per turn.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use querylytics_rs::agent::{EngineConfig, Orchestrator, QueryRequest};
//! use querylytics_rs::backend::{LogFeedbackSink, LexicalIndex, MemoryStore, create_generation};
//! use uuid::Uuid;
//!
//! # async fn run() -> Result<(), querylytics_rs::error::EngineError> {
//! let config = EngineConfig::from_env()?;
//! let orchestrator = Orchestrator::new(
//!     create_generation(&config)?,
//!     Arc::new(LexicalIndex::new()),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(LogFeedbackSink),
//!     config,
//! );
//! let outcome = orchestrator
//!     .handle(QueryRequest::new(Uuid::new_v4(), "what changed in the last release?"))
//!     .await?;
//! println!("{}", outcome.response_text);
//! # Ok(())
//! # }
//! ```
//!
//! # Collaborator Boundaries
//!
//! The generation backend, vector-search backend, persistence, and
//! feedback sink are traits in [`backend`]; the shipped reference
//! implementations (OpenAI-compatible generation, in-process lexical
//! index, in-memory and SQLite stores) can each be swapped without
//! touching the orchestration core.

pub mod agent;
pub mod backend;
pub mod chunk;
pub mod cli;
pub mod core;
pub mod error;

pub use agent::{EngineConfig, Orchestrator, QueryOutcome, QueryRequest};
pub use core::types::{AgentResponse, Candidate, DocumentId, Query};
pub use error::EngineError;
