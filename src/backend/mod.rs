//! Collaborator backends consumed by the orchestration core.
//!
//! Each backend is a trait the engine depends on plus at least one
//! reference implementation: generation (`async-openai`), vector search
//! (in-process lexical index), persistence (in-memory and SQLite), and
//! the feedback sink.

pub mod feedback;
pub mod generation;
pub mod lexical;
pub mod openai;
pub mod sqlite;
pub mod store;
pub mod vector;

use std::sync::Arc;

use crate::agent::config::EngineConfig;
use crate::error::EngineError;

pub use feedback::{FeedbackRecord, FeedbackSink, LogFeedbackSink};
pub use generation::{GenerationBackend, SamplingParams};
pub use lexical::{LexicalIndex, lexical_similarity};
pub use openai::OpenAiGeneration;
pub use sqlite::SqliteStore;
pub use store::{Document, DocumentStore, MemoryStore, StoreStats};
pub use vector::{Neighbor, VectorSearch};

/// Creates a [`GenerationBackend`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"openai"` (default) — OpenAI-compatible APIs via `async-openai`
///
/// # Errors
///
/// Returns [`EngineError::Configuration`] for unknown provider names or
/// a missing API key.
pub fn create_generation(config: &EngineConfig) -> Result<Arc<dyn GenerationBackend>, EngineError> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiGeneration::new(config)?)),
        other => Err(EngineError::Configuration {
            message: format!("unsupported generation provider: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_openai_backend() {
        let config = EngineConfig::builder()
            .api_key("test")
            .provider("openai")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let backend = create_generation(&config);
        assert!(backend.is_ok());
    }

    #[test]
    fn test_create_unknown_provider() {
        let config = EngineConfig::builder()
            .api_key("test")
            .provider("unknown")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let result = create_generation(&config);
        assert!(result.is_err());
    }
}
