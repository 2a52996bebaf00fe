//! Pluggable generation backend trait.
//!
//! Implementations translate the engine's context/instructions pair into
//! provider-specific completion calls. This keeps orchestration logic
//! decoupled from any particular LLM vendor; timeout and retry are
//! governed by the orchestrator, never by the backend.

use async_trait::async_trait;

use crate::error::EngineError;

/// Sampling controls forwarded to the generation backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    /// Sampling temperature (0.0 = deterministic).
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

/// Trait for natural-language generation backends.
///
/// One call per `Generating` transition; the probing component also uses
/// it for follow-up question generation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name (e.g., `"openai"`, `"mock"`).
    fn name(&self) -> &'static str;

    /// Produces text for the given context under the given instructions.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BackendUnavailable`] when the provider is
    /// unreachable and [`EngineError::Generation`] for provider-reported
    /// failures.
    async fn generate(
        &self,
        context: &str,
        instructions: &str,
        params: &SamplingParams,
    ) -> Result<String, EngineError>;
}
