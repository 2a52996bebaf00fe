//! Error taxonomy for the query orchestration engine.
//!
//! Component-level failures are caught at the orchestrator boundary and
//! classified here. Transient errors are eligible for retry under the
//! orchestrator's [`RetryPolicy`](crate::agent::retry::RetryPolicy);
//! everything else surfaces to the caller on first occurrence.

use std::time::Duration;

use thiserror::Error;

use crate::core::types::DocumentId;

/// Errors produced by the orchestration engine and its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input. Surfaced immediately, never retried.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// What was wrong with the input.
        message: String,
    },

    /// A collaborator backend could not be reached. Transient.
    #[error("{backend} backend unavailable: {message}")]
    BackendUnavailable {
        /// Which backend failed (`"vector-search"`, `"generation"`, ...).
        backend: &'static str,
        /// Underlying failure description.
        message: String,
    },

    /// A bounded call did not complete in time. Transient.
    #[error("{operation} timed out after {waited:?}")]
    Timeout {
        /// The operation that was cut off.
        operation: &'static str,
        /// How long the orchestrator waited.
        waited: Duration,
    },

    /// The persistence collaborator does not know this document. Terminal.
    #[error("document not found: {document_id}")]
    DocumentNotFound {
        /// The unresolved document id.
        document_id: DocumentId,
    },

    /// The outbound concurrency gate queue timed out. Surfaced with a
    /// retry-after hint rather than retried internally.
    #[error("engine overloaded, retry after {retry_after:?}")]
    Overloaded {
        /// Suggested wait before the caller retries.
        retry_after: Duration,
    },

    /// A state-machine invariant was violated. Fatal for the turn; the
    /// conversation is reset to its initial state.
    #[error("internal inconsistency: {message}")]
    InternalInconsistency {
        /// The violated invariant.
        message: String,
    },

    /// The generation backend returned a failure. Transient.
    #[error("generation failed: {message}")]
    Generation {
        /// Provider-reported failure.
        message: String,
    },

    /// The persistence collaborator failed. Terminal.
    #[error("storage error: {message}")]
    Storage {
        /// Underlying storage failure.
        message: String,
    },

    /// Invalid or incomplete engine configuration. Terminal.
    #[error("configuration error: {message}")]
    Configuration {
        /// What is missing or out of range.
        message: String,
    },
}

impl EngineError {
    /// Whether the orchestrator should retry the failed call.
    ///
    /// [`Overloaded`](Self::Overloaded) is transient from the caller's
    /// point of view but is surfaced directly with its retry-after hint
    /// instead of burning the internal retry budget on a saturated gate.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. } | Self::Timeout { .. } | Self::Generation { .. }
        )
    }

    /// Whether this failure should be reported to the caller as-is,
    /// without a degraded best-effort answer.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery { .. }
                | Self::DocumentNotFound { .. }
                | Self::Configuration { .. }
                | Self::InternalInconsistency { .. }
        )
    }
}
