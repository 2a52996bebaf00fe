//! Engine configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.
//! Every tunable the pipeline depends on is an explicit field here rather
//! than a constant buried in a component.

use std::time::Duration;

use crate::error::EngineError;

/// Default generation provider name.
const DEFAULT_PROVIDER: &str = "openai";
/// Default generation model.
const DEFAULT_GENERATION_MODEL: &str = "gpt-5-mini-2025-08-07";
/// Default sampling temperature for final answers.
const DEFAULT_TEMPERATURE: f32 = 0.2;
/// Default max tokens for final answers.
const DEFAULT_MAX_TOKENS: u32 = 1024;
/// Below this evidence confidence the orchestrator enters probing.
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.55;
/// Hard cap on probing rounds per session.
const DEFAULT_MAX_PROBE_ROUNDS: usize = 3;
/// Confidence raised per informative feedback note.
const DEFAULT_NOTE_CONFIDENCE_UPLIFT: f32 = 0.15;
/// Merged evidence set size.
const DEFAULT_MERGE_TOP_K: usize = 8;
/// Candidates requested per retrieval call.
const DEFAULT_RETRIEVAL_K: usize = 5;
/// Backend neighbors fetched per requested candidate.
const DEFAULT_OVERSAMPLE_FACTOR: usize = 4;
/// Share of the relevance score contributed by recency/authority.
const DEFAULT_ADJUSTMENT_WEIGHT: f32 = 0.25;
/// Half-life of the recency decay, in days.
const DEFAULT_RECENCY_HALF_LIFE_DAYS: f32 = 30.0;
/// Doc-chat chunk size in grapheme clusters.
const DEFAULT_CHUNK_SIZE: usize = 500;
/// Doc-chat chunk overlap in grapheme clusters.
const DEFAULT_CHUNK_OVERLAP: usize = 50;
/// Chunks selected per doc-chat answer.
const DEFAULT_CHUNK_TOP_K: usize = 5;
/// Per-call timeout for component and backend invocations.
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
/// Simultaneous outbound backend calls.
const DEFAULT_GATE_PERMITS: usize = 8;
/// How long a caller may queue for a gate permit.
const DEFAULT_GATE_QUEUE_TIMEOUT_SECS: u64 = 5;
/// Idle conversations older than this are eligible for eviction.
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1800;
/// Retry budget per component call.
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
/// First retry backoff delay.
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
/// Backoff ceiling.
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Configuration for the orchestration engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Generation provider name (e.g., "openai").
    pub provider: String,
    /// API key for the generation provider. Only required when a real
    /// provider is constructed; mock backends ignore it.
    pub api_key: Option<String>,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model used for final answers, chat, and probing questions.
    pub generation_model: String,
    /// Sampling temperature for final answers.
    pub temperature: f32,
    /// Maximum tokens for final answers.
    pub max_tokens: u32,
    /// Evidence confidence below which probing starts.
    pub confidence_threshold: f32,
    /// Hard cap on probing rounds, enforced by the orchestrator
    /// regardless of the probing component's own judgment.
    pub max_probe_rounds: usize,
    /// Confidence uplift per informative feedback note.
    pub note_confidence_uplift: f32,
    /// Evidence set size after the merge step.
    pub merge_top_k: usize,
    /// Candidates requested per retrieval call.
    pub retrieval_k: usize,
    /// Oversampling factor applied to vector-search requests.
    pub oversample_factor: usize,
    /// Weight of the recency/authority adjustment in relevance scores.
    pub adjustment_weight: f32,
    /// Recency decay half-life in days.
    pub recency_half_life_days: f32,
    /// Doc-chat chunk size in grapheme clusters.
    pub chunk_size: usize,
    /// Doc-chat chunk overlap in grapheme clusters.
    pub chunk_overlap: usize,
    /// Chunks selected per doc-chat answer.
    pub chunk_top_k: usize,
    /// Per-call timeout for component and backend invocations.
    pub call_timeout: Duration,
    /// Simultaneous outbound backend calls allowed by the gate.
    pub gate_permits: usize,
    /// Maximum FIFO wait for a gate permit before `Overloaded`.
    pub gate_queue_timeout: Duration,
    /// Idle time after which a conversation may be evicted.
    pub idle_timeout: Duration,
    /// Retry attempts per component call (including the first).
    pub retry_max_attempts: u32,
    /// First retry backoff delay.
    pub retry_base_delay: Duration,
    /// Backoff ceiling.
    pub retry_max_delay: Duration,
}

impl EngineConfig {
    /// Creates a new builder for `EngineConfig`.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] when a value is out of range.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::builder().from_env().build()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        // Build only fails on out-of-range explicit values, which
        // defaults never are.
        EngineConfigBuilder::default()
            .build()
            .unwrap_or_else(|_| unreachable!("defaults are in range"))
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    generation_model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    confidence_threshold: Option<f32>,
    max_probe_rounds: Option<usize>,
    note_confidence_uplift: Option<f32>,
    merge_top_k: Option<usize>,
    retrieval_k: Option<usize>,
    oversample_factor: Option<usize>,
    adjustment_weight: Option<f32>,
    recency_half_life_days: Option<f32>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    chunk_top_k: Option<usize>,
    call_timeout: Option<Duration>,
    gate_permits: Option<usize>,
    gate_queue_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
    retry_max_attempts: Option<u32>,
    retry_base_delay: Option<Duration>,
    retry_max_delay: Option<Duration>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl EngineConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("QUERYLYTICS_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("QUERYLYTICS_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("QUERYLYTICS_BASE_URL")
                .or_else(|_| std::env::var("OPENAI_BASE_URL"))
                .ok();
        }
        if self.generation_model.is_none() {
            self.generation_model = std::env::var("QUERYLYTICS_MODEL").ok();
        }
        if self.confidence_threshold.is_none() {
            self.confidence_threshold = env_parse("QUERYLYTICS_CONFIDENCE_THRESHOLD");
        }
        if self.max_probe_rounds.is_none() {
            self.max_probe_rounds = env_parse("QUERYLYTICS_MAX_PROBE_ROUNDS");
        }
        if self.merge_top_k.is_none() {
            self.merge_top_k = env_parse("QUERYLYTICS_MERGE_TOP_K");
        }
        if self.retrieval_k.is_none() {
            self.retrieval_k = env_parse("QUERYLYTICS_RETRIEVAL_K");
        }
        if self.gate_permits.is_none() {
            self.gate_permits = env_parse("QUERYLYTICS_GATE_PERMITS");
        }
        if self.call_timeout.is_none() {
            self.call_timeout = env_parse("QUERYLYTICS_CALL_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.idle_timeout.is_none() {
            self.idle_timeout = env_parse("QUERYLYTICS_IDLE_TIMEOUT_SECS").map(Duration::from_secs);
        }
        self
    }

    /// Sets the generation provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the generation model.
    #[must_use]
    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = Some(model.into());
        self
    }

    /// Sets the sampling temperature for final answers.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the max tokens for final answers.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the probing confidence threshold.
    #[must_use]
    pub const fn confidence_threshold(mut self, t: f32) -> Self {
        self.confidence_threshold = Some(t);
        self
    }

    /// Sets the probing round cap.
    #[must_use]
    pub const fn max_probe_rounds(mut self, n: usize) -> Self {
        self.max_probe_rounds = Some(n);
        self
    }

    /// Sets the per-note confidence uplift.
    #[must_use]
    pub const fn note_confidence_uplift(mut self, u: f32) -> Self {
        self.note_confidence_uplift = Some(u);
        self
    }

    /// Sets the merged evidence set size.
    #[must_use]
    pub const fn merge_top_k(mut self, k: usize) -> Self {
        self.merge_top_k = Some(k);
        self
    }

    /// Sets the candidates requested per retrieval call.
    #[must_use]
    pub const fn retrieval_k(mut self, k: usize) -> Self {
        self.retrieval_k = Some(k);
        self
    }

    /// Sets the vector-search oversampling factor.
    #[must_use]
    pub const fn oversample_factor(mut self, f: usize) -> Self {
        self.oversample_factor = Some(f);
        self
    }

    /// Sets the recency/authority adjustment weight.
    #[must_use]
    pub const fn adjustment_weight(mut self, w: f32) -> Self {
        self.adjustment_weight = Some(w);
        self
    }

    /// Sets the recency half-life in days.
    #[must_use]
    pub const fn recency_half_life_days(mut self, d: f32) -> Self {
        self.recency_half_life_days = Some(d);
        self
    }

    /// Sets the doc-chat chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = Some(n);
        self
    }

    /// Sets the doc-chat chunk overlap.
    #[must_use]
    pub const fn chunk_overlap(mut self, n: usize) -> Self {
        self.chunk_overlap = Some(n);
        self
    }

    /// Sets the chunks selected per doc-chat answer.
    #[must_use]
    pub const fn chunk_top_k(mut self, k: usize) -> Self {
        self.chunk_top_k = Some(k);
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn call_timeout(mut self, d: Duration) -> Self {
        self.call_timeout = Some(d);
        self
    }

    /// Sets the outbound gate size.
    #[must_use]
    pub const fn gate_permits(mut self, n: usize) -> Self {
        self.gate_permits = Some(n);
        self
    }

    /// Sets the gate queue timeout.
    #[must_use]
    pub const fn gate_queue_timeout(mut self, d: Duration) -> Self {
        self.gate_queue_timeout = Some(d);
        self
    }

    /// Sets the conversation idle timeout.
    #[must_use]
    pub const fn idle_timeout(mut self, d: Duration) -> Self {
        self.idle_timeout = Some(d);
        self
    }

    /// Sets the retry budget per component call.
    #[must_use]
    pub const fn retry_max_attempts(mut self, n: u32) -> Self {
        self.retry_max_attempts = Some(n);
        self
    }

    /// Sets the first retry backoff delay.
    #[must_use]
    pub const fn retry_base_delay(mut self, d: Duration) -> Self {
        self.retry_base_delay = Some(d);
        self
    }

    /// Sets the backoff ceiling.
    #[must_use]
    pub const fn retry_max_delay(mut self, d: Duration) -> Self {
        self.retry_max_delay = Some(d);
        self
    }

    /// Builds the [`EngineConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] when a value is out of
    /// range (threshold outside `0..=1`, overlap not smaller than chunk
    /// size, zero-sized gate, merge set, or retry budget).
    pub fn build(self) -> Result<EngineConfig, EngineError> {
        let config = EngineConfig {
            provider: self.provider.unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            api_key: self.api_key,
            base_url: self.base_url,
            generation_model: self
                .generation_model
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            confidence_threshold: self
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            max_probe_rounds: self.max_probe_rounds.unwrap_or(DEFAULT_MAX_PROBE_ROUNDS),
            note_confidence_uplift: self
                .note_confidence_uplift
                .unwrap_or(DEFAULT_NOTE_CONFIDENCE_UPLIFT),
            merge_top_k: self.merge_top_k.unwrap_or(DEFAULT_MERGE_TOP_K),
            retrieval_k: self.retrieval_k.unwrap_or(DEFAULT_RETRIEVAL_K),
            oversample_factor: self.oversample_factor.unwrap_or(DEFAULT_OVERSAMPLE_FACTOR),
            adjustment_weight: self.adjustment_weight.unwrap_or(DEFAULT_ADJUSTMENT_WEIGHT),
            recency_half_life_days: self
                .recency_half_life_days
                .unwrap_or(DEFAULT_RECENCY_HALF_LIFE_DAYS),
            chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            chunk_overlap: self.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
            chunk_top_k: self.chunk_top_k.unwrap_or(DEFAULT_CHUNK_TOP_K),
            call_timeout: self
                .call_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS)),
            gate_permits: self.gate_permits.unwrap_or(DEFAULT_GATE_PERMITS),
            gate_queue_timeout: self
                .gate_queue_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_GATE_QUEUE_TIMEOUT_SECS)),
            idle_timeout: self
                .idle_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
            retry_max_attempts: self
                .retry_max_attempts
                .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS),
            retry_base_delay: self
                .retry_base_delay
                .unwrap_or(Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS)),
            retry_max_delay: self
                .retry_max_delay
                .unwrap_or(Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS)),
        };

        if !(0.0..=1.0).contains(&config.confidence_threshold) {
            return Err(EngineError::Configuration {
                message: format!(
                    "confidence_threshold must be within 0.0..=1.0, got {}",
                    config.confidence_threshold
                ),
            });
        }
        if !(0.0..=1.0).contains(&config.adjustment_weight) {
            return Err(EngineError::Configuration {
                message: format!(
                    "adjustment_weight must be within 0.0..=1.0, got {}",
                    config.adjustment_weight
                ),
            });
        }
        if config.chunk_size == 0 || config.chunk_overlap >= config.chunk_size {
            return Err(EngineError::Configuration {
                message: format!(
                    "chunk_overlap ({}) must be smaller than chunk_size ({})",
                    config.chunk_overlap, config.chunk_size
                ),
            });
        }
        if config.oversample_factor == 0 {
            return Err(EngineError::Configuration {
                message: "oversample_factor must be at least 1".to_string(),
            });
        }
        if config.merge_top_k == 0 {
            return Err(EngineError::Configuration {
                message: "merge_top_k must be at least 1".to_string(),
            });
        }
        if config.gate_permits == 0 {
            return Err(EngineError::Configuration {
                message: "gate_permits must be at least 1".to_string(),
            });
        }
        if config.retry_max_attempts == 0 {
            return Err(EngineError::Configuration {
                message: "retry_max_attempts must be at least 1".to_string(),
            });
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.provider, "openai");
        assert!(config.api_key.is_none());
        assert_eq!(config.max_probe_rounds, DEFAULT_MAX_PROBE_ROUNDS);
        assert_eq!(config.merge_top_k, DEFAULT_MERGE_TOP_K);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_builder_custom_values() {
        let config = EngineConfig::builder()
            .api_key("key")
            .confidence_threshold(0.8)
            .max_probe_rounds(5)
            .retrieval_k(10)
            .call_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert!((config.confidence_threshold - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.max_probe_rounds, 5);
        assert_eq!(config.retrieval_k, 10);
        assert_eq!(config.call_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let result = EngineConfig::builder().confidence_threshold(1.5).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let result = EngineConfig::builder()
            .chunk_size(100)
            .chunk_overlap(100)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_gate_rejected() {
        let result = EngineConfig::builder().gate_permits(0).build();
        assert!(result.is_err());
    }
}
