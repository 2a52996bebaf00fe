//! Candidate scoring, total ordering, and the evidence merge rule.
//!
//! Every component that produces [`Candidate`]s scores them through the
//! same functions so ranking semantics stay consistent across retrieval
//! and doc-chat. The ordering is total — score descending, ties broken
//! by ascending document id, then ascending chunk id — which makes the
//! merge deterministic for identical inputs.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::core::types::{Candidate, DocumentId, FeedbackNote, SourceMetadata};

/// Authority assumed for sources that never declared one.
const DEFAULT_AUTHORITY: f32 = 0.5;

/// Hours in a day, for the recency decay exponent.
const HOURS_PER_DAY: f32 = 24.0;

/// Clamps a score into `0.0..=1.0`.
#[must_use]
pub fn clamp_score(score: f32) -> f32 {
    score.clamp(0.0, 1.0)
}

/// Combines backend similarity with the recency/authority adjustment.
///
/// `weight` is the share of the final score contributed by the
/// adjustment; `0.0` ranks purely by similarity.
#[must_use]
pub fn combine_score(similarity: f32, adjustment: f32, weight: f32) -> f32 {
    let weight = weight.clamp(0.0, 1.0);
    clamp_score(similarity.mul_add(1.0 - weight, adjustment * weight))
}

/// Computes the recency/authority adjustment for a source.
///
/// Authority defaults to `0.5` when undeclared. When the source carries
/// an update timestamp, a half-life decay over `half_life_days` is
/// averaged in; sources updated in the future are treated as current.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn source_adjustment(
    meta: &SourceMetadata,
    now: DateTime<Utc>,
    half_life_days: f32,
) -> f32 {
    let authority = meta
        .authority
        .map_or(DEFAULT_AUTHORITY, |a| a.clamp(0.0, 1.0));

    match meta.updated_at {
        Some(updated_at) if half_life_days > 0.0 => {
            let age_hours = (now - updated_at).num_hours().max(0) as f32;
            let recency = 0.5_f32.powf(age_hours / (half_life_days * HOURS_PER_DAY));
            clamp_score(f32::midpoint(authority, recency))
        }
        _ => authority,
    }
}

/// The total order over candidates: relevance descending, then document
/// id ascending, then chunk id ascending.
#[must_use]
pub fn candidate_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.relevance_score
        .total_cmp(&a.relevance_score)
        .then_with(|| a.document_id.cmp(&b.document_id))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// Merges candidates from one or more components into a single ranked
/// evidence set.
///
/// Concatenated input is sorted under [`candidate_order`], truncated to
/// `top_k`, then deduplicated by `(document_id, chunk_id)` keeping the
/// first (highest-ranked) occurrence.
#[must_use]
pub fn merge_candidates(mut candidates: Vec<Candidate>, top_k: usize) -> Vec<Candidate> {
    candidates.sort_by(candidate_order);
    candidates.truncate(top_k);

    let mut seen: HashSet<(DocumentId, Option<u32>)> = HashSet::with_capacity(candidates.len());
    candidates.retain(|c| seen.insert((c.document_id.clone(), c.chunk_id)));
    candidates
}

/// Confidence derived from an evidence set: the best relevance score,
/// or zero when no evidence was gathered.
#[must_use]
pub fn evidence_confidence(candidates: &[Candidate]) -> f32 {
    candidates
        .iter()
        .map(|c| c.relevance_score)
        .fold(0.0_f32, f32::max)
}

/// Re-evaluates confidence after probing: the base evidence confidence
/// raised by `uplift` for every note that extracted a usable signal.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn effective_confidence(base: f32, notes: &[FeedbackNote], uplift: f32) -> f32 {
    let informative = notes.iter().filter(|n| !n.extracted_signal.is_empty()).count();
    clamp_score((informative as f32).mul_add(uplift, base))
}
