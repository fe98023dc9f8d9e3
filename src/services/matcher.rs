//! Matching engine
//!
//! Scores how likely two catalog entities denote the same work. An
//! ordered cascade of five stages is evaluated top-down and the first
//! stage that fires wins; a lower stage never overrides a higher one.
//! Deterministic and side-effect free: same inputs, same outcome.

use serde::Serialize;

use crate::models::CatalogEntity;
use crate::services::normalizer::{normalize, token_overlap};

/// Confidence at or above which a match may be linked without user
/// confirmation. Policy floor: lowering this below 0.80 has historically
/// produced incorrect links and is not a configuration knob.
pub const AUTO_LINK_THRESHOLD: f64 = 0.85;

/// Confidence at or above which a match is surfaced for manual review
pub const REVIEW_THRESHOLD: f64 = 0.70;

// Compile-time guard on the policy floor.
const _: () = assert!(AUTO_LINK_THRESHOLD >= 0.80);

/// Which cascade stage produced the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    /// Normalized primary titles byte-equal
    Exact,
    /// Title similarity ratio > 0.95
    HighSimilarity,
    /// Similarity > 0.85 and release years within ±1
    SimilarityWithYear,
    /// Similarity > 0.90 against any alternate title on either side
    AlternateTitle,
    /// Shared-token proportion > 0.70 and years within ±1
    TokenOverlapWithYear,
    /// No stage fired
    Rejected,
}

/// What the caller is allowed to do with the match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    /// Confidence >= 0.85: eligible for automatic linking
    AutoLink,
    /// Confidence in [0.70, 0.85): surface for confirmation, never auto-apply
    ManualReview,
    /// Confidence < 0.70: rejected outright, never a low-confidence link
    Rejected,
}

/// Result of scoring one candidate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub confidence: f64,
    pub stage: MatchStage,
    pub decision: MatchDecision,
}

/// Map a confidence score to the fixed policy decision
pub fn decide(confidence: f64) -> MatchDecision {
    if confidence >= AUTO_LINK_THRESHOLD {
        MatchDecision::AutoLink
    } else if confidence >= REVIEW_THRESHOLD {
        MatchDecision::ManualReview
    } else {
        MatchDecision::Rejected
    }
}

/// Title/metadata matching engine
#[derive(Debug, Clone, Default)]
pub struct MatchEngine;

impl MatchEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score one candidate pair through the five-stage cascade.
    pub fn score(&self, a: &CatalogEntity, b: &CatalogEntity) -> MatchOutcome {
        let norm_a = normalize(&a.title);
        let norm_b = normalize(&b.title);

        // Stage 1: exact normalized equality
        if !norm_a.is_empty() && norm_a == norm_b {
            return outcome(1.0, MatchStage::Exact);
        }

        let similarity = strsim::normalized_levenshtein(&norm_a, &norm_b);

        // Stage 2: near-identical titles
        if similarity > 0.95 {
            return outcome(0.95, MatchStage::HighSimilarity);
        }

        // Stage 3: strong similarity backed by release year. A missing year
        // does not disqualify; it falls through to the later stages.
        if similarity > 0.85 && years_within_one(a, b) == Some(true) {
            return outcome(0.90, MatchStage::SimilarityWithYear);
        }

        // Stage 4: any alternate title on either side
        if self.best_alt_similarity(a, b, &norm_a, &norm_b) > 0.90 {
            return outcome(0.85, MatchStage::AlternateTitle);
        }

        // Stage 5: token overlap backed by release year
        if token_overlap(&norm_a, &norm_b) > 0.70 && years_within_one(a, b) == Some(true) {
            return outcome(0.80, MatchStage::TokenOverlapWithYear);
        }

        outcome(0.0, MatchStage::Rejected)
    }

    /// Evaluate a candidate set against one entity and return the best match.
    ///
    /// Ranked by confidence; ties broken by earliest stage, since an exact
    /// match is definitionally more trustworthy than an equal-confidence
    /// fuzzy one. Returns `None` for an empty candidate set or when every
    /// candidate is rejected.
    pub fn best_match<'c>(
        &self,
        target: &CatalogEntity,
        candidates: &'c [CatalogEntity],
    ) -> Option<(&'c CatalogEntity, MatchOutcome)> {
        candidates
            .iter()
            .map(|candidate| (candidate, self.score(target, candidate)))
            .filter(|(_, outcome)| outcome.stage != MatchStage::Rejected)
            .min_by(|(_, x), (_, y)| {
                y.confidence
                    .partial_cmp(&x.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(x.stage.cmp(&y.stage))
            })
    }

    /// Highest similarity across pairs where at least one side is an
    /// alternate title.
    fn best_alt_similarity(
        &self,
        a: &CatalogEntity,
        b: &CatalogEntity,
        norm_a: &str,
        norm_b: &str,
    ) -> f64 {
        let alts_a: Vec<String> = a.alt_titles.iter().map(|t| normalize(t)).collect();
        let alts_b: Vec<String> = b.alt_titles.iter().map(|t| normalize(t)).collect();

        let mut best: f64 = 0.0;

        for alt in alts_a.iter().filter(|t| !t.is_empty()) {
            best = best.max(strsim::normalized_levenshtein(alt, norm_b));
            for other in alts_b.iter().filter(|t| !t.is_empty()) {
                best = best.max(strsim::normalized_levenshtein(alt, other));
            }
        }
        for alt in alts_b.iter().filter(|t| !t.is_empty()) {
            best = best.max(strsim::normalized_levenshtein(norm_a, alt));
        }

        best
    }
}

fn outcome(confidence: f64, stage: MatchStage) -> MatchOutcome {
    MatchOutcome {
        confidence,
        stage,
        decision: decide(confidence),
    }
}

/// `Some(true)` when both years are known and within ±1, `Some(false)` when
/// both are known and further apart, `None` when either is missing.
fn years_within_one(a: &CatalogEntity, b: &CatalogEntity) -> Option<bool> {
    match (a.release_year, b.release_year) {
        (Some(ya), Some(yb)) => Some((ya - yb).abs() <= 1),
        _ => None,
    }
}
