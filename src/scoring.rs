//! Explainable lead scoring.
//!
//! Scoring is a pure, stateless function of a record's persisted hits. Every
//! score ships with a breakdown tracing it back to the rules that produced
//! it; a ranking that cannot be explained is not trustworthy for review.

use std::collections::HashSet;

use crate::models::{ClauseHit, ScoreBreakdown};

/// Fallback weight per keyword hit when a record has keyword hits but no
/// clause hits (rows tagged before clause capture existed).
const KEYWORD_FALLBACK_WEIGHT: f64 = 3.0;

/// Flat bonus when the record is linked to a tracked entity.
const ENTITY_BONUS: f64 = 10.0;

/// How many clauses the breakdown enumerates.
const TOP_CLAUSES: usize = 5;

/// v2 dampening: weights beyond the top `V2_TOP_N` count at `V2_REST_SCALE`.
const V2_TOP_N: usize = 6;
const V2_REST_SCALE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringVersion {
    V1,
    V2,
}

impl ScoringVersion {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "v1" => Some(Self::V1),
            "v2" => Some(Self::V2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

/// Score a record's persisted hits.
///
/// v1 is a plain sum of clause weights. v2 applies diminishing returns so a
/// record matching one rule fifty times does not drown out diverse matches:
/// weights are sorted descending, the top six count fully, the rest at half
/// value. Both fall back to a small per-keyword floor when no clause hits
/// exist, and add a flat bonus for entity-linked records.
pub fn score_hits(
    keywords: &[String],
    clauses: &[ClauseHit],
    has_entity: bool,
    version: ScoringVersion,
) -> (f64, ScoreBreakdown) {
    let mut pack_hits: HashSet<&str> = HashSet::new();
    let mut rule_hits: HashSet<(&str, &str)> = HashSet::new();
    for c in clauses {
        pack_hits.insert(c.pack.as_str());
        rule_hits.insert((c.pack.as_str(), c.rule.as_str()));
    }

    let raw_sum: f64 = clauses.iter().map(|c| c.weight).sum();
    let (clause_score, clause_score_raw) = match version {
        ScoringVersion::V1 => (raw_sum, None),
        ScoringVersion::V2 => {
            let mut weights: Vec<f64> = clauses.iter().map(|c| c.weight).collect();
            weights.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
            let top: f64 = weights.iter().take(V2_TOP_N).sum();
            let rest: f64 = weights.iter().skip(V2_TOP_N).sum();
            (top + V2_REST_SCALE * rest, Some(raw_sum))
        }
    };

    let keyword_score = if clause_score == 0.0 && !keywords.is_empty() {
        KEYWORD_FALLBACK_WEIGHT * keywords.len() as f64
    } else {
        0.0
    };

    let entity_bonus = if has_entity { ENTITY_BONUS } else { 0.0 };
    let score = clause_score + keyword_score + entity_bonus;

    let mut top_clauses: Vec<ClauseHit> = clauses.to_vec();
    top_clauses.sort_by(|a, b| {
        b.weight
            .abs()
            .partial_cmp(&a.weight.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    top_clauses.truncate(TOP_CLAUSES);

    let breakdown = ScoreBreakdown {
        scoring_version: version.as_str().to_string(),
        clause_score,
        clause_score_raw,
        keyword_score,
        entity_bonus,
        keyword_hits: keywords.len(),
        pack_hits: pack_hits.len(),
        rule_hits: rule_hits.len(),
        top_clauses,
    };
    (score, breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::RuleKind;

    fn hit(pack: &str, rule: &str, weight: f64) -> ClauseHit {
        ClauseHit {
            pack: pack.to_string(),
            rule: rule.to_string(),
            kind: RuleKind::Phrase,
            weight,
            field: "snippet".to_string(),
            matched: "m".to_string(),
        }
    }

    #[test]
    fn v1_is_the_sum_of_clause_weights() {
        let clauses = vec![hit("a", "r1", 5.0), hit("a", "r2", 3.0), hit("b", "r3", -2.0)];
        let (score, breakdown) = score_hits(&[], &clauses, false, ScoringVersion::V1);
        assert_eq!(score, 6.0);
        assert_eq!(breakdown.clause_score, 6.0);
        assert_eq!(breakdown.keyword_score, 0.0);
        assert_eq!(breakdown.pack_hits, 2);
        assert_eq!(breakdown.rule_hits, 3);
    }

    #[test]
    fn keyword_fallback_applies_only_without_clauses() {
        let keywords = vec!["a:r1".to_string(), "a:r2".to_string()];
        let (score, breakdown) = score_hits(&keywords, &[], false, ScoringVersion::V1);
        assert_eq!(score, 6.0);
        assert_eq!(breakdown.keyword_score, 6.0);

        let clauses = vec![hit("a", "r1", 4.0)];
        let (score, breakdown) = score_hits(&keywords, &clauses, false, ScoringVersion::V1);
        assert_eq!(score, 4.0);
        assert_eq!(breakdown.keyword_score, 0.0);
    }

    #[test]
    fn entity_bonus_is_flat() {
        let clauses = vec![hit("a", "r1", 5.0)];
        let (score, breakdown) = score_hits(&[], &clauses, true, ScoringVersion::V1);
        assert_eq!(score, 15.0);
        assert_eq!(breakdown.entity_bonus, 10.0);
    }

    #[test]
    fn v2_dampens_the_tail() {
        let clauses: Vec<ClauseHit> = (0..10).map(|i| hit("a", &format!("r{}", i), 2.0)).collect();
        let (score, breakdown) = score_hits(&[], &clauses, false, ScoringVersion::V2);
        // top 6 at full value, remaining 4 halved
        assert_eq!(score, 6.0 * 2.0 + 4.0 * 1.0);
        assert_eq!(breakdown.clause_score_raw, Some(20.0));
    }

    #[test]
    fn top_clauses_rank_by_absolute_weight() {
        let clauses = vec![
            hit("a", "small", 1.0),
            hit("a", "negative", -9.0),
            hit("a", "big", 5.0),
        ];
        let (_, breakdown) = score_hits(&[], &clauses, false, ScoringVersion::V1);
        let order: Vec<&str> = breakdown.top_clauses.iter().map(|c| c.rule.as_str()).collect();
        assert_eq!(order, vec!["negative", "big", "small"]);
    }

    #[test]
    fn scoring_is_reproducible() {
        let clauses = vec![hit("a", "r1", 2.5), hit("b", "r2", 1.5)];
        let keywords = vec!["a:r1".to_string(), "b:r2".to_string()];
        let (s1, _) = score_hits(&keywords, &clauses, false, ScoringVersion::V1);
        let (s2, _) = score_hits(&keywords, &clauses, false, ScoringVersion::V1);
        assert_eq!(s1, s2);
        assert_eq!(s1, 4.0);
    }
}
