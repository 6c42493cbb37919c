//! Lead ranking — a read-time projection, never persisted state.
//!
//! Scans the newest records, scores each from its persisted hits, and
//! returns the ones clearing the score floor in a stable order: score
//! descending, record id ascending on ties. Repeated calls against
//! unchanged data always return the same order.

use sqlx::SqlitePool;

use crate::error::{LeadscopeError, Result};
use crate::models::{Lead, Record};
use crate::scoring::{score_hits, ScoringVersion};

#[derive(Debug, Clone)]
pub struct LeadFilters {
    pub min_score: f64,
    pub source: Option<String>,
    pub exclude_source: Option<String>,
    pub limit: i64,
    pub scan_limit: i64,
    pub scoring_version: ScoringVersion,
}

impl LeadFilters {
    pub fn validate(&self) -> Result<()> {
        if !self.min_score.is_finite() {
            return Err(LeadscopeError::Validation("min_score must be finite".into()));
        }
        if self.limit < 1 {
            return Err(LeadscopeError::Validation("limit must be >= 1".into()));
        }
        if self.scan_limit < 1 {
            return Err(LeadscopeError::Validation("scan_limit must be >= 1".into()));
        }
        Ok(())
    }
}

/// Compute the ranked lead list. Returns the leads plus the number of
/// records scanned before filtering.
pub async fn compute_leads(pool: &SqlitePool, filters: &LeadFilters) -> Result<(Vec<Lead>, i64)> {
    filters.validate()?;

    let rows = sqlx::query("SELECT * FROM records ORDER BY id DESC LIMIT ?")
        .bind(filters.scan_limit)
        .fetch_all(pool)
        .await?;
    let scanned = rows.len() as i64;

    let mut leads: Vec<Lead> = Vec::new();
    for row in &rows {
        let record = Record::from_row(row);
        if let Some(source) = &filters.source {
            if &record.source != source {
                continue;
            }
        }
        if let Some(excluded) = &filters.exclude_source {
            if &record.source == excluded {
                continue;
            }
        }

        let (score, breakdown) = score_hits(
            &record.keywords,
            &record.clauses,
            record.entity_id.is_some(),
            filters.scoring_version,
        );
        if score >= filters.min_score {
            leads.push(Lead {
                record,
                score,
                breakdown,
            });
        }
    }

    Ok((rank_leads(leads, filters.limit), scanned))
}

/// Stable ordering: score descending, then record id ascending.
pub fn rank_leads(mut leads: Vec<Lead>, limit: i64) -> Vec<Lead> {
    leads.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    leads.truncate(limit.max(0) as usize);
    leads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreBreakdown;

    fn lead(id: i64, score: f64) -> Lead {
        Lead {
            record: Record {
                id,
                entity_id: None,
                category: "procurement".into(),
                occurred_at: None,
                source: "awards".into(),
                source_url: None,
                doc_id: format!("D-{}", id),
                place_text: None,
                snippet: None,
                raw_json: None,
                keywords: vec![],
                clauses: vec![],
                fingerprint: format!("fp-{}", id),
                created_at: 0,
            },
            score,
            breakdown: ScoreBreakdown {
                scoring_version: "v1".into(),
                clause_score: score,
                clause_score_raw: None,
                keyword_score: 0.0,
                entity_bonus: 0.0,
                keyword_hits: 0,
                pack_hits: 0,
                rule_hits: 0,
                top_clauses: vec![],
            },
        }
    }

    #[test]
    fn orders_by_score_desc_then_id_asc() {
        let ranked = rank_leads(vec![lead(3, 5.0), lead(1, 5.0), lead(2, 8.0)], 10);
        let ids: Vec<i64> = ranked.iter().map(|l| l.record.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn truncates_to_limit_after_sorting() {
        let ranked = rank_leads(vec![lead(1, 1.0), lead(2, 2.0), lead(3, 3.0)], 2);
        let ids: Vec<i64> = ranked.iter().map(|l| l.record.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn ranking_is_stable_across_calls() {
        let input = vec![lead(5, 2.0), lead(4, 2.0), lead(9, 2.0)];
        let a: Vec<i64> = rank_leads(input.clone(), 10).iter().map(|l| l.record.id).collect();
        let b: Vec<i64> = rank_leads(input, 10).iter().map(|l| l.record.id).collect();
        assert_eq!(a, b);
        assert_eq!(a, vec![4, 5, 9]);
    }
}
