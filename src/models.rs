//! Core data models used throughout Leadscope.
//!
//! These types represent the records, rule hits, runs, and snapshots that
//! flow through the ingestion and analysis pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::ontology::RuleKind;

/// Raw observation produced by a connector before fingerprinting.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub category: String,
    pub occurred_at: Option<DateTime<Utc>>,
    pub source: String,
    pub source_url: Option<String>,
    pub doc_id: Option<String>,
    pub place_text: Option<String>,
    pub snippet: Option<String>,
    pub raw_json: Option<String>,
    pub entity_id: Option<i64>,
}

/// Normalized record stored in the primary store.
///
/// The keyword/clause columns are the only fields ever mutated after
/// insertion, and only by the tagger's replace-by-record write.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub id: i64,
    pub entity_id: Option<i64>,
    pub category: String,
    pub occurred_at: Option<i64>,
    pub source: String,
    pub source_url: Option<String>,
    pub doc_id: String,
    pub place_text: Option<String>,
    pub snippet: Option<String>,
    pub raw_json: Option<String>,
    pub keywords: Vec<String>,
    pub clauses: Vec<ClauseHit>,
    pub fingerprint: String,
    pub created_at: i64,
}

impl Record {
    /// Map a full `records` row. Older rows may carry malformed hit JSON;
    /// those decode to empty sets rather than failing the read.
    pub fn from_row(row: &SqliteRow) -> Self {
        let keywords: String = row.get("keywords");
        let clauses: String = row.get("clauses");
        Record {
            id: row.get("id"),
            entity_id: row.get("entity_id"),
            category: row.get("category"),
            occurred_at: row.get("occurred_at"),
            source: row.get("source"),
            source_url: row.get("source_url"),
            doc_id: row.get("doc_id"),
            place_text: row.get("place_text"),
            snippet: row.get("snippet"),
            raw_json: row.get("raw_json"),
            keywords: serde_json::from_str(&keywords).unwrap_or_default(),
            clauses: serde_json::from_str(&clauses).unwrap_or_default(),
            fingerprint: row.get("fingerprint"),
            created_at: row.get("created_at"),
        }
    }
}

/// One (record, rule) match with its contributing weight.
///
/// Serialized as canonical JSON on the record row; the sort order applied
/// before persistence makes re-tagging with the same ontology byte-identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseHit {
    pub pack: String,
    pub rule: String,
    pub kind: RuleKind,
    pub weight: f64,
    pub field: String,
    pub matched: String,
}

/// Explainability payload attached to every score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub scoring_version: String,
    pub clause_score: f64,
    /// Pre-dampening clause total (v2 only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clause_score_raw: Option<f64>,
    pub keyword_score: f64,
    pub entity_bonus: f64,
    pub keyword_hits: usize,
    pub pack_hits: usize,
    pub rule_hits: usize,
    /// Top contributing clauses by absolute weight.
    pub top_clauses: Vec<ClauseHit>,
}

/// A record viewed through scoring and ranking for human review.
#[derive(Debug, Clone, Serialize)]
pub struct Lead {
    pub record: Record,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// One ingestion execution, append-only.
#[derive(Debug, Clone, Serialize)]
pub struct IngestRun {
    pub id: i64,
    pub source: String,
    pub window_days: i64,
    pub page_limit: i64,
    pub max_pages: i64,
    pub fetched: i64,
    pub normalized: i64,
    pub inserted: i64,
    pub duplicates: i64,
    pub skipped: i64,
    pub status: String,
    pub error: Option<String>,
    pub started_at: i64,
    pub ended_at: Option<i64>,
}

/// One tagging execution, append-only.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRun {
    pub id: i64,
    pub source: Option<String>,
    pub window_days: i64,
    pub ontology_version: String,
    pub ontology_hash: String,
    pub dry_run: bool,
    pub scanned: i64,
    pub updated: i64,
    pub unchanged: i64,
    pub status: String,
    pub error: Option<String>,
    pub started_at: i64,
    pub ended_at: Option<i64>,
}

/// An immutable ranked lead list captured at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct LeadSnapshot {
    pub id: i64,
    pub analysis_run_id: Option<i64>,
    pub source: Option<String>,
    pub exclude_source: Option<String>,
    pub min_score: f64,
    pub item_limit: i64,
    pub scan_limit: i64,
    pub scoring_version: String,
    pub notes: Option<String>,
    pub item_count: i64,
    pub created_at: i64,
}

/// One ranked entry, exclusively owned by its snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LeadSnapshotItem {
    pub snapshot_id: i64,
    pub record_id: i64,
    pub fingerprint: String,
    pub rank: i64,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Run status values shared by both ledgers.
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_PARTIAL: &str = "partial";
