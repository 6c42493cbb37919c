//! Full-text queries over the secondary index.
//!
//! Read-only view proving the projection works; the primary store stays the
//! source of truth for everything else.

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::error::{LeadscopeError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub fingerprint: String,
    pub record_id: i64,
    pub category: String,
    pub source: String,
    pub doc_id: String,
    pub snippet: String,
    /// BM25 rank; lower is better.
    pub rank_score: f64,
}

pub async fn search_index(
    index: &SqlitePool,
    query: &str,
    source: Option<&str>,
    limit: i64,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        return Err(LeadscopeError::Validation("query must not be empty".into()));
    }
    if limit < 1 {
        return Err(LeadscopeError::Validation("limit must be >= 1".into()));
    }

    let rows = sqlx::query(
        r#"
        SELECT fingerprint, record_id, category, source, doc_id, snippet,
               bm25(records_fts) AS rank_score
        FROM records_fts
        WHERE records_fts MATCH ?
          AND (? IS NULL OR source = ?)
        ORDER BY bm25(records_fts)
        LIMIT ?
        "#,
    )
    .bind(query)
    .bind(source)
    .bind(source)
    .bind(limit)
    .fetch_all(index)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SearchHit {
            fingerprint: row.get("fingerprint"),
            record_id: row
                .get::<String, _>("record_id")
                .parse()
                .unwrap_or_default(),
            category: row.get("category"),
            source: row.get("source"),
            doc_id: row.get("doc_id"),
            snippet: row.get("snippet"),
            rank_score: row.get("rank_score"),
        })
        .collect())
}
