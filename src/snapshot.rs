//! Lead snapshots: immutable, ordered, persisted ranked lists.
//!
//! A snapshot freezes one lead-ranker result together with the filter
//! parameters that produced it. Creation is append-only; items are written
//! once inside a transaction and never mutated, which is what makes
//! snapshot-to-snapshot deltas meaningful (a live query would be a moving
//! target).

use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::error::{LeadscopeError, Result};
use crate::leads::{compute_leads, LeadFilters};
use crate::models::{LeadSnapshot, LeadSnapshotItem, ScoreBreakdown};
use crate::runs::analysis_run_exists;

#[derive(Debug, Clone)]
pub struct SnapshotParams {
    pub analysis_run_id: Option<i64>,
    pub filters: LeadFilters,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SnapshotOutcome {
    pub snapshot_id: i64,
    pub analysis_run_id: Option<i64>,
    pub items: i64,
    pub scanned: i64,
    pub min_score: f64,
    pub scoring_version: String,
}

pub async fn create_snapshot(pool: &SqlitePool, params: &SnapshotParams) -> Result<SnapshotOutcome> {
    if let Some(run_id) = params.analysis_run_id {
        if !analysis_run_exists(pool, run_id).await? {
            return Err(LeadscopeError::Validation(format!(
                "analysis run {} not found; run `lsc ontology apply` first or omit --analysis-run-id",
                run_id
            )));
        }
    }

    let (leads, scanned) = compute_leads(pool, &params.filters).await?;
    let now = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;

    let snapshot_id = sqlx::query(
        r#"
        INSERT INTO lead_snapshots (analysis_run_id, source, exclude_source, min_score, item_limit,
                                    scan_limit, scoring_version, notes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(params.analysis_run_id)
    .bind(&params.filters.source)
    .bind(&params.filters.exclude_source)
    .bind(params.filters.min_score)
    .bind(params.filters.limit)
    .bind(params.filters.scan_limit)
    .bind(params.filters.scoring_version.as_str())
    .bind(&params.notes)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for (idx, lead) in leads.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO lead_snapshot_items (snapshot_id, record_id, fingerprint, rank, score, breakdown)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot_id)
        .bind(lead.record.id)
        .bind(&lead.record.fingerprint)
        .bind((idx + 1) as i64)
        .bind(lead.score)
        .bind(serde_json::to_string(&lead.breakdown)?)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(snapshot_id, items = leads.len(), scanned, "snapshot created");
    Ok(SnapshotOutcome {
        snapshot_id,
        analysis_run_id: params.analysis_run_id,
        items: leads.len() as i64,
        scanned,
        min_score: params.filters.min_score,
        scoring_version: params.filters.scoring_version.as_str().to_string(),
    })
}

pub async fn get_snapshot(pool: &SqlitePool, snapshot_id: i64) -> Result<Option<LeadSnapshot>> {
    let row = sqlx::query(
        r#"
        SELECT s.*, (SELECT COUNT(*) FROM lead_snapshot_items i WHERE i.snapshot_id = s.id) AS item_count
        FROM lead_snapshots s WHERE s.id = ?
        "#,
    )
    .bind(snapshot_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| snapshot_from_row(&row)))
}

pub async fn list_snapshots(pool: &SqlitePool, limit: i64) -> Result<Vec<LeadSnapshot>> {
    let rows = sqlx::query(
        r#"
        SELECT s.*, (SELECT COUNT(*) FROM lead_snapshot_items i WHERE i.snapshot_id = s.id) AS item_count
        FROM lead_snapshots s ORDER BY s.id DESC LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(snapshot_from_row).collect())
}

/// Items in rank order. Errors if the snapshot does not exist so callers
/// can distinguish "empty snapshot" from "no such snapshot".
pub async fn snapshot_items(pool: &SqlitePool, snapshot_id: i64) -> Result<Vec<LeadSnapshotItem>> {
    if get_snapshot(pool, snapshot_id).await?.is_none() {
        return Err(LeadscopeError::Validation(format!(
            "snapshot {} not found",
            snapshot_id
        )));
    }

    let rows = sqlx::query(
        r#"
        SELECT snapshot_id, record_id, fingerprint, rank, score, breakdown
        FROM lead_snapshot_items WHERE snapshot_id = ? ORDER BY rank ASC
        "#,
    )
    .bind(snapshot_id)
    .fetch_all(pool)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in &rows {
        let breakdown: ScoreBreakdown = serde_json::from_str(row.get::<String, _>("breakdown").as_str())?;
        items.push(LeadSnapshotItem {
            snapshot_id: row.get("snapshot_id"),
            record_id: row.get("record_id"),
            fingerprint: row.get("fingerprint"),
            rank: row.get("rank"),
            score: row.get("score"),
            breakdown,
        });
    }
    Ok(items)
}

fn snapshot_from_row(row: &sqlx::sqlite::SqliteRow) -> LeadSnapshot {
    LeadSnapshot {
        id: row.get("id"),
        analysis_run_id: row.get("analysis_run_id"),
        source: row.get("source"),
        exclude_source: row.get("exclude_source"),
        min_score: row.get("min_score"),
        item_limit: row.get("item_limit"),
        scan_limit: row.get("scan_limit"),
        scoring_version: row.get("scoring_version"),
        notes: row.get("notes"),
        item_count: row.get("item_count"),
        created_at: row.get("created_at"),
    }
}
