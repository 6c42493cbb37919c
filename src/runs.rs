//! Append-only run ledger.
//!
//! Every ingestion or tagging execution gets exactly one row: parameters at
//! start, counters and status at completion, never touched again. The ledger
//! exists for audit and reproducibility; nothing reads it to make control
//! decisions.

use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::models::{AnalysisRun, IngestRun, STATUS_RUNNING};

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestCounters {
    pub fetched: i64,
    pub normalized: i64,
    pub inserted: i64,
    pub duplicates: i64,
    pub skipped: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisCounters {
    pub scanned: i64,
    pub updated: i64,
    pub unchanged: i64,
}

pub async fn start_ingest_run(
    pool: &SqlitePool,
    source: &str,
    window_days: i64,
    page_limit: i64,
    max_pages: i64,
) -> Result<i64> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        INSERT INTO ingest_runs (source, window_days, page_limit, max_pages, fetched, normalized,
                                 inserted, duplicates, skipped, status, started_at)
        VALUES (?, ?, ?, ?, 0, 0, 0, 0, 0, ?, ?)
        "#,
    )
    .bind(source)
    .bind(window_days)
    .bind(page_limit)
    .bind(max_pages)
    .bind(STATUS_RUNNING)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn finish_ingest_run(
    pool: &SqlitePool,
    run_id: i64,
    counters: &IngestCounters,
    status: &str,
    error: Option<&str>,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        UPDATE ingest_runs
        SET fetched = ?, normalized = ?, inserted = ?, duplicates = ?, skipped = ?,
            status = ?, error = ?, ended_at = ?
        WHERE id = ?
        "#,
    )
    .bind(counters.fetched)
    .bind(counters.normalized)
    .bind(counters.inserted)
    .bind(counters.duplicates)
    .bind(counters.skipped)
    .bind(status)
    .bind(error)
    .bind(now)
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn start_analysis_run(
    pool: &SqlitePool,
    source: Option<&str>,
    window_days: i64,
    ontology_version: &str,
    ontology_hash: &str,
    dry_run: bool,
) -> Result<i64> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        INSERT INTO analysis_runs (source, window_days, ontology_version, ontology_hash, dry_run,
                                   scanned, updated, unchanged, status, started_at)
        VALUES (?, ?, ?, ?, ?, 0, 0, 0, ?, ?)
        "#,
    )
    .bind(source)
    .bind(window_days)
    .bind(ontology_version)
    .bind(ontology_hash)
    .bind(dry_run)
    .bind(STATUS_RUNNING)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn finish_analysis_run(
    pool: &SqlitePool,
    run_id: i64,
    counters: &AnalysisCounters,
    status: &str,
    error: Option<&str>,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        UPDATE analysis_runs
        SET scanned = ?, updated = ?, unchanged = ?, status = ?, error = ?, ended_at = ?
        WHERE id = ?
        "#,
    )
    .bind(counters.scanned)
    .bind(counters.updated)
    .bind(counters.unchanged)
    .bind(status)
    .bind(error)
    .bind(now)
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn analysis_run_exists(pool: &SqlitePool, run_id: i64) -> Result<bool> {
    let row: Option<i64> = sqlx::query_scalar("SELECT id FROM analysis_runs WHERE id = ?")
        .bind(run_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub async fn list_ingest_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<IngestRun>> {
    let rows = sqlx::query(
        r#"
        SELECT id, source, window_days, page_limit, max_pages, fetched, normalized, inserted,
               duplicates, skipped, status, error, started_at, ended_at
        FROM ingest_runs ORDER BY id DESC LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| IngestRun {
            id: row.get("id"),
            source: row.get("source"),
            window_days: row.get("window_days"),
            page_limit: row.get("page_limit"),
            max_pages: row.get("max_pages"),
            fetched: row.get("fetched"),
            normalized: row.get("normalized"),
            inserted: row.get("inserted"),
            duplicates: row.get("duplicates"),
            skipped: row.get("skipped"),
            status: row.get("status"),
            error: row.get("error"),
            started_at: row.get("started_at"),
            ended_at: row.get("ended_at"),
        })
        .collect())
}

pub async fn list_analysis_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<AnalysisRun>> {
    let rows = sqlx::query(
        r#"
        SELECT id, source, window_days, ontology_version, ontology_hash, dry_run,
               scanned, updated, unchanged, status, error, started_at, ended_at
        FROM analysis_runs ORDER BY id DESC LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| AnalysisRun {
            id: row.get("id"),
            source: row.get("source"),
            window_days: row.get("window_days"),
            ontology_version: row.get("ontology_version"),
            ontology_hash: row.get("ontology_hash"),
            dry_run: row.get("dry_run"),
            scanned: row.get("scanned"),
            updated: row.get("updated"),
            unchanged: row.get("unchanged"),
            status: row.get("status"),
            error: row.get("error"),
            started_at: row.get("started_at"),
            ended_at: row.get("ended_at"),
        })
        .collect())
}
