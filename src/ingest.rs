//! Ingestion pipeline orchestration.
//!
//! Coordinates the batch flow: connector → fingerprint → conflict-free
//! insert. A duplicate fingerprint is an expected no-op, counted rather than
//! errored, which is what makes re-ingesting the same source window
//! idempotent. Every non-dry run writes one ingest run row, failure included.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::Config;
use crate::connector::{build_connector, FetchWindow};
use crate::error::LeadscopeError;
use crate::fingerprint::fingerprint_record;
use crate::models::{RawRecord, STATUS_FAILED, STATUS_PARTIAL, STATUS_SUCCESS};
use crate::runs::{finish_ingest_run, start_ingest_run, IngestCounters};

#[derive(Debug, Clone)]
pub struct IngestParams {
    pub connector: String,
    pub window_days: i64,
    pub page_limit: i64,
    pub max_pages: i64,
    pub dry_run: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestOutcome {
    pub ingest_run_id: Option<i64>,
    pub source: String,
    pub status: String,
    pub dry_run: bool,
    pub fetched: i64,
    pub normalized: i64,
    pub inserted: i64,
    pub duplicates: i64,
    pub skipped: i64,
}

pub async fn run_ingest(
    config: &Config,
    pool: &SqlitePool,
    params: &IngestParams,
) -> Result<IngestOutcome> {
    let connector = build_connector(config, &params.connector)?;
    let source = connector.name().to_string();
    let window = FetchWindow {
        since: chrono::Utc::now() - chrono::Duration::days(params.window_days.max(1)),
        page_limit: params.page_limit,
        max_pages: params.max_pages,
    };

    if params.dry_run {
        let batch = connector.fetch(&window).await.map_err(upstream_error)?;
        return Ok(IngestOutcome {
            ingest_run_id: None,
            source,
            status: STATUS_SUCCESS.to_string(),
            dry_run: true,
            fetched: batch.fetched,
            normalized: batch.records.len() as i64,
            inserted: 0,
            duplicates: 0,
            skipped: 0,
        });
    }

    let run_id = start_ingest_run(
        pool,
        &source,
        params.window_days,
        params.page_limit,
        params.max_pages,
    )
    .await?;

    let mut counters = IngestCounters::default();

    let batch = match connector.fetch(&window).await {
        Ok(batch) => batch,
        Err(e) => {
            let err = upstream_error(e);
            finish_ingest_run(pool, run_id, &counters, STATUS_FAILED, Some(&err.to_string()))
                .await?;
            return Err(err.into());
        }
    };
    counters.fetched = batch.fetched;
    counters.normalized = batch.records.len() as i64;

    for raw in &batch.records {
        match insert_record(pool, raw).await {
            Ok(true) => counters.inserted += 1,
            Ok(false) => counters.duplicates += 1,
            Err(LeadscopeError::MissingIdentityField(field)) => {
                // Unfingerprintable input: skip and count, the batch goes on.
                warn!(source = %raw.source, field, "skipping record with missing identity field");
                counters.skipped += 1;
            }
            Err(e) => {
                warn!(error = %e, "record insert failed");
                counters.skipped += 1;
            }
        }
    }

    let status = if counters.skipped > 0 {
        STATUS_PARTIAL
    } else {
        STATUS_SUCCESS
    };
    finish_ingest_run(pool, run_id, &counters, status, None).await?;
    info!(
        run_id,
        source = %source,
        fetched = counters.fetched,
        inserted = counters.inserted,
        duplicates = counters.duplicates,
        skipped = counters.skipped,
        "ingest run complete"
    );

    Ok(IngestOutcome {
        ingest_run_id: Some(run_id),
        source,
        status: status.to_string(),
        dry_run: false,
        fetched: counters.fetched,
        normalized: counters.normalized,
        inserted: counters.inserted,
        duplicates: counters.duplicates,
        skipped: counters.skipped,
    })
}

/// Insert one record keyed by its fingerprint. Returns `false` when the
/// fingerprint already exists (the conflict-ignored path).
async fn insert_record(pool: &SqlitePool, raw: &RawRecord) -> crate::error::Result<bool> {
    let fingerprint = fingerprint_record(raw)?;
    let now = chrono::Utc::now().timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO records (entity_id, category, occurred_at, source, source_url, doc_id,
                             place_text, snippet, raw_json, fingerprint, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(fingerprint) DO NOTHING
        "#,
    )
    .bind(raw.entity_id)
    .bind(&raw.category)
    .bind(raw.occurred_at.map(|t| t.timestamp()))
    .bind(&raw.source)
    .bind(&raw.source_url)
    .bind(raw.doc_id.as_deref().unwrap_or_default())
    .bind(&raw.place_text)
    .bind(&raw.snippet)
    .bind(&raw.raw_json)
    .bind(&fingerprint)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

fn upstream_error(e: crate::connector::FetchError) -> LeadscopeError {
    LeadscopeError::UpstreamFetch(e.to_string())
}
