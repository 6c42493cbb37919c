//! Store statistics overview.
//!
//! Quick summary of what the pipeline has accumulated: record counts, tag
//! coverage, snapshots, and run history. Used by `lsc stats` to give
//! confidence that ingestion and tagging are doing what they should.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
        .fetch_one(&pool)
        .await?;
    let tagged_records: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE clauses != '[]'")
            .fetch_one(&pool)
            .await?;
    let snapshots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lead_snapshots")
        .fetch_one(&pool)
        .await?;
    let ingest_runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingest_runs")
        .fetch_one(&pool)
        .await?;
    let analysis_runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis_runs")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path).map(|m| m.len()).unwrap_or(0);

    println!("Leadscope — Store Stats");
    println!("=======================");
    println!();
    println!("  Database:       {}", config.db.path.display());
    println!("  Size:           {} bytes", db_size);
    println!();
    println!("  Records:        {}", total_records);
    println!(
        "  Tagged:         {} / {} ({}%)",
        tagged_records,
        total_records,
        if total_records > 0 {
            (tagged_records * 100) / total_records
        } else {
            0
        }
    );
    println!("  Snapshots:      {}", snapshots);
    println!("  Ingest runs:    {}", ingest_runs);
    println!("  Analysis runs:  {}", analysis_runs);

    let per_source = sqlx::query(
        r#"
        SELECT source, COUNT(*) AS records, MAX(created_at) AS last_ingested
        FROM records GROUP BY source ORDER BY records DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !per_source.is_empty() {
        println!();
        println!("  {:<16} {:>8}  LAST INGESTED", "SOURCE", "RECORDS");
        for row in &per_source {
            let source: String = row.get("source");
            let records: i64 = row.get("records");
            let last: Option<i64> = row.get("last_ingested");
            let last = last
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  {:<16} {:>8}  {}", source, records, last);
        }
    }

    pool.close().await;
    Ok(())
}
