//! Primary store schema lifecycle.
//!
//! Migrations are idempotent and run under a cooperative advisory lock so
//! concurrent processes (container replicas starting together) never run
//! conflicting DDL. A contender waits and retries; it never proceeds
//! unlocked.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::config::Config;
use crate::db;
use crate::error::LeadscopeError;

const LOCK_RETRY_BASE_MS: u64 = 250;
const LOCK_MAX_WAIT_MS: u64 = 10_000;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let lock = MigrationLock::acquire(&pool).await?;
    let result = create_schema(&pool).await;
    lock.release(&pool).await?;
    result?;
    pool.close().await;
    Ok(())
}

/// Drop every primary-store table and recreate the schema. Record ids
/// restart from 1, which is exactly the situation the index synchronizer's
/// regression check exists for.
pub async fn reset_schema(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let lock = MigrationLock::acquire(&pool).await?;
    warn!("dropping all primary store tables at {}", config.db.path.display());
    let result = async {
        for table in [
            "lead_snapshot_items",
            "lead_snapshots",
            "analysis_runs",
            "ingest_runs",
            "records",
        ] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&pool)
                .await?;
        }
        create_schema(&pool).await
    }
    .await;
    lock.release(&pool).await?;
    result?;
    pool.close().await;
    Ok(())
}

/// Cooperative advisory lock backed by a single-row table. The row is
/// claimed atomically; whoever inserts it owns the lock until release.
struct MigrationLock {
    holder: String,
}

impl MigrationLock {
    async fn acquire(pool: &SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS migration_lock (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                holder TEXT NOT NULL,
                acquired_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        let holder = format!(
            "{}:{}",
            std::process::id(),
            chrono::Utc::now().timestamp_millis()
        );

        let mut waited_ms: u64 = 0;
        let mut delay_ms = LOCK_RETRY_BASE_MS;
        loop {
            let claimed = sqlx::query(
                "INSERT INTO migration_lock (id, holder, acquired_at) VALUES (1, ?, ?) \
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(&holder)
            .bind(chrono::Utc::now().timestamp())
            .execute(pool)
            .await?
            .rows_affected();

            if claimed == 1 {
                debug!(holder = %holder, "migration lock acquired");
                return Ok(Self { holder });
            }

            if waited_ms >= LOCK_MAX_WAIT_MS {
                return Err(LeadscopeError::LockContention { waited_ms }.into());
            }
            debug!(waited_ms, "migration lock held elsewhere, retrying");
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            waited_ms += delay_ms;
            delay_ms = (delay_ms * 2).min(2_000);
        }
    }

    async fn release(&self, pool: &SqlitePool) -> Result<()> {
        sqlx::query("DELETE FROM migration_lock WHERE id = 1 AND holder = ?")
            .bind(&self.holder)
            .execute(pool)
            .await?;
        Ok(())
    }
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Records: keyword/clause columns are the only post-insert mutation
    // point (tagger replace-by-record). AUTOINCREMENT keeps ids monotonic
    // for the index cursor.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER,
            category TEXT NOT NULL,
            occurred_at INTEGER,
            source TEXT NOT NULL,
            source_url TEXT,
            doc_id TEXT NOT NULL,
            place_text TEXT,
            snippet TEXT,
            raw_json TEXT,
            keywords TEXT NOT NULL DEFAULT '[]',
            clauses TEXT NOT NULL DEFAULT '[]',
            fingerprint TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            window_days INTEGER NOT NULL,
            page_limit INTEGER NOT NULL,
            max_pages INTEGER NOT NULL,
            fetched INTEGER NOT NULL DEFAULT 0,
            normalized INTEGER NOT NULL DEFAULT 0,
            inserted INTEGER NOT NULL DEFAULT 0,
            duplicates INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            error TEXT,
            started_at INTEGER NOT NULL,
            ended_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT,
            window_days INTEGER NOT NULL,
            ontology_version TEXT NOT NULL,
            ontology_hash TEXT NOT NULL,
            dry_run INTEGER NOT NULL DEFAULT 0,
            scanned INTEGER NOT NULL DEFAULT 0,
            updated INTEGER NOT NULL DEFAULT 0,
            unchanged INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            error TEXT,
            started_at INTEGER NOT NULL,
            ended_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lead_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            analysis_run_id INTEGER REFERENCES analysis_runs(id),
            source TEXT,
            exclude_source TEXT,
            min_score REAL NOT NULL,
            item_limit INTEGER NOT NULL,
            scan_limit INTEGER NOT NULL,
            scoring_version TEXT NOT NULL,
            notes TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Items are written once at snapshot creation and never mutated.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lead_snapshot_items (
            snapshot_id INTEGER NOT NULL REFERENCES lead_snapshots(id),
            record_id INTEGER NOT NULL,
            fingerprint TEXT NOT NULL,
            rank INTEGER NOT NULL,
            score REAL NOT NULL,
            breakdown TEXT NOT NULL,
            PRIMARY KEY (snapshot_id, record_id),
            UNIQUE (snapshot_id, rank)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_source ON records(source)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_occurred_at ON records(occurred_at)")
        .execute(pool)
        .await?;

    Ok(())
}
