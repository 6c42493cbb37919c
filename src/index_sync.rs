//! Secondary index synchronization.
//!
//! Projects primary-store records into a disposable FTS5 index in a second
//! database file. Document identity in the index is the record fingerprint
//! (stable across reindexing); the numeric `record_id` column exists purely
//! to drive incremental selection.
//!
//! Incremental sync is monotonic: it loads strictly greater record ids than
//! the index has seen and refuses to run when the cursor is ahead of the
//! primary store — that means the store was reset while the index was not,
//! and only a full rebuild is correct.

use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::error::{LeadscopeError, Result};
use crate::models::Record;

const BATCH: i64 = 500;

#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncOutcome {
    pub mode: String,
    pub indexed: i64,
    pub cursor: Option<i64>,
}

/// Create the FTS5 table if missing. FTS5 CREATE is not idempotent
/// natively, so existence is checked first.
pub async fn ensure_index(index: &SqlitePool) -> Result<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='records_fts'",
    )
    .fetch_one(index)
    .await?;

    if !exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE records_fts USING fts5(
                fingerprint UNINDEXED,
                record_id UNINDEXED,
                category,
                source,
                doc_id,
                place_text,
                snippet,
                keywords
            )
            "#,
        )
        .execute(index)
        .await?;
    }
    Ok(())
}

/// Drop and recreate the index, then load every record. Required after a
/// mapping change or a primary-store reset.
pub async fn rebuild(primary: &SqlitePool, index: &SqlitePool) -> Result<SyncOutcome> {
    sqlx::query("DROP TABLE IF EXISTS records_fts")
        .execute(index)
        .await?;
    ensure_index(index).await?;

    let indexed = load_from(primary, index, 0).await?;
    let cursor = index_cursor(index).await?;
    info!(indexed, "index rebuilt");
    Ok(SyncOutcome {
        mode: "full".to_string(),
        indexed,
        cursor,
    })
}

/// Load only records with ids strictly greater than the index cursor.
pub async fn sync_incremental(primary: &SqlitePool, index: &SqlitePool) -> Result<SyncOutcome> {
    ensure_index(index).await?;

    let cursor = index_cursor(index).await?.unwrap_or(0);
    let primary_max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM records")
        .fetch_one(primary)
        .await?;
    let primary_max = primary_max.unwrap_or(0);

    if cursor > primary_max {
        // Never silently "fix" this: the operator must decide to rebuild.
        warn!(cursor, primary_max, "index is ahead of the primary store");
        return Err(LeadscopeError::IndexRegression {
            index_cursor: cursor,
            primary_max,
        });
    }

    let indexed = load_from(primary, index, cursor).await?;
    let cursor = index_cursor(index).await?;
    info!(indexed, ?cursor, "incremental sync complete");
    Ok(SyncOutcome {
        mode: "incremental".to_string(),
        indexed,
        cursor,
    })
}

/// Highest record id present in the index, if any.
pub async fn index_cursor(index: &SqlitePool) -> Result<Option<i64>> {
    let cursor: Option<i64> =
        sqlx::query_scalar("SELECT MAX(CAST(record_id AS INTEGER)) FROM records_fts")
            .fetch_one(index)
            .await?;
    Ok(cursor)
}

pub async fn index_document_count(index: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records_fts")
        .fetch_one(index)
        .await?;
    Ok(count)
}

async fn load_from(primary: &SqlitePool, index: &SqlitePool, mut after_id: i64) -> Result<i64> {
    let mut indexed: i64 = 0;

    loop {
        let rows = sqlx::query("SELECT * FROM records WHERE id > ? ORDER BY id ASC LIMIT ?")
            .bind(after_id)
            .bind(BATCH)
            .fetch_all(primary)
            .await?;
        if rows.is_empty() {
            return Ok(indexed);
        }

        let mut tx = index.begin().await?;
        for row in &rows {
            let record = Record::from_row(row);
            after_id = record.id;
            sqlx::query(
                r#"
                INSERT INTO records_fts (fingerprint, record_id, category, source, doc_id,
                                         place_text, snippet, keywords)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.fingerprint)
            .bind(record.id.to_string())
            .bind(&record.category)
            .bind(&record.source)
            .bind(&record.doc_id)
            .bind(record.place_text.as_deref().unwrap_or(""))
            .bind(record.snippet.as_deref().unwrap_or(""))
            .bind(record.keywords.join(" "))
            .execute(&mut *tx)
            .await?;
            indexed += 1;
        }
        tx.commit().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn primary_with_records(n: i64) -> SqlitePool {
        let pool = memory_pool().await;
        sqlx::query(
            r#"
            CREATE TABLE records (
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
        .execute(&pool)
        .await
        .unwrap();

        for i in 1..=n {
            sqlx::query(
                "INSERT INTO records (category, source, doc_id, snippet, fingerprint, created_at) \
                 VALUES ('procurement', 'awards', ?, ?, ?, 0)",
            )
            .bind(format!("D-{}", i))
            .bind(format!("snippet {}", i))
            .bind(format!("fp-{}", i))
            .execute(&pool)
            .await
            .unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn rebuild_loads_everything() {
        let primary = primary_with_records(3).await;
        let index = memory_pool().await;

        let outcome = rebuild(&primary, &index).await.unwrap();
        assert_eq!(outcome.indexed, 3);
        assert_eq!(outcome.cursor, Some(3));
        assert_eq!(index_document_count(&index).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn incremental_loads_only_new_ids() {
        let primary = primary_with_records(2).await;
        let index = memory_pool().await;
        rebuild(&primary, &index).await.unwrap();

        sqlx::query(
            "INSERT INTO records (category, source, doc_id, snippet, fingerprint, created_at) \
             VALUES ('procurement', 'awards', 'D-3', 'snippet 3', 'fp-3', 0)",
        )
        .execute(&primary)
        .await
        .unwrap();

        let outcome = sync_incremental(&primary, &index).await.unwrap();
        assert_eq!(outcome.indexed, 1);
        assert_eq!(outcome.cursor, Some(3));

        // Re-running is a no-op, not a duplicate load.
        let outcome = sync_incremental(&primary, &index).await.unwrap();
        assert_eq!(outcome.indexed, 0);
        assert_eq!(index_document_count(&index).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn regression_is_refused_not_repaired() {
        let primary = primary_with_records(5).await;
        let index = memory_pool().await;
        rebuild(&primary, &index).await.unwrap();

        // Simulate a destructive primary reset: ids restart below the cursor.
        sqlx::query("DELETE FROM records").execute(&primary).await.unwrap();
        sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'records'")
            .execute(&primary)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO records (category, source, doc_id, snippet, fingerprint, created_at) \
             VALUES ('procurement', 'awards', 'D-1', 'fresh', 'fp-new-1', 0)",
        )
        .execute(&primary)
        .await
        .unwrap();

        match sync_incremental(&primary, &index).await {
            Err(LeadscopeError::IndexRegression {
                index_cursor,
                primary_max,
            }) => {
                assert_eq!(index_cursor, 5);
                assert_eq!(primary_max, 1);
            }
            other => panic!("expected IndexRegression, got {:?}", other.map(|o| o.mode)),
        }

        // A full rebuild is the sanctioned way out.
        let outcome = rebuild(&primary, &index).await.unwrap();
        assert_eq!(outcome.indexed, 1);
        assert_eq!(outcome.cursor, Some(1));
    }
}
