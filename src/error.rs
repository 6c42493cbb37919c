//! Typed errors for the lead pipeline.
//!
//! Batch commands surface these through the run ledger (status + error text)
//! rather than letting them escape a run silently; the CLI boundary wraps
//! them in `anyhow` for display.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeadscopeError {
    /// Malformed query or command parameters, rejected before any write.
    #[error("validation error: {0}")]
    Validation(String),

    /// The ontology document failed validation. Every problem found is
    /// listed, each naming the offending pack/rule.
    #[error("ontology invalid: {}", .0.join("; "))]
    OntologyValidation(Vec<String>),

    /// A record cannot be fingerprinted because an identity-bearing field
    /// is absent or blank. Hashing a partial identity would manufacture
    /// false duplicates, so the record is skipped and counted instead.
    #[error("record is missing identity field '{0}'")]
    MissingIdentityField(&'static str),

    /// An upstream source kept failing after bounded retries. The run that
    /// hit this is marked failed with whatever counters it reached.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),

    /// The search index cursor is ahead of the primary store, which means
    /// the store was reset while the index was not. Incremental sync would
    /// misalign records; only a full rebuild is correct.
    #[error(
        "index cursor {index_cursor} is ahead of primary store max id {primary_max}; \
         run `lsc reindex --full`"
    )]
    IndexRegression { index_cursor: i64, primary_max: i64 },

    /// Another process holds the migration lock and did not release it
    /// within the bounded wait.
    #[error("migration lock held by another process after waiting {waited_ms}ms")]
    LockContention { waited_ms: u64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LeadscopeError>;
