//! Connector seam for external record sources.
//!
//! A connector owns everything source-specific — pagination, retry, payload
//! shape — and yields normalized [`RawRecord`]s plus enough metadata for the
//! fingerprinter. Failures surface as a typed [`FetchError`], never a crash.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::Config;
use crate::connector_awards::AwardsConnector;
use crate::connector_file::FileConnector;
use crate::models::RawRecord;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("unexpected payload: {0}")]
    Payload(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Selection window passed to every fetch.
#[derive(Debug, Clone)]
pub struct FetchWindow {
    pub since: DateTime<Utc>,
    pub page_limit: i64,
    pub max_pages: i64,
}

/// Raw rows seen upstream vs. records that survived normalization; both are
/// reported on the ingest run.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub fetched: i64,
    pub records: Vec<RawRecord>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Source label stamped on every record this connector yields.
    fn name(&self) -> &str;

    /// One-line description shown by `lsc sources`.
    fn description(&self) -> &str;

    async fn fetch(&self, window: &FetchWindow) -> Result<FetchBatch, FetchError>;
}

/// Resolve a connector by name from configuration.
pub fn build_connector(config: &Config, name: &str) -> anyhow::Result<Box<dyn Connector>> {
    match name {
        "file" => {
            let cfg = config
                .connectors
                .file
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("file connector not configured"))?;
            Ok(Box::new(FileConnector::new(cfg.clone())))
        }
        "awards" => {
            let cfg = config
                .connectors
                .awards
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("awards connector not configured"))?;
            Ok(Box::new(AwardsConnector::new(cfg.clone())?))
        }
        other => anyhow::bail!("Unknown connector: '{}'. Available: file, awards", other),
    }
}
