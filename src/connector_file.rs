//! Local file connector.
//!
//! Reads newline-delimited JSON records from a configured path. Used for
//! fixture replays and the integration tests; the line shape mirrors what
//! remote connectors produce after normalization.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::config::FileConnectorConfig;
use crate::connector::{Connector, FetchBatch, FetchError, FetchWindow};
use crate::models::RawRecord;

pub struct FileConnector {
    config: FileConnectorConfig,
}

/// One NDJSON line. Unknown keys are ignored so fixture files can carry
/// source-specific extras.
#[derive(Debug, Deserialize)]
struct FileRecord {
    category: String,
    #[serde(default)]
    occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    doc_id: Option<String>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    place_text: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    entity_id: Option<i64>,
}

impl FileConnector {
    pub fn new(config: FileConnectorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for FileConnector {
    fn name(&self) -> &str {
        &self.config.source
    }

    fn description(&self) -> &str {
        "newline-delimited JSON records from a local file"
    }

    async fn fetch(&self, window: &FetchWindow) -> Result<FetchBatch, FetchError> {
        let content = std::fs::read_to_string(&self.config.path)?;
        let cap = (window.page_limit * window.max_pages).max(0) as usize;

        let mut batch = FetchBatch::default();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            batch.fetched += 1;

            let parsed: FileRecord = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "skipping malformed record line");
                    continue;
                }
            };

            // Window filter: lines without a timestamp are kept, mirroring
            // records whose occurrence time is unknown at ingest.
            if let Some(occurred) = parsed.occurred_at {
                if occurred < window.since {
                    continue;
                }
            }

            batch.records.push(RawRecord {
                category: parsed.category,
                occurred_at: parsed.occurred_at,
                source: self.config.source.clone(),
                source_url: parsed.source_url,
                doc_id: parsed.doc_id,
                place_text: parsed.place_text,
                snippet: parsed.snippet,
                raw_json: Some(line.to_string()),
                entity_id: parsed.entity_id,
            });

            if batch.records.len() >= cap {
                break;
            }
        }

        Ok(batch)
    }
}
