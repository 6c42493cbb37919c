//! Procurement-awards HTTP connector.
//!
//! Pages through a spending-awards search API, normalizing each row into a
//! record. Network calls are the only place the pipeline suspends for
//! meaningful time, so every request gets bounded retry with exponential
//! backoff; tagging and snapshotting never touch the network.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::AwardsConnectorConfig;
use crate::connector::{Connector, FetchBatch, FetchError, FetchWindow};
use crate::models::RawRecord;

pub const SOURCE_NAME: &str = "awards";

const RETRY_BASE_MS: u64 = 500;

pub struct AwardsConnector {
    config: AwardsConnectorConfig,
    client: reqwest::Client,
}

impl AwardsConnector {
    pub fn new(config: AwardsConnectorConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("leadscope/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, client })
    }

    fn page_payload(&self, window: &FetchWindow, page: i64) -> Value {
        json!({
            "fields": [
                "Award ID",
                "Recipient Name",
                "Action Date",
                "Award Amount",
                "Awarding Agency",
                "Description",
                "Place of Performance"
            ],
            "filters": {
                "award_type_codes": ["A", "B", "C", "D", "IDV"],
                "time_period": [{
                    "start_date": window.since.date_naive().to_string(),
                    "end_date": Utc::now().date_naive().to_string()
                }]
            },
            "limit": window.page_limit,
            "page": page,
            "sort": "Action Date",
            "order": "desc"
        })
    }

    async fn fetch_page(&self, payload: &Value) -> Result<Value, FetchError> {
        let url = &self.config.base_url;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = self.client.post(url).json(payload).send().await;

            let retryable = match outcome {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json::<Value>()
                            .await
                            .map_err(|e| FetchError::Payload(e.to_string()));
                    }
                    if !status.is_server_error() {
                        // Client errors will not heal on retry.
                        return Err(FetchError::Http {
                            url: url.clone(),
                            message: format!("status {}", status),
                        });
                    }
                    format!("status {}", status)
                }
                Err(e) => e.to_string(),
            };

            if attempt >= self.config.max_retries {
                return Err(FetchError::Http {
                    url: url.clone(),
                    message: format!("{} (after {} attempts)", retryable, attempt),
                });
            }

            let delay = RETRY_BASE_MS * 2u64.pow(attempt - 1);
            warn!(url = %url, attempt, delay_ms = delay, error = %retryable, "retrying awards fetch");
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
    }
}

#[async_trait]
impl Connector for AwardsConnector {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn description(&self) -> &str {
        "paginated spending-awards search API"
    }

    async fn fetch(&self, window: &FetchWindow) -> Result<FetchBatch, FetchError> {
        let mut batch = FetchBatch::default();

        for page in 1..=window.max_pages {
            let payload = self.page_payload(window, page);
            debug!(page, "requesting awards page");
            let data = self.fetch_page(&payload).await?;

            let results = data
                .get("results")
                .and_then(Value::as_array)
                .ok_or_else(|| FetchError::Payload("response missing 'results' array".into()))?;
            info!(page, rows = results.len(), "fetched awards page");

            batch.fetched += results.len() as i64;
            for row in results {
                if let Some(record) = normalize_award(row) {
                    batch.records.push(record);
                }
            }

            if (results.len() as i64) < window.page_limit {
                break;
            }
        }

        Ok(batch)
    }
}

/// Normalize one API row. Rows without any document identifier are dropped
/// here; rows with one but missing other identity fields are left for the
/// fingerprinter to reject and count.
fn normalize_award(row: &Value) -> Option<RawRecord> {
    let doc_id = ["piid", "Award ID", "generated_unique_award_id"]
        .iter()
        .find_map(|k| row.get(*k).and_then(Value::as_str))
        .map(String::from)?;

    let award_id = row
        .get("generated_unique_award_id")
        .and_then(Value::as_str)
        .unwrap_or("");

    Some(RawRecord {
        category: "procurement".to_string(),
        occurred_at: row
            .get("Action Date")
            .or_else(|| row.get("action_date"))
            .and_then(Value::as_str)
            .and_then(parse_action_date),
        source: SOURCE_NAME.to_string(),
        source_url: Some(format!("https://www.usaspending.gov/award/{}", award_id)),
        doc_id: Some(doc_id),
        place_text: row
            .get("Place of Performance")
            .or_else(|| row.get("place_of_performance"))
            .and_then(Value::as_str)
            .map(String::from),
        snippet: row
            .get("Description")
            .or_else(|| row.get("description"))
            .and_then(Value::as_str)
            .map(String::from),
        raw_json: Some(row.to_string()),
        entity_id: None,
    })
}

fn parse_action_date(value: &str) -> Option<DateTime<Utc>> {
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    debug!(value, "unable to parse action date");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_a_typical_row() {
        let row = json!({
            "Award ID": "W912-24-C-0001",
            "generated_unique_award_id": "CONT_AWD_1",
            "Action Date": "2026-07-01",
            "Description": "metamaterial cloaking research",
            "Place of Performance": "Albuquerque, NM"
        });
        let record = normalize_award(&row).unwrap();
        assert_eq!(record.doc_id.as_deref(), Some("W912-24-C-0001"));
        assert_eq!(record.category, "procurement");
        assert!(record.occurred_at.is_some());
        assert_eq!(record.snippet.as_deref(), Some("metamaterial cloaking research"));
    }

    #[test]
    fn row_without_any_identifier_is_dropped() {
        let row = json!({"Description": "no ids here"});
        assert!(normalize_award(&row).is_none());
    }

    #[test]
    fn action_date_formats() {
        assert!(parse_action_date("2026-07-01").is_some());
        assert!(parse_action_date("07/01/2026").is_some());
        assert!(parse_action_date("20260701").is_some());
        assert!(parse_action_date("July 1").is_none());
    }
}
