use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub tagging: TaggingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Location of the secondary full-text index. Disposable: deleting the file
/// and running `lsc reindex --full` reconstructs it from the primary store.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaggingConfig {
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_batch")]
    pub batch: i64,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            batch: default_batch(),
        }
    }
}

fn default_window_days() -> i64 {
    30
}
fn default_batch() -> i64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_scoring_version")]
    pub version: String,
    #[serde(default = "default_scan_limit")]
    pub scan_limit: i64,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_lead_limit")]
    pub limit: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            version: default_scoring_version(),
            scan_limit: default_scan_limit(),
            min_score: default_min_score(),
            limit: default_lead_limit(),
        }
    }
}

fn default_scoring_version() -> String {
    "v1".to_string()
}
fn default_scan_limit() -> i64 {
    5000
}
fn default_min_score() -> f64 {
    1.0
}
fn default_lead_limit() -> i64 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    pub file: Option<FileConnectorConfig>,
    pub awards: Option<AwardsConnectorConfig>,
}

/// Newline-delimited JSON records read from a local path. Used for fixture
/// replays and tests; mirrors the shape remote connectors produce.
#[derive(Debug, Deserialize, Clone)]
pub struct FileConnectorConfig {
    pub path: PathBuf,
    #[serde(default = "default_file_source")]
    pub source: String,
}

fn default_file_source() -> String {
    "file".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AwardsConnectorConfig {
    pub base_url: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: i64,
    #[serde(default = "default_max_pages")]
    pub max_pages: i64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_page_limit() -> i64 {
    200
}
fn default_max_pages() -> i64 {
    1
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.db.path == config.index.path {
        anyhow::bail!("db.path and index.path must be different files");
    }

    if config.tagging.window_days < 1 {
        anyhow::bail!("tagging.window_days must be >= 1");
    }
    if config.tagging.batch < 1 {
        anyhow::bail!("tagging.batch must be >= 1");
    }

    match config.scoring.version.as_str() {
        "v1" | "v2" => {}
        other => anyhow::bail!("Unknown scoring version: '{}'. Must be v1 or v2.", other),
    }
    if config.scoring.scan_limit < 1 {
        anyhow::bail!("scoring.scan_limit must be >= 1");
    }
    if config.scoring.limit < 1 {
        anyhow::bail!("scoring.limit must be >= 1");
    }
    if !config.scoring.min_score.is_finite() {
        anyhow::bail!("scoring.min_score must be finite");
    }

    if let Some(awards) = &config.connectors.awards {
        if awards.page_limit < 1 || awards.page_limit > 500 {
            anyhow::bail!("connectors.awards.page_limit must be in 1..=500");
        }
        if awards.max_pages < 1 {
            anyhow::bail!("connectors.awards.max_pages must be >= 1");
        }
    }

    Ok(config)
}
