//! # Leadscope CLI (`lsc`)
//!
//! The `lsc` binary drives every batch operation in the pipeline. Each
//! command is a thin invocation of the corresponding core operation and
//! finishes with a single machine-readable JSON summary line on stdout;
//! diagnostics go to stderr via `tracing`.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lsc init` | Create the primary store and run schema migrations |
//! | `lsc reset --destructive` | Drop and recreate the primary store |
//! | `lsc sources` | List configured connectors |
//! | `lsc ingest <connector>` | Fetch, fingerprint, and insert records |
//! | `lsc ontology validate <path>` | Pre-flight check a rule-pack document |
//! | `lsc ontology apply <path>` | Tag the record window |
//! | `lsc leads` | Print the current ranked lead list |
//! | `lsc snapshot create` | Freeze the ranked list |
//! | `lsc delta <from> <to>` | Compare two snapshots |
//! | `lsc reindex [--full]` | Sync the secondary full-text index |
//! | `lsc search "<query>"` | Query the secondary index |
//! | `lsc runs` | Show run ledger history |
//! | `lsc stats` | Store overview |
//! | `lsc serve` | Start the read-only HTTP query surface |

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

use leadscope::config::{self, Config};
use leadscope::db;
use leadscope::delta::compute_delta;
use leadscope::index_sync;
use leadscope::ingest::{run_ingest, IngestParams};
use leadscope::leads::{compute_leads, LeadFilters};
use leadscope::migrate;
use leadscope::ontology;
use leadscope::runs::{list_analysis_runs, list_ingest_runs};
use leadscope::scoring::ScoringVersion;
use leadscope::search::search_index;
use leadscope::server;
use leadscope::snapshot::{create_snapshot, list_snapshots, snapshot_items, SnapshotParams};
use leadscope::stats;
use leadscope::tagger::{apply_ontology, ApplyParams};

/// Leadscope — surface investigative leads from recurring scans of public
/// records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/leadscope.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lsc",
    about = "Leadscope — surface investigative leads from public-record scans",
    version,
    long_about = "Leadscope ingests normalized public records, tags them with a weighted \
    rule ontology, scores them explainably, freezes ranked lead lists into immutable \
    snapshots, and tracks how the ranked set changes between batch runs."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/leadscope.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the primary store schema. Idempotent.
    Init,

    /// Drop every primary-store table and recreate the schema.
    ///
    /// Destroys all records, runs, and snapshots. Record ids restart from 1,
    /// so the secondary index must be rebuilt with `lsc reindex --full`.
    Reset {
        /// Confirm the destructive reset.
        #[arg(long)]
        destructive: bool,
    },

    /// List configured connectors.
    Sources,

    /// Ingest records from a connector (`file` or `awards`).
    Ingest {
        /// Connector name.
        connector: String,

        /// Days of history to request.
        #[arg(long, default_value_t = 7)]
        days: i64,

        /// Records per page (connector config default when omitted).
        #[arg(long)]
        limit: Option<i64>,

        /// Maximum pages to request (connector config default when omitted).
        #[arg(long)]
        pages: Option<i64>,

        /// Fetch and count without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate or apply a rule ontology.
    Ontology {
        #[command(subcommand)]
        action: OntologyAction,
    },

    /// Print the current ranked lead list (one JSON line per lead).
    Leads {
        #[arg(long)]
        min_score: Option<f64>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        exclude_source: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
        /// Scoring version (`v1` or `v2`); config default when omitted.
        #[arg(long)]
        scoring: Option<String>,
    },

    /// Manage lead snapshots.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// Compare two snapshots and classify every membership/rank/score change.
    Delta {
        /// Baseline snapshot id.
        from: i64,
        /// Comparison snapshot id.
        to: i64,
    },

    /// Sync the secondary full-text index from the primary store.
    ///
    /// Incremental by default: loads only record ids the index has not seen.
    /// Refuses to run when the index is ahead of the store (reset detected);
    /// `--full` drops and rebuilds the index from scratch.
    Reindex {
        /// Drop and rebuild instead of incremental sync.
        #[arg(long)]
        full: bool,
    },

    /// Full-text search over the secondary index (one JSON line per hit).
    Search {
        /// FTS5 match expression.
        query: String,
        #[arg(long)]
        source: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Show run ledger history.
    Runs {
        /// `ingest` or `analysis`.
        #[arg(long, default_value = "analysis")]
        kind: String,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Store statistics overview.
    Stats,

    /// Start the read-only HTTP query surface.
    Serve,
}

#[derive(Subcommand)]
enum OntologyAction {
    /// Parse and validate a rule-pack document without touching the store.
    Validate {
        /// Path to the ontology JSON document.
        path: PathBuf,
    },

    /// Apply an ontology to every record in the window (replace-by-record).
    Apply {
        /// Path to the ontology JSON document.
        path: PathBuf,

        /// Window in days (config default when omitted).
        #[arg(long)]
        days: Option<i64>,

        /// Only tag records from this source.
        #[arg(long)]
        source: Option<String>,

        /// Records per batch (config default when omitted).
        #[arg(long)]
        batch: Option<i64>,

        /// Compute and report counts without writing hits.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Freeze the current ranked lead list into an immutable snapshot.
    Create {
        #[arg(long)]
        min_score: Option<f64>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        exclude_source: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        scoring: Option<String>,
        /// Analysis run that produced the hits being snapshotted.
        #[arg(long)]
        analysis_run_id: Option<i64>,
        /// Free-text notes stored with the snapshot.
        #[arg(long)]
        notes: Option<String>,
    },

    /// List recent snapshots.
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Print one snapshot and its ranked items.
    Show {
        /// Snapshot id.
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Ontology validation is a pure pre-flight check; it should work even
    // when no config file exists yet.
    if let Commands::Ontology {
        action: OntologyAction::Validate { path },
    } = &cli.command
    {
        let validated = ontology::load_and_validate(path)?;
        println!(
            "{}",
            json!({ "op": "ontology_validate", "status": "ok", "ontology": validated.summary() })
        );
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("{}", json!({ "op": "init", "status": "ok" }));
        }
        Commands::Reset { destructive } => {
            if !destructive {
                anyhow::bail!("reset requires --destructive confirmation");
            }
            migrate::reset_schema(&cfg).await?;
            println!("{}", json!({ "op": "reset", "status": "ok" }));
        }
        Commands::Sources => {
            list_sources(&cfg);
        }
        Commands::Ingest {
            connector,
            days,
            limit,
            pages,
            dry_run,
        } => {
            let (default_limit, default_pages) = cfg
                .connectors
                .awards
                .as_ref()
                .map(|a| (a.page_limit, a.max_pages))
                .unwrap_or((200, 1));
            let pool = db::connect(&cfg).await?;
            let outcome = run_ingest(
                &cfg,
                &pool,
                &IngestParams {
                    connector,
                    window_days: days,
                    page_limit: limit.unwrap_or(default_limit),
                    max_pages: pages.unwrap_or(default_pages),
                    dry_run,
                },
            )
            .await;
            pool.close().await;
            let outcome = outcome?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::Ontology { action } => match action {
            OntologyAction::Validate { .. } => unreachable!(),
            OntologyAction::Apply {
                path,
                days,
                source,
                batch,
                dry_run,
            } => {
                let validated = ontology::load_and_validate(&path)?;
                let pool = db::connect(&cfg).await?;
                let outcome = apply_ontology(
                    &pool,
                    &validated,
                    &ApplyParams {
                        source,
                        window_days: days.unwrap_or(cfg.tagging.window_days),
                        batch: batch.unwrap_or(cfg.tagging.batch),
                        dry_run,
                    },
                )
                .await;
                pool.close().await;
                let outcome = outcome?;
                println!("{}", serde_json::to_string(&outcome)?);
            }
        },
        Commands::Leads {
            min_score,
            source,
            exclude_source,
            limit,
            scoring,
        } => {
            let filters = lead_filters(&cfg, min_score, source, exclude_source, limit, scoring)?;
            let pool = db::connect(&cfg).await?;
            let (leads, scanned) = compute_leads(&pool, &filters).await?;
            pool.close().await;
            for lead in &leads {
                println!("{}", serde_json::to_string(lead)?);
            }
            println!(
                "{}",
                json!({ "op": "leads", "status": "ok", "scanned": scanned, "returned": leads.len() })
            );
        }
        Commands::Snapshot { action } => match action {
            SnapshotAction::Create {
                min_score,
                source,
                exclude_source,
                limit,
                scoring,
                analysis_run_id,
                notes,
            } => {
                let filters = lead_filters(&cfg, min_score, source, exclude_source, limit, scoring)?;
                let pool = db::connect(&cfg).await?;
                let outcome = create_snapshot(
                    &pool,
                    &SnapshotParams {
                        analysis_run_id,
                        filters,
                        notes,
                    },
                )
                .await;
                pool.close().await;
                let outcome = outcome?;
                println!("{}", serde_json::to_string(&outcome)?);
            }
            SnapshotAction::List { limit } => {
                let pool = db::connect(&cfg).await?;
                let snapshots = list_snapshots(&pool, limit).await?;
                pool.close().await;
                for snapshot in &snapshots {
                    println!("{}", serde_json::to_string(snapshot)?);
                }
            }
            SnapshotAction::Show { id } => {
                let pool = db::connect(&cfg).await?;
                let items = snapshot_items(&pool, id).await?;
                pool.close().await;
                for item in &items {
                    println!("{}", serde_json::to_string(item)?);
                }
                println!(
                    "{}",
                    json!({ "op": "snapshot_show", "status": "ok", "snapshot_id": id, "items": items.len() })
                );
            }
        },
        Commands::Delta { from, to } => {
            let pool = db::connect(&cfg).await?;
            let delta = compute_delta(&pool, from, to).await;
            pool.close().await;
            println!("{}", serde_json::to_string(&delta?)?);
        }
        Commands::Reindex { full } => {
            let primary = db::connect(&cfg).await?;
            let index = db::connect_index(&cfg).await?;
            let outcome = if full {
                index_sync::rebuild(&primary, &index).await
            } else {
                index_sync::sync_incremental(&primary, &index).await
            };
            primary.close().await;
            index.close().await;
            let outcome = outcome?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::Search {
            query,
            source,
            limit,
        } => {
            let index = db::connect_index(&cfg).await?;
            let hits = search_index(&index, &query, source.as_deref(), limit).await;
            index.close().await;
            let hits = hits?;
            for hit in &hits {
                println!("{}", serde_json::to_string(hit)?);
            }
            println!(
                "{}",
                json!({ "op": "search", "status": "ok", "returned": hits.len() })
            );
        }
        Commands::Runs { kind, limit } => {
            let pool = db::connect(&cfg).await?;
            match kind.as_str() {
                "ingest" => {
                    let runs = list_ingest_runs(&pool, limit).await?;
                    for run in &runs {
                        println!("{}", serde_json::to_string(run)?);
                    }
                }
                "analysis" => {
                    let runs = list_analysis_runs(&pool, limit).await?;
                    for run in &runs {
                        println!("{}", serde_json::to_string(run)?);
                    }
                }
                other => {
                    pool.close().await;
                    anyhow::bail!("unknown run kind: '{}'. Use ingest or analysis.", other);
                }
            }
            pool.close().await;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn lead_filters(
    cfg: &Config,
    min_score: Option<f64>,
    source: Option<String>,
    exclude_source: Option<String>,
    limit: Option<i64>,
    scoring: Option<String>,
) -> anyhow::Result<LeadFilters> {
    let version_str = scoring.unwrap_or_else(|| cfg.scoring.version.clone());
    let scoring_version = ScoringVersion::parse(&version_str)
        .ok_or_else(|| anyhow::anyhow!("unknown scoring version: '{}'", version_str))?;
    Ok(LeadFilters {
        min_score: min_score.unwrap_or(cfg.scoring.min_score),
        source,
        exclude_source,
        limit: limit.unwrap_or(cfg.scoring.limit),
        scan_limit: cfg.scoring.scan_limit,
        scoring_version,
    })
}

fn list_sources(cfg: &Config) {
    println!("{:<12} {:<12} DETAIL", "CONNECTOR", "STATUS");
    match &cfg.connectors.file {
        Some(file) => {
            let status = if file.path.exists() { "OK" } else { "MISSING" };
            println!("{:<12} {:<12} {}", "file", status, file.path.display());
        }
        None => println!("{:<12} {:<12} -", "file", "UNSET"),
    }
    match &cfg.connectors.awards {
        Some(awards) => println!("{:<12} {:<12} {}", "awards", "OK", awards.base_url),
        None => println!("{:<12} {:<12} -", "awards", "UNSET"),
    }
}
