//! # Leadscope
//!
//! A batch pipeline for surfacing investigative leads from public records.
//!
//! Leadscope ingests normalized observations from record sources, tags them
//! with a versioned rule ontology, scores them explainably, freezes ranked
//! lead lists into immutable snapshots, and diffs those snapshots across
//! runs. The primary SQLite store is the source of truth; a second,
//! disposable SQLite file carries the FTS5 search projection.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Connectors │──▶│ Fingerprint  │──▶│  Primary  │
//! │ awards/file│   │ + dedupe     │   │   store   │
//! └────────────┘   └──────────────┘   └─────┬─────┘
//!                                           │
//!            ┌──────────┬──────────┬────────┤
//!            ▼          ▼          ▼        ▼
//!       ┌────────┐ ┌─────────┐ ┌───────┐ ┌─────────┐
//!       │ Tagger │ │ Leads / │ │ Delta │ │  FTS5   │
//!       │        │ │Snapshot │ │       │ │  index  │
//!       └────────┘ └─────────┘ └───────┘ └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lsc init                              # create the primary store
//! lsc ingest file                       # ingest a record file
//! lsc ontology apply rules.json         # tag the window
//! lsc snapshot create --min-score 1     # freeze the ranked list
//! lsc delta 1 2                         # compare two snapshots
//! lsc reindex                           # sync the search index
//! ```

pub mod config;
pub mod connector;
pub mod connector_awards;
pub mod connector_file;
pub mod db;
pub mod delta;
pub mod error;
pub mod fingerprint;
pub mod index_sync;
pub mod ingest;
pub mod leads;
pub mod migrate;
pub mod models;
pub mod ontology;
pub mod runs;
pub mod scoring;
pub mod search;
pub mod server;
pub mod snapshot;
pub mod stats;
pub mod tagger;
