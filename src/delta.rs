//! Snapshot deltas.
//!
//! Compares two persisted snapshots keyed by record fingerprint and
//! classifies every member of their union into exactly one of new, removed,
//! changed, or unchanged. The comparison is pure — it performs no writes and
//! only reads already-frozen items.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{LeadscopeError, Result};
use crate::models::LeadSnapshotItem;
use crate::snapshot::{get_snapshot, snapshot_items};

#[derive(Debug, Clone, Serialize)]
pub struct DeltaCounts {
    pub from: usize,
    pub to: usize,
    pub new: usize,
    pub removed: usize,
    pub changed: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeltaEntry {
    pub fingerprint: String,
    pub record_id: i64,
    pub rank: i64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankScore {
    pub rank: i64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangedEntry {
    pub fingerprint: String,
    pub record_id: i64,
    pub from: RankScore,
    pub to: RankScore,
    pub rank_delta: i64,
    pub score_delta: f64,
}

/// Unchanged members are reported as a count, not enumerated, to keep the
/// output bounded.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDelta {
    pub from_snapshot_id: i64,
    pub to_snapshot_id: i64,
    pub counts: DeltaCounts,
    pub new: Vec<DeltaEntry>,
    pub removed: Vec<DeltaEntry>,
    pub changed: Vec<ChangedEntry>,
}

pub async fn compute_delta(
    pool: &SqlitePool,
    from_snapshot_id: i64,
    to_snapshot_id: i64,
) -> Result<SnapshotDelta> {
    for id in [from_snapshot_id, to_snapshot_id] {
        if get_snapshot(pool, id).await?.is_none() {
            return Err(LeadscopeError::Validation(format!("snapshot {} not found", id)));
        }
    }

    let from_items = snapshot_items(pool, from_snapshot_id).await?;
    let to_items = snapshot_items(pool, to_snapshot_id).await?;

    Ok(diff_items(
        from_snapshot_id,
        to_snapshot_id,
        &from_items,
        &to_items,
    ))
}

/// Classify the union of two item lists. Output ordering mirrors the lead
/// ranker: each list follows the rank order of the snapshot it refers to
/// (`to` for new and changed, `from` for removed).
pub fn diff_items(
    from_snapshot_id: i64,
    to_snapshot_id: i64,
    from_items: &[LeadSnapshotItem],
    to_items: &[LeadSnapshotItem],
) -> SnapshotDelta {
    use std::collections::HashMap;

    let from_by_fp: HashMap<&str, &LeadSnapshotItem> = from_items
        .iter()
        .map(|i| (i.fingerprint.as_str(), i))
        .collect();
    let to_by_fp: HashMap<&str, &LeadSnapshotItem> =
        to_items.iter().map(|i| (i.fingerprint.as_str(), i)).collect();

    let mut new = Vec::new();
    let mut changed = Vec::new();
    let mut unchanged = 0usize;

    for item in to_items {
        match from_by_fp.get(item.fingerprint.as_str()) {
            None => new.push(entry(item)),
            Some(old) => {
                if old.score != item.score || old.rank != item.rank {
                    changed.push(ChangedEntry {
                        fingerprint: item.fingerprint.clone(),
                        record_id: item.record_id,
                        from: RankScore {
                            rank: old.rank,
                            score: old.score,
                        },
                        to: RankScore {
                            rank: item.rank,
                            score: item.score,
                        },
                        rank_delta: item.rank - old.rank,
                        score_delta: item.score - old.score,
                    });
                } else {
                    unchanged += 1;
                }
            }
        }
    }

    let removed: Vec<DeltaEntry> = from_items
        .iter()
        .filter(|i| !to_by_fp.contains_key(i.fingerprint.as_str()))
        .map(|i| entry(i))
        .collect();

    SnapshotDelta {
        from_snapshot_id,
        to_snapshot_id,
        counts: DeltaCounts {
            from: from_items.len(),
            to: to_items.len(),
            new: new.len(),
            removed: removed.len(),
            changed: changed.len(),
            unchanged,
        },
        new,
        removed,
        changed,
    }
}

fn entry(item: &LeadSnapshotItem) -> DeltaEntry {
    DeltaEntry {
        fingerprint: item.fingerprint.clone(),
        record_id: item.record_id,
        rank: item.rank,
        score: item.score,
    }
}
