//! Reconciliation of local and remote data.
//!
//! Two layers, both deterministic and side-effect free:
//!
//! - [`merge_collection`] reconciles two versions of one collection record
//!   by record. A deletion made locally wins outright over a remote edit;
//!   otherwise the version with the strictly greater `updated_at` wins and
//!   ties go to the remote side. Tombstones are kept in the merged output
//!   (visible reads filter them) so future merges still see the deletion.
//! - [`bundle_direction`] decides a whole-snapshot pass by comparing the
//!   `created_at` of the two bundles: the newer snapshot replaces the
//!   other wholesale. This is last-write-wins at snapshot granularity,
//!   used when the remote side is a single opaque file.

use crate::record::Record;
use crate::snapshot::Bundle;
use crate::RecordId;
use serde::Serialize;
use std::collections::BTreeMap;

/// Direction decided for a whole-snapshot pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local snapshot is newer (or the remote is absent/empty): upload it.
    Push,
    /// Remote snapshot is newer: replace every local collection with it.
    Pull,
    /// Both snapshots carry the same timestamp: nothing to transfer.
    Noop,
}

/// Counters describing what a collection merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    /// Conflicts where the local version won on `updated_at`
    pub local_wins: u64,
    /// Conflicts where the remote version won (greater timestamp or tie)
    pub remote_wins: u64,
    /// Local deletions applied over a live remote record
    pub deletions_propagated: u64,
    /// Records only the local side had
    pub local_creates: u64,
    /// Records only the remote side had
    pub remote_creates: u64,
}

impl MergeStats {
    /// Fold another collection's counters into this one.
    pub fn absorb(&mut self, other: &MergeStats) {
        self.local_wins += other.local_wins;
        self.remote_wins += other.remote_wins;
        self.deletions_propagated += other.deletions_propagated;
        self.local_creates += other.local_creates;
        self.remote_creates += other.remote_creates;
    }
}

/// Result of merging one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedCollection {
    /// The reconciled records, tombstones included, keyed by id
    pub records: BTreeMap<RecordId, Record>,
    /// What happened during the merge
    pub stats: MergeStats,
}

impl MergedCollection {
    /// The merged records as a vector, in id order.
    pub fn into_records(self) -> Vec<Record> {
        self.records.into_values().collect()
    }
}

/// Reconcile two versions of one collection, both keyed by record id.
///
/// `local` is this device's side, `remote` the counterpart from the other
/// side; either may be absent. The rules, per record id:
///
/// 1. Tombstoned locally while still live remotely: the deletion wins
///    outright, independent of the remote `updated_at`. The output is a
///    tombstoned copy of the remote record so nothing the remote added is
///    resurrected later.
/// 2. Present on both sides otherwise: the strictly greater `updated_at`
///    wins; ties keep the remote version. This also lets a *remote*
///    tombstone win (or lose) by timestamp like any other edit.
/// 3. Present on one side only: carried over unchanged, tombstones
///    included.
pub fn merge_collection(
    local: Option<&BTreeMap<RecordId, Record>>,
    remote: Option<&BTreeMap<RecordId, Record>>,
) -> MergedCollection {
    let mut records = BTreeMap::new();
    let mut stats = MergeStats::default();

    if let Some(local) = local {
        for ours in local.values() {
            let theirs = remote.and_then(|r| r.get(&ours.id));
            match theirs {
                Some(theirs) => {
                    if ours.deleted && !theirs.deleted {
                        records.insert(ours.id.clone(), tombstoned_copy(ours, theirs));
                        stats.deletions_propagated += 1;
                    } else if ours.updated_at > theirs.updated_at {
                        records.insert(ours.id.clone(), ours.clone());
                        stats.local_wins += 1;
                    } else {
                        records.insert(ours.id.clone(), theirs.clone());
                        stats.remote_wins += 1;
                    }
                }
                None => {
                    records.insert(ours.id.clone(), ours.clone());
                    if !ours.deleted {
                        stats.local_creates += 1;
                    }
                }
            }
        }
    }

    if let Some(remote) = remote {
        for theirs in remote.values() {
            let seen = local.map(|l| l.contains_key(&theirs.id)).unwrap_or(false);
            if !seen {
                records.insert(theirs.id.clone(), theirs.clone());
                if !theirs.deleted {
                    stats.remote_creates += 1;
                }
            }
        }
    }

    MergedCollection { records, stats }
}

/// Build the tombstoned copy of a remote record a local deletion overrides.
///
/// Carries the remote payload so the row reflects the last known content,
/// the local deletion time, and the greater of the two `updated_at`s so
/// per-id monotonicity holds on both stores.
fn tombstoned_copy(ours: &Record, theirs: &Record) -> Record {
    let mut copy = theirs.clone();
    copy.deleted = true;
    copy.deleted_at = ours.deleted_at.or(Some(ours.updated_at));
    copy.updated_at = ours.updated_at.max(theirs.updated_at);
    copy
}

/// Decide the direction of a whole-snapshot pass.
///
/// The local bundle pushes when it is strictly newer or when the remote
/// side has nothing yet; it pulls when the remote is strictly newer; equal
/// timestamps mean the two sides already agree.
pub fn bundle_direction(local: &Bundle, remote: Option<&Bundle>) -> Direction {
    match remote {
        None => Direction::Push,
        Some(remote) if remote.is_empty() => Direction::Push,
        Some(remote) => match local.created_at.cmp(&remote.created_at) {
            std::cmp::Ordering::Greater => Direction::Push,
            std::cmp::Ordering::Less => Direction::Pull,
            std::cmp::Ordering::Equal => Direction::Noop,
        },
    }
}
