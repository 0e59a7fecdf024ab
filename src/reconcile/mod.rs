// src/reconcile/mod.rs

//! Three-way reconciliation of an update against a hand-modified live tree
//!
//! Four maps take part: the baseline and live snapshot before the update
//! (`B_old`, `L_old`) and after it (`B_new`, `L_new`). A difference after
//! the update is accepted automatically only when the path was untouched
//! before it, meaning present with the same hash in `B_old` and `L_old`.
//! Everything else is reported for a human to decide.
//!
//! Deleted paths are never accepted, even when they were untouched before
//! the update.

mod engine;

pub use engine::{UpdateOutcome, UpdateRequest, Updater};

use crate::checksum::{ChecksumDiff, ChecksumMap, diff};
use serde::Serialize;

/// Differences left for an operator after an update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictSet {
    pub new: ChecksumMap,
    pub modified: ChecksumMap,
    pub deleted: ChecksumMap,
}

impl ConflictSet {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.new.len() + self.modified.len() + self.deleted.len()
    }

    /// Every conflicting path, sorted
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .new
            .keys()
            .chain(self.modified.keys())
            .chain(self.deleted.keys())
            .map(String::as_str)
            .collect();
        paths.sort_unstable();
        paths
    }
}

/// Full result of reconciling four checksum maps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// `diff(B_old, L_old)`
    pub old: ChecksumDiff,
    /// `diff(B_new, L_new)`
    pub new: ChecksumDiff,
    /// Paths folded into the new baseline, with their `L_new` hash
    pub accepted: ChecksumMap,
    pub conflicts: ConflictSet,
}

/// Partition post-update differences into accepted and conflicting
pub fn reconcile(
    b_old: &ChecksumMap,
    l_old: &ChecksumMap,
    b_new: &ChecksumMap,
    l_new: &ChecksumMap,
) -> Reconciliation {
    let old = diff(b_old, l_old);
    let new = diff(b_new, l_new);

    let mut accepted = ChecksumMap::new();
    let mut conflicts = ConflictSet {
        deleted: new.deleted.clone(),
        ..ConflictSet::default()
    };

    for (path, hash) in &new.new {
        if old.pristine.contains_key(path) {
            accepted.insert(path.clone(), hash.clone());
        } else {
            conflicts.new.insert(path.clone(), hash.clone());
        }
    }
    for (path, hash) in &new.modified {
        if old.pristine.contains_key(path) {
            accepted.insert(path.clone(), hash.clone());
        } else {
            conflicts.modified.insert(path.clone(), hash.clone());
        }
    }

    Reconciliation {
        old,
        new,
        accepted,
        conflicts,
    }
}
