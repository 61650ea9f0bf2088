//! Two-way tree reconciliation.
//!
//! Given the recursive trees of a source and a target repository, the
//! reconciler classifies every blob path that differs between them.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{ChangeStatus, FileChange, TreeEntry};

/// Stateless two-way tree differ.
///
/// There is no common ancestor, so a path present on both sides with
/// different content is always a [`ChangeStatus::Conflict`], even when only
/// one side really changed it. [`ChangeStatus::Modified`] is never produced.
pub struct TreeReconciler;

impl TreeReconciler {
    /// Classify every blob path of `source` and `target`.
    ///
    /// Result is sorted by status (Conflict, Modified, Added, Deleted) and
    /// then by path. Paths with equal content hashes are omitted.
    pub fn diff(source: &[TreeEntry], target: &[TreeEntry]) -> Vec<FileChange> {
        info!(
            source_count = source.len(),
            target_count = target.len(),
            "reconciling trees"
        );

        let target_by_path: HashMap<&str, &TreeEntry> = target
            .iter()
            .filter(|e| e.is_blob())
            .map(|e| (e.path.as_str(), e))
            .collect();

        let mut changes = Vec::new();
        let mut source_paths: HashSet<&str> = HashSet::new();

        for entry in source.iter().filter(|e| e.is_blob()) {
            if !source_paths.insert(entry.path.as_str()) {
                continue;
            }
            match target_by_path.get(entry.path.as_str()) {
                Some(other) if other.content_hash != entry.content_hash => {
                    debug!(path = %entry.path, "content differs on both sides");
                    changes.push(FileChange::new(&entry.path, ChangeStatus::Conflict));
                }
                Some(_) => {}
                None => changes.push(FileChange::new(&entry.path, ChangeStatus::Added)),
            }
        }

        let mut target_seen: HashSet<&str> = HashSet::new();
        for entry in target.iter().filter(|e| e.is_blob()) {
            if source_paths.contains(entry.path.as_str()) || !target_seen.insert(entry.path.as_str())
            {
                continue;
            }
            changes.push(FileChange::new(&entry.path, ChangeStatus::Deleted));
        }

        changes.sort_by(|a, b| a.status.cmp(&b.status).then_with(|| a.path.cmp(&b.path)));

        let summary = DiffSummary::from_changes(&changes);
        info!(
            conflicts = summary.conflicts,
            added = summary.added,
            deleted = summary.deleted,
            "reconciliation complete"
        );
        changes
    }
}

/// Per-status counts of a change list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub conflicts: usize,
    pub modified: usize,
    pub added: usize,
    pub deleted: usize,
}

impl DiffSummary {
    pub fn from_changes(changes: &[FileChange]) -> Self {
        let mut summary = Self::default();
        for change in changes {
            match change.status {
                ChangeStatus::Conflict => summary.conflicts += 1,
                ChangeStatus::Modified => summary.modified += 1,
                ChangeStatus::Added => summary.added += 1,
                ChangeStatus::Deleted => summary.deleted += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.conflicts + self.modified + self.added + self.deleted
    }

    pub fn is_identical(&self) -> bool {
        self.total() == 0
    }
}
