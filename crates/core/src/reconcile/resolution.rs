//! Conflict resolution state.
//!
//! [`ResolutionState`] owns the change list produced by the reconciler and
//! records the user's per-path choices on top of it.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use crate::models::Side;
use crate::models::{ChangeStatus, FileChange};

/// Mutable overlay over a reconciliation result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionState {
    changes: Vec<FileChange>,
}

impl ResolutionState {
    pub fn new(changes: Vec<FileChange>) -> Self {
        Self { changes }
    }

    pub fn changes(&self) -> &[FileChange] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<FileChange> {
        self.changes
    }

    pub fn get(&self, path: &str) -> Option<&FileChange> {
        self.changes.iter().find(|c| c.path == path)
    }

    fn get_mut(&mut self, path: &str) -> Option<&mut FileChange> {
        self.changes.iter_mut().find(|c| c.path == path)
    }

    /// Resolve `path` with `content`. Unknown paths are ignored.
    ///
    /// Returns whether an entry was updated.
    pub fn resolve_one(&mut self, path: &str, content: impl Into<String>) -> bool {
        match self.get_mut(path) {
            Some(change) => {
                change.resolved = true;
                change.resolved_content = Some(content.into());
                change.resolved_side = None;
                debug!(path, "change resolved");
                true
            }
            None => {
                debug!(path, "resolve ignored, path not in change list");
                false
            }
        }
    }

    /// Resolve `path` with whatever `side` holds.
    ///
    /// The loaded body is used when it is text; otherwise the side is
    /// recorded and read again when the merge is planned.
    pub fn resolve_side(&mut self, path: &str, side: Side) -> bool {
        match self.get_mut(path) {
            Some(change) => {
                pick_side(change, side);
                debug!(path, side = %side, "change resolved");
                true
            }
            None => false,
        }
    }

    /// Resolve every conflict with the `prefer` side.
    ///
    /// Existing resolutions are overwritten. Returns the number of conflicts
    /// resolved, which is every conflict in the list.
    pub fn resolve_all(&mut self, prefer: Side) -> usize {
        let mut resolved = 0;
        for change in self
            .changes
            .iter_mut()
            .filter(|c| c.status == ChangeStatus::Conflict)
        {
            pick_side(change, prefer);
            resolved += 1;
        }
        info!(prefer = %prefer, resolved, "bulk resolution applied");
        resolved
    }

    /// Clear the resolution on `path`. Returns whether an entry was updated.
    pub fn unresolve(&mut self, path: &str) -> bool {
        match self.get_mut(path) {
            Some(change) => {
                change.resolved = false;
                change.resolved_content = None;
                change.resolved_side = None;
                true
            }
            None => false,
        }
    }

    /// Record the loaded bodies of both sides of `path`.
    pub fn attach_contents(
        &mut self,
        path: &str,
        source: Option<String>,
        target: Option<String>,
    ) -> bool {
        match self.get_mut(path) {
            Some(change) => {
                change.source_content = source;
                change.target_content = target;
                true
            }
            None => false,
        }
    }

    /// Conflicts that have not been resolved yet.
    pub fn count_unresolved_conflicts(&self) -> usize {
        self.changes.iter().filter(|c| c.is_unresolved_conflict()).count()
    }

    pub fn conflict_paths(&self) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|c| c.status == ChangeStatus::Conflict)
            .map(|c| c.path.as_str())
            .collect()
    }
}

fn pick_side(change: &mut FileChange, side: Side) {
    let loaded = match side {
        Side::Source => change.source_content.clone(),
        Side::Target => change.target_content.clone(),
    };
    change.resolved = true;
    change.resolved_side = Some(side);
    change.resolved_content = loaded;
}
