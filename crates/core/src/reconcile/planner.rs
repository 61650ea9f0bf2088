//! Commit planning.
//!
//! Planning happens in two steps. A pure step decides where every output
//! path gets its content from ([`PlannedFile`]); an async step hydrates
//! those origins through a [`ContentProvider`] with bounded concurrency and
//! yields the [`PendingFile`] list a commit is built from.

use std::collections::HashSet;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use super::resolution::Side;
use crate::errors::{GatewayError, PlanError};
use crate::models::{ChangeStatus, FileChange, FolderMapping, PendingFile, TreeEntry};

/// Where a planned file's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Content chosen by the user; no fetch needed.
    Resolved(String),
    /// Read `path` from one side.
    Fetch { side: Side, path: String },
}

/// An output path and the origin of its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub path: String,
    pub origin: Origin,
}

/// Reads file bodies for hydration.
///
/// `Ok(None)` means the file does not exist on that side. Bodies are raw
/// bytes so binary files pass through unchanged.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn fetch(&self, side: Side, path: &str) -> Result<Option<Vec<u8>>, GatewayError>;
}

/// Stateless planning operations.
pub struct CommitPlanner;

impl CommitPlanner {
    /// Decide the origin of every path of a standard merge.
    ///
    /// The merge is a union: target-only files are carried over, source-only
    /// files are added, unresolved conflicts default to the source side. A
    /// resolution that names a side but carries no content is fetched from
    /// that side.
    pub fn plan_merge(changes: &[FileChange]) -> Vec<PlannedFile> {
        let mut seen = HashSet::new();
        let mut planned = Vec::with_capacity(changes.len());

        for change in changes {
            if !seen.insert(change.path.as_str()) {
                continue;
            }
            let fetch = |side| Origin::Fetch {
                side,
                path: change.path.clone(),
            };
            let origin = match (change.resolved, &change.resolved_content, change.resolved_side) {
                (true, Some(content), _) => Origin::Resolved(content.clone()),
                (true, None, Some(side)) => fetch(side),
                (true, None, None) => Origin::Resolved(String::new()),
                (false, _, _) => match change.status {
                    ChangeStatus::Deleted => fetch(Side::Target),
                    ChangeStatus::Conflict | ChangeStatus::Modified | ChangeStatus::Added => {
                        fetch(Side::Source)
                    }
                },
            };
            planned.push(PlannedFile {
                path: change.path.clone(),
                origin,
            });
        }
        planned
    }

    /// Origins for importing a source repository under a prefix.
    pub fn plan_folder_import(mappings: &[FolderMapping]) -> Vec<PlannedFile> {
        mappings
            .iter()
            .map(|m| PlannedFile {
                path: m.path.clone(),
                origin: Origin::Fetch {
                    side: Side::Source,
                    path: m.source_path.clone(),
                },
            })
            .collect()
    }

    /// Origins for exporting a prefixed folder to a repository root. The
    /// holder repository is the source side.
    pub fn plan_folder_export(mappings: &[FolderMapping]) -> Vec<PlannedFile> {
        mappings
            .iter()
            .map(|m| PlannedFile {
                path: m.source_path.clone(),
                origin: Origin::Fetch {
                    side: Side::Source,
                    path: m.path.clone(),
                },
            })
            .collect()
    }

    /// Resolve every origin into content, keeping plan order.
    ///
    /// At most `concurrency` fetches are in flight. Files whose content is
    /// empty or missing are dropped. The first gateway error aborts.
    pub async fn hydrate<P>(
        planned: Vec<PlannedFile>,
        provider: &P,
        concurrency: usize,
    ) -> Result<Vec<PendingFile>, GatewayError>
    where
        P: ContentProvider + ?Sized,
    {
        let total = planned.len();
        info!(total, concurrency, "hydrating plan");

        let hydrated: Vec<Option<PendingFile>> = stream::iter(planned)
            .map(|planned| async move {
                let content = match planned.origin {
                    Origin::Resolved(content) => Some(content.into_bytes()),
                    Origin::Fetch { side, path } => provider.fetch(side, &path).await?,
                };
                Ok::<_, GatewayError>(match content {
                    Some(content) if !content.is_empty() => {
                        Some(PendingFile::new(planned.path, content))
                    }
                    _ => {
                        debug!(path = %planned.path, "dropping empty or missing file");
                        None
                    }
                })
            })
            .buffered(concurrency.max(1))
            .try_collect()
            .await?;

        let files: Vec<PendingFile> = hydrated.into_iter().flatten().collect();
        info!(kept = files.len(), dropped = total - files.len(), "hydration complete");
        Ok(files)
    }

    /// Plan and hydrate a standard merge.
    pub async fn build_file_list<P>(
        changes: &[FileChange],
        provider: &P,
        concurrency: usize,
    ) -> Result<Vec<PendingFile>, GatewayError>
    where
        P: ContentProvider + ?Sized,
    {
        Self::hydrate(Self::plan_merge(changes), provider, concurrency).await
    }

    /// Map every source blob to `"{prefix}/{path}"`.
    pub fn build_folder_import(
        source_tree: &[TreeEntry],
        prefix: &str,
    ) -> Result<Vec<FolderMapping>, PlanError> {
        let prefix = normalize_prefix(prefix)?;
        Ok(source_tree
            .iter()
            .filter(|e| e.is_blob())
            .map(|e| FolderMapping {
                path: format!("{}/{}", prefix, e.path),
                source_path: e.path.clone(),
            })
            .collect())
    }

    /// Map every target blob under `"{prefix}/"` back to its unprefixed path.
    pub fn strip_folder_export(
        target_tree: &[TreeEntry],
        prefix: &str,
    ) -> Result<Vec<FolderMapping>, PlanError> {
        let prefix = normalize_prefix(prefix)?;
        let folder = format!("{}/", prefix);
        Ok(target_tree
            .iter()
            .filter(|e| e.is_blob())
            .filter_map(|e| {
                let stripped = e.path.strip_prefix(&folder)?;
                if stripped.is_empty() {
                    return None;
                }
                Some(FolderMapping {
                    path: e.path.clone(),
                    source_path: stripped.to_string(),
                })
            })
            .collect())
    }
}

/// Trim leading and trailing slashes; reject prefixes that end up empty.
pub fn normalize_prefix(prefix: &str) -> Result<String, PlanError> {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(PlanError::EmptyPrefix);
    }
    Ok(trimmed.to_string())
}
