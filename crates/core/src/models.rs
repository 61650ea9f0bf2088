//! Domain model types used throughout RepoFuse.
//!
//! These types bridge the gateway, the reconciler, the planner, and the
//! commit writer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::PlanError;

// ---------------------------------------------------------------------------
// Repository identity
// ---------------------------------------------------------------------------

/// Identity of a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
}

impl RepoRef {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        default_branch: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            default_branch: default_branch.into(),
        }
    }

    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// The account a credential belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub login: String,
    pub avatar_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Trees
// ---------------------------------------------------------------------------

/// Kind of a tree node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
}

/// One node of a recursive repository tree at a given ref.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub kind: EntryKind,
    /// Host content hash. Compared for equality only.
    pub content_hash: String,
    pub size_bytes: Option<u64>,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Blob,
            content_hash: content_hash.into(),
            size_bytes: None,
        }
    }

    pub fn tree(path: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Tree,
            content_hash: content_hash.into(),
            size_bytes: None,
        }
    }

    pub fn is_blob(&self) -> bool {
        self.kind == EntryKind::Blob
    }
}

/// Result of reading a single file at a ref. The body is raw bytes; text
/// and binary files travel the same way.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileContent {
    pub exists: bool,
    pub content: Option<Vec<u8>>,
}

impl FileContent {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn found(content: impl Into<Vec<u8>>) -> Self {
        Self {
            exists: true,
            content: Some(content.into()),
        }
    }

    /// The body as UTF-8, or `None` when absent or binary.
    pub fn text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

/// Current head of a branch and the tree it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchHead {
    pub commit_sha: String,
    pub tree_sha: String,
}

/// A blob to place into a new tree (mode `100644`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTreeEntry {
    pub path: String,
    pub blob_sha: String,
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Which repository a piece of content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "source" => Ok(Self::Source),
            "target" => Ok(Self::Target),
            other => Err(format!("unknown side '{}', expected source or target", other)),
        }
    }
}

/// Path-level change category.
///
/// Declaration order is the processing order: Conflict, Modified, Added,
/// Deleted. `Modified` needs a common ancestor and is never produced by the
/// two-way diff.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Conflict,
    Modified,
    Added,
    Deleted,
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict => write!(f, "conflict"),
            Self::Modified => write!(f, "modified"),
            Self::Added => write!(f, "added"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// One entry in a reconciliation result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub status: ChangeStatus,
    pub resolved: bool,
    pub resolved_content: Option<String>,
    /// Side picked for a resolution whose content was not loaded (or is not
    /// text). The planner reads that side at push time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_side: Option<Side>,
    /// Source-side body, loaded on demand for conflicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_content: Option<String>,
    /// Target-side body, loaded on demand for conflicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_content: Option<String>,
}

impl FileChange {
    pub fn new(path: impl Into<String>, status: ChangeStatus) -> Self {
        Self {
            path: path.into(),
            status,
            resolved: false,
            resolved_content: None,
            resolved_side: None,
            source_content: None,
            target_content: None,
        }
    }

    pub fn is_unresolved_conflict(&self) -> bool {
        self.status == ChangeStatus::Conflict && !self.resolved
    }
}

/// A path pair in folder mode: `path` carries the prefix, `source_path` is
/// relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderMapping {
    pub path: String,
    pub source_path: String,
}

// ---------------------------------------------------------------------------
// Commit plan
// ---------------------------------------------------------------------------

/// A hydrated file ready to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFile {
    pub path: String,
    pub content: Vec<u8>,
}

impl PendingFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Where a plan is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitTarget {
    pub repo: RepoRef,
    /// `None` means the repository's default branch.
    pub branch: Option<String>,
    pub message: String,
}

impl CommitTarget {
    pub fn new(repo: RepoRef, branch: Option<String>, message: impl Into<String>) -> Self {
        Self {
            repo,
            branch,
            message: message.into(),
        }
    }

    pub fn branch(&self) -> &str {
        self.branch
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(&self.repo.default_branch)
    }
}

/// An ordered, path-unique set of files bound for one destination branch.
#[derive(Debug, Clone)]
pub struct CommitPlan {
    target: CommitTarget,
    files: Vec<PendingFile>,
}

impl CommitPlan {
    /// Build a plan, rejecting duplicate paths.
    pub fn new(target: CommitTarget, files: Vec<PendingFile>) -> Result<Self, PlanError> {
        let mut seen = HashSet::with_capacity(files.len());
        for file in &files {
            if !seen.insert(file.path.as_str()) {
                return Err(PlanError::DuplicatePath(file.path.clone()));
            }
        }
        Ok(Self { target, files })
    }

    pub fn target(&self) -> &CommitTarget {
        &self.target
    }

    pub fn files(&self) -> &[PendingFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn into_parts(self) -> (CommitTarget, Vec<PendingFile>) {
        (self.target, self.files)
    }
}

/// Which write path the commit writer took.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PushStrategy {
    /// One blob per file, one tree, one commit, one ref move.
    GitData,
    /// One contents-API commit per file (empty repositories).
    Contents,
}

impl std::fmt::Display for PushStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GitData => write!(f, "git-data"),
            Self::Contents => write!(f, "contents"),
        }
    }
}

/// Result of a successful push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushOutcome {
    pub commit_sha: String,
    pub strategy: PushStrategy,
    pub branch: String,
    pub files_written: usize,
}
