//! Repository merge engine.
//!
//! The [`MergeEngine`] drives one reconciliation from start to finish:
//!
//! 1. Fetch the source and target trees concurrently.
//! 2. Diff them into a [`MergeSession`].
//! 3. Optionally load both sides of every conflict for review.
//! 4. Plan, hydrate, and push the merged file set into the target.
//!
//! Folder mode skips the diff and maps a whole repository under a prefix
//! (or back out of one).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::MergeConfig;
use crate::errors::{CoreError, GatewayError, PlanError};
use crate::gateway::{Credential, RepoGateway, RepoLocator};
use crate::models::{CommitPlan, CommitTarget, PushOutcome, RepoRef, TreeEntry};
use crate::reconcile::{
    CommitPlanner, ContentProvider, DiffSummary, PlannedFile, ResolutionState, Side,
    TreeReconciler,
};
use crate::writer::CommitWriter;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Lifecycle of a merge session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergePhase {
    /// Trees diffed; conflict bodies not loaded.
    Reconciled,
    /// Both sides of every conflict are loaded.
    ContentsLoaded,
}

impl std::fmt::Display for MergePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reconciled => write!(f, "reconciled"),
            Self::ContentsLoaded => write!(f, "contents_loaded"),
        }
    }
}

/// A diffed source/target pair awaiting resolution and push.
#[derive(Debug, Clone)]
pub struct MergeSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub source: RepoRef,
    pub target: RepoRef,
    pub source_branch: String,
    pub target_branch: String,
    /// The target had no commits when compared.
    pub target_empty: bool,
    pub phase: MergePhase,
    pub state: ResolutionState,
}

impl MergeSession {
    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_changes(self.state.changes())
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Concurrency limits for hydration and blob upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    pub hydrate_concurrency: usize,
    pub blob_concurrency: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self::from(&MergeConfig::default())
    }
}

impl From<&MergeConfig> for MergeOptions {
    fn from(config: &MergeConfig) -> Self {
        Self {
            hydrate_concurrency: config.hydrate_concurrency,
            blob_concurrency: config.blob_concurrency,
        }
    }
}

// ---------------------------------------------------------------------------
// Content provider
// ---------------------------------------------------------------------------

/// Reads file bodies from two repositories at fixed branches.
struct GatewayContents<'a, G: ?Sized> {
    gateway: &'a G,
    credential: &'a Credential,
    source: (&'a RepoRef, &'a str),
    target: (&'a RepoRef, &'a str),
}

#[async_trait]
impl<'a, G: RepoGateway + ?Sized> ContentProvider for GatewayContents<'a, G> {
    async fn fetch(&self, side: Side, path: &str) -> Result<Option<Vec<u8>>, GatewayError> {
        let (repo, branch) = match side {
            Side::Source => self.source,
            Side::Target => self.target,
        };
        let file = self
            .gateway
            .get_file_content(self.credential, repo, path, Some(branch))
            .await?;
        Ok(if file.exists { file.content } else { None })
    }
}

fn as_text(body: Option<Vec<u8>>) -> Option<String> {
    body.and_then(|bytes| String::from_utf8(bytes).ok())
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Orchestrates reconciliation, folder import/export, and pushes.
pub struct MergeEngine<G: RepoGateway + ?Sized> {
    gateway: Arc<G>,
    credential: Credential,
    options: MergeOptions,
}

impl<G: RepoGateway + ?Sized> MergeEngine<G> {
    pub fn new(gateway: Arc<G>, credential: Credential, options: MergeOptions) -> Self {
        Self {
            gateway,
            credential,
            options,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Look up a repository named by a parsed locator.
    pub async fn resolve(&self, locator: &RepoLocator) -> Result<RepoRef, CoreError> {
        Ok(self
            .gateway
            .get_repository(&self.credential, &locator.owner, &locator.name)
            .await?)
    }

    /// Fetch both trees and diff them against the target's default branch.
    ///
    /// A target without commits is compared as an empty tree; a source
    /// without commits is an error.
    pub async fn compare(&self, source: &RepoRef, target: &RepoRef) -> Result<MergeSession, CoreError> {
        self.compare_into(source, target, None).await
    }

    /// Like [`compare`](Self::compare), against `target_branch` of the
    /// target. The session pushes to that same branch.
    #[instrument(skip(self, source, target), fields(source = %source, target = %target))]
    pub async fn compare_into(
        &self,
        source: &RepoRef,
        target: &RepoRef,
        target_branch: Option<&str>,
    ) -> Result<MergeSession, CoreError> {
        let id = Uuid::new_v4();
        let target_branch = target_branch
            .filter(|b| !b.trim().is_empty())
            .unwrap_or(&target.default_branch)
            .to_string();
        info!(session = %id, target_branch = %target_branch, "fetching trees");

        let (source_tree, target_tree) = future::join(
            self.gateway.get_tree(&self.credential, source, None),
            self.gateway
                .get_tree(&self.credential, target, Some(target_branch.as_str())),
        )
        .await;

        let source_tree = source_tree?;
        let (target_tree, target_empty) = match target_tree {
            Ok(tree) => (tree, false),
            Err(GatewayError::EmptyRepository { .. }) => {
                info!(session = %id, "target has no commits, comparing against an empty tree");
                (Vec::new(), true)
            }
            Err(e) => return Err(e.into()),
        };

        let changes = TreeReconciler::diff(&source_tree, &target_tree);
        let session = MergeSession {
            id,
            started_at: Utc::now(),
            source: source.clone(),
            target: target.clone(),
            source_branch: source.default_branch.clone(),
            target_branch,
            target_empty,
            phase: MergePhase::Reconciled,
            state: ResolutionState::new(changes),
        };
        info!(session = %id, phase = %session.phase, changes = session.state.changes().len(), "session ready");
        Ok(session)
    }

    /// Load both sides of every conflict into the session.
    ///
    /// Only text bodies are kept for review; a binary side stays `None` and
    /// is read again at push time if it is chosen. Returns the number of
    /// conflicts loaded.
    #[instrument(skip(self, session), fields(session = %session.id))]
    pub async fn load_conflict_contents(&self, session: &mut MergeSession) -> Result<usize, CoreError> {
        let paths: Vec<String> = session
            .state
            .conflict_paths()
            .into_iter()
            .map(String::from)
            .collect();

        let provider = GatewayContents {
            gateway: self.gateway.as_ref(),
            credential: &self.credential,
            source: (&session.source, session.source_branch.as_str()),
            target: (&session.target, session.target_branch.as_str()),
        };
        let provider = &provider;

        let loaded: Vec<(String, Option<String>, Option<String>)> = stream::iter(paths)
            .map(|path| async move {
                let (source, target) = future::try_join(
                    provider.fetch(Side::Source, &path),
                    provider.fetch(Side::Target, &path),
                )
                .await?;
                Ok::<_, GatewayError>((path, as_text(source), as_text(target)))
            })
            .buffered(self.options.hydrate_concurrency.max(1))
            .try_collect()
            .await?;

        let count = loaded.len();
        for (path, source, target) in loaded {
            session.state.attach_contents(&path, source, target);
        }
        session.phase = MergePhase::ContentsLoaded;
        info!(conflicts = count, phase = %session.phase, "conflict contents loaded");
        Ok(count)
    }

    /// Plan the merge from the session's resolutions and push it into the
    /// branch the session was compared against.
    ///
    /// `branch`, when given, must name that same branch.
    #[instrument(skip(self, session, message), fields(session = %session.id))]
    pub async fn merge(
        &self,
        session: MergeSession,
        branch: Option<String>,
        message: &str,
    ) -> Result<PushOutcome, CoreError> {
        if let Some(requested) = branch.filter(|b| !b.trim().is_empty()) {
            if requested != session.target_branch {
                return Err(PlanError::BranchMismatch {
                    compared: session.target_branch.clone(),
                    requested,
                }
                .into());
            }
        }

        let unresolved = session.state.count_unresolved_conflicts();
        if unresolved > 0 {
            debug!(unresolved, "unresolved conflicts default to source content");
        }

        let planned = CommitPlanner::plan_merge(session.state.changes());
        let provider = GatewayContents {
            gateway: self.gateway.as_ref(),
            credential: &self.credential,
            source: (&session.source, session.source_branch.as_str()),
            target: (&session.target, session.target_branch.as_str()),
        };
        let branch = Some(session.target_branch.clone());
        self.hydrate_and_push(planned, &provider, &session.target, branch, message)
            .await
    }

    /// Copy every file of `source` into `target` under `prefix`.
    #[instrument(skip(self, source, target, message), fields(source = %source, target = %target))]
    pub async fn import_folder(
        &self,
        source: &RepoRef,
        target: &RepoRef,
        prefix: &str,
        branch: Option<String>,
        message: &str,
    ) -> Result<PushOutcome, CoreError> {
        let tree = self.fetch_tree(source).await?;
        let mappings = CommitPlanner::build_folder_import(&tree, prefix)?;
        info!(files = mappings.len(), "folder import planned");

        let provider = GatewayContents {
            gateway: self.gateway.as_ref(),
            credential: &self.credential,
            source: (source, source.default_branch.as_str()),
            target: (target, target.default_branch.as_str()),
        };
        self.hydrate_and_push(
            CommitPlanner::plan_folder_import(&mappings),
            &provider,
            target,
            branch,
            message,
        )
        .await
    }

    /// Copy the `prefix` folder of `holder` to the root of `destination`.
    #[instrument(skip(self, holder, destination, message), fields(holder = %holder, destination = %destination))]
    pub async fn export_folder(
        &self,
        holder: &RepoRef,
        destination: &RepoRef,
        prefix: &str,
        branch: Option<String>,
        message: &str,
    ) -> Result<PushOutcome, CoreError> {
        let tree = self.fetch_tree(holder).await?;
        let mappings = CommitPlanner::strip_folder_export(&tree, prefix)?;
        info!(files = mappings.len(), "folder export planned");

        let provider = GatewayContents {
            gateway: self.gateway.as_ref(),
            credential: &self.credential,
            source: (holder, holder.default_branch.as_str()),
            target: (destination, destination.default_branch.as_str()),
        };
        self.hydrate_and_push(
            CommitPlanner::plan_folder_export(&mappings),
            &provider,
            destination,
            branch,
            message,
        )
        .await
    }

    /// Create a repository under the authenticated account.
    pub async fn create_repository(
        &self,
        name: &str,
        description: &str,
        private: bool,
    ) -> Result<RepoRef, CoreError> {
        let repo = self
            .gateway
            .create_repository(&self.credential, name, description, private)
            .await?;
        info!(repo = %repo, "repository created");
        Ok(repo)
    }

    async fn fetch_tree(&self, repo: &RepoRef) -> Result<Vec<TreeEntry>, CoreError> {
        Ok(self.gateway.get_tree(&self.credential, repo, None).await?)
    }

    async fn hydrate_and_push<P: ContentProvider>(
        &self,
        planned: Vec<PlannedFile>,
        provider: &P,
        target: &RepoRef,
        branch: Option<String>,
        message: &str,
    ) -> Result<PushOutcome, CoreError> {
        info!(files = planned.len(), "hydrating");
        let files =
            CommitPlanner::hydrate(planned, provider, self.options.hydrate_concurrency).await?;
        let plan = CommitPlan::new(CommitTarget::new(target.clone(), branch, message), files)?;

        info!(files = plan.len(), "pushing");
        let writer = CommitWriter::new(
            self.gateway.as_ref(),
            &self.credential,
            self.options.blob_concurrency,
        );
        let outcome = writer.push(plan).await?;
        info!(commit = %outcome.commit_sha, strategy = %outcome.strategy, "committed");
        Ok(outcome)
    }
}
