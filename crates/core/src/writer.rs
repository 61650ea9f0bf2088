//! Commit writer.
//!
//! Pushes a [`CommitPlan`] to its destination branch. A branch with history
//! gets exactly one commit built through the git data API (blobs, one tree,
//! one commit, one ref move). A branch without commits cannot be the base of
//! a tree, so the writer falls back to one contents-API commit per file.

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument, warn};

use crate::errors::{GatewayError, PushError};
use crate::gateway::{Credential, RepoGateway};
use crate::models::{BranchHead, CommitPlan, NewTreeEntry, PushOutcome, PushStrategy};

/// Writes commit plans through a [`RepoGateway`].
pub struct CommitWriter<'a, G: RepoGateway + ?Sized> {
    gateway: &'a G,
    credential: &'a Credential,
    blob_concurrency: usize,
}

impl<'a, G: RepoGateway + ?Sized> CommitWriter<'a, G> {
    pub fn new(gateway: &'a G, credential: &'a Credential, blob_concurrency: usize) -> Self {
        Self {
            gateway,
            credential,
            blob_concurrency: blob_concurrency.max(1),
        }
    }

    /// Commit `plan` and report the resulting head.
    #[instrument(skip(self, plan), fields(repo = %plan.target().repo, files = plan.len()))]
    pub async fn push(&self, plan: CommitPlan) -> Result<PushOutcome, PushError> {
        if plan.is_empty() {
            return Err(PushError::EmptyPlan);
        }

        let target = plan.target();
        let branch = target.branch().to_string();
        let head = self
            .gateway
            .get_branch_head(self.credential, &target.repo, &branch)
            .await;

        match head {
            Ok(head) => self.push_git_data(plan, branch, head).await,
            Err(GatewayError::EmptyRepository { .. }) | Err(GatewayError::NotFound(_)) => {
                info!(branch = %branch, "branch has no commits, using contents fallback");
                self.push_contents(plan, branch).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn push_git_data(
        &self,
        plan: CommitPlan,
        branch: String,
        head: BranchHead,
    ) -> Result<PushOutcome, PushError> {
        let (target, files) = plan.into_parts();
        let repo = &target.repo;
        debug!(base_commit = %head.commit_sha, base_tree = %head.tree_sha, "branch head read");

        let entries: Vec<NewTreeEntry> = stream::iter(files.iter())
            .map(|file| async move {
                let blob_sha = self
                    .gateway
                    .create_blob(self.credential, repo, &file.content)
                    .await?;
                Ok::<_, GatewayError>(NewTreeEntry {
                    path: file.path.clone(),
                    blob_sha,
                })
            })
            .buffered(self.blob_concurrency)
            .try_collect()
            .await?;
        debug!(blobs = entries.len(), "blobs created");

        let tree_sha = self
            .gateway
            .create_tree(self.credential, repo, &entries, Some(&head.tree_sha))
            .await?;
        let commit_sha = self
            .gateway
            .create_commit(
                self.credential,
                repo,
                &target.message,
                &tree_sha,
                std::slice::from_ref(&head.commit_sha),
            )
            .await?;
        self.gateway
            .move_ref(self.credential, repo, &branch, &commit_sha)
            .await?;

        info!(commit = %commit_sha, branch = %branch, files = entries.len(), "pushed via git data");
        Ok(PushOutcome {
            commit_sha,
            strategy: PushStrategy::GitData,
            branch,
            files_written: entries.len(),
        })
    }

    async fn push_contents(&self, plan: CommitPlan, branch: String) -> Result<PushOutcome, PushError> {
        let (target, files) = plan.into_parts();
        let mut committed: Vec<String> = Vec::with_capacity(files.len());
        let mut last_commit_sha = String::new();

        for file in &files {
            let result = self
                .gateway
                .create_file(
                    self.credential,
                    &target.repo,
                    &branch,
                    &file.path,
                    &file.content,
                    &target.message,
                )
                .await;

            match result {
                Ok(sha) => {
                    debug!(path = %file.path, commit = %sha, "file committed");
                    committed.push(file.path.clone());
                    last_commit_sha = sha;
                }
                Err(source) if committed.is_empty() => return Err(source.into()),
                Err(source) => {
                    warn!(
                        path = %file.path,
                        committed = committed.len(),
                        "contents fallback stopped part way"
                    );
                    return Err(PushError::PartialWrite {
                        committed,
                        last_commit_sha,
                        failed_path: file.path.clone(),
                        source,
                    });
                }
            }
        }

        info!(commit = %last_commit_sha, branch = %branch, files = committed.len(), "pushed via contents");
        Ok(PushOutcome {
            commit_sha: last_commit_sha,
            strategy: PushStrategy::Contents,
            branch,
            files_written: committed.len(),
        })
    }
}
