//! Remote repository gateway.
//!
//! [`RepoGateway`] is the only seam between the reconciliation core and the
//! hosting service. Every call takes the [`Credential`] explicitly; nothing
//! reads ambient auth state.

pub mod github;
pub mod locator;
pub mod naming;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

use crate::errors::GatewayError;
use crate::models::{AuthUser, BranchHead, FileContent, NewTreeEntry, RepoRef, TreeEntry};

pub use github::GitHubGateway;
pub use locator::RepoLocator;
pub use naming::sanitize_repo_name;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// An access token for the host. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// `Authorization` header schemes, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Bearer <token>`
    Bearer,
    /// `token <token>` (classic personal access tokens)
    Token,
}

/// Some token formats are only accepted under one scheme; the next scheme is
/// tried only when the previous one got HTTP 401.
pub const AUTH_SCHEMES: [AuthScheme; 2] = [AuthScheme::Bearer, AuthScheme::Token];

impl AuthScheme {
    pub fn header_value(self, credential: &Credential) -> String {
        match self {
            Self::Bearer => format!("Bearer {}", credential.expose()),
            Self::Token => format!("token {}", credential.expose()),
        }
    }
}

impl std::fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer => write!(f, "bearer"),
            Self::Token => write!(f, "token"),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway contract
// ---------------------------------------------------------------------------

/// Typed operations against a source-control host.
#[async_trait]
pub trait RepoGateway: Send + Sync {
    /// The account behind `credential`.
    async fn authenticated_user(&self, credential: &Credential) -> Result<AuthUser, GatewayError>;

    /// Repositories visible to `credential`, most recently updated first.
    async fn list_repositories(&self, credential: &Credential)
        -> Result<Vec<RepoRef>, GatewayError>;

    /// Repository metadata, including its default branch.
    async fn get_repository(
        &self,
        credential: &Credential,
        owner: &str,
        name: &str,
    ) -> Result<RepoRef, GatewayError>;

    /// Recursive tree at `git_ref` (default branch when `None`).
    ///
    /// Fails with [`GatewayError::EmptyRepository`] when the branch has no
    /// commits, never with an empty list, and with
    /// [`GatewayError::TruncatedTree`] when the host cut the listing short.
    async fn get_tree(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        git_ref: Option<&str>,
    ) -> Result<Vec<TreeEntry>, GatewayError>;

    /// Decoded file bytes at `git_ref`; `exists == false` when absent.
    async fn get_file_content(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<FileContent, GatewayError>;

    /// Current commit of `branch` and its tree.
    async fn get_branch_head(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<BranchHead, GatewayError>;

    async fn create_blob(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        content: &[u8],
    ) -> Result<String, GatewayError>;

    async fn create_tree(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        entries: &[NewTreeEntry],
        base_tree: Option<&str>,
    ) -> Result<String, GatewayError>;

    async fn create_commit(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String, GatewayError>;

    async fn move_ref(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        branch: &str,
        commit_sha: &str,
    ) -> Result<(), GatewayError>;

    /// Single-file commit through the contents API. Returns the commit sha.
    async fn create_file(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        branch: &str,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<String, GatewayError>;

    /// Create a repository owned by the authenticated user.
    async fn create_repository(
        &self,
        credential: &Credential,
        name: &str,
        description: &str,
        private: bool,
    ) -> Result<RepoRef, GatewayError>;
}
