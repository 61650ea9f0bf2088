//! In-memory [`RepoGateway`] for unit tests.
//!
//! Each repository holds a single branch. Every call is appended to a call
//! log so tests can assert on ordering and counts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{sanitize_repo_name, Credential, RepoGateway};
use crate::errors::GatewayError;
use crate::models::{AuthUser, BranchHead, EntryKind, FileContent, NewTreeEntry, RepoRef, TreeEntry};

#[derive(Debug, Default)]
struct FakeRepo {
    /// Committed files on the default branch.
    files: BTreeMap<String, Vec<u8>>,
    /// `None` until the first commit.
    head: Option<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    repos: HashMap<String, FakeRepo>,
    blobs: HashMap<String, Vec<u8>>,
    trees: HashMap<String, BTreeMap<String, Vec<u8>>>,
    commits: HashMap<String, String>,
    calls: Vec<String>,
    counter: usize,
    fail_ops: HashSet<String>,
    fail_paths: HashSet<String>,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{}-{}", prefix, self.counter)
    }

    fn check(&mut self, op: &str) -> Result<(), GatewayError> {
        self.calls.push(op.to_string());
        if self.fail_ops.contains(op) {
            return Err(GatewayError::Transient {
                status: 502,
                message: format!("injected failure in {}", op),
            });
        }
        Ok(())
    }
}

pub(crate) fn content_hash(content: &[u8]) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[derive(Debug, Default)]
pub(crate) struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a repository. An empty `files` list leaves it without commits.
    pub fn with_repo(self, full_name: &str, files: &[(&str, &str)]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let head = if files.is_empty() {
                None
            } else {
                let id = state.next_id("commit");
                Some(id)
            };
            let repo = FakeRepo {
                files: files
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                    .collect(),
                head,
            };
            state.repos.insert(full_name.to_string(), repo);
        }
        self
    }

    /// Add a file with arbitrary bytes to an existing repository.
    pub fn with_bytes(self, full_name: &str, path: &str, bytes: &[u8]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let repo = state.repos.get_mut(full_name).unwrap();
            repo.files.insert(path.to_string(), bytes.to_vec());
        }
        self
    }

    /// Fail every call to `op` with a 502.
    pub fn failing_on(self, op: &str) -> Self {
        self.state.lock().unwrap().fail_ops.insert(op.to_string());
        self
    }

    /// Fail `create_file` for this path.
    pub fn failing_path(self, path: &str) -> Self {
        self.state.lock().unwrap().fail_paths.insert(path.to_string());
        self
    }

    pub fn repo_ref(full_name: &str) -> RepoRef {
        let (owner, name) = full_name.split_once('/').unwrap();
        RepoRef::new(owner, name, "main")
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == op).count()
    }

    /// Committed files, decoded lossily for text assertions.
    pub fn files(&self, full_name: &str) -> BTreeMap<String, String> {
        self.state.lock().unwrap().repos[full_name]
            .files
            .iter()
            .map(|(p, c)| (p.clone(), String::from_utf8_lossy(c).into_owned()))
            .collect()
    }

    pub fn bytes(&self, full_name: &str, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().repos[full_name].files.get(path).cloned()
    }

    pub fn head(&self, full_name: &str) -> Option<String> {
        self.state.lock().unwrap().repos[full_name].head.clone()
    }
}

fn not_found(repo: &RepoRef) -> GatewayError {
    GatewayError::NotFound(format!("{} not found", repo.full_name()))
}

#[async_trait]
impl RepoGateway for FakeGateway {
    async fn authenticated_user(&self, _credential: &Credential) -> Result<AuthUser, GatewayError> {
        self.state.lock().unwrap().check("authenticated_user")?;
        Ok(AuthUser {
            login: "tester".into(),
            avatar_url: None,
        })
    }

    async fn list_repositories(
        &self,
        _credential: &Credential,
    ) -> Result<Vec<RepoRef>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.check("list_repositories")?;
        let mut names: Vec<&String> = state.repos.keys().collect();
        names.sort();
        Ok(names.into_iter().map(|n| Self::repo_ref(n)).collect())
    }

    async fn get_repository(
        &self,
        _credential: &Credential,
        owner: &str,
        name: &str,
    ) -> Result<RepoRef, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.check("get_repository")?;
        let full = format!("{}/{}", owner, name);
        if state.repos.contains_key(&full) {
            Ok(Self::repo_ref(&full))
        } else {
            Err(GatewayError::NotFound(full))
        }
    }

    async fn get_tree(
        &self,
        _credential: &Credential,
        repo: &RepoRef,
        git_ref: Option<&str>,
    ) -> Result<Vec<TreeEntry>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.check("get_tree")?;
        let branch = git_ref.unwrap_or(&repo.default_branch).to_string();
        let stored = state.repos.get(&repo.full_name()).ok_or_else(|| not_found(repo))?;
        if stored.head.is_none() {
            return Err(GatewayError::EmptyRepository {
                repo: repo.full_name(),
                branch,
            });
        }

        let mut entries = Vec::new();
        let mut dirs = HashSet::new();
        for (path, content) in &stored.files {
            let mut parent = path.as_str();
            while let Some((dir, _)) = parent.rsplit_once('/') {
                if dirs.insert(dir.to_string()) {
                    entries.push(TreeEntry::tree(dir, format!("tree:{}", dir)));
                }
                parent = dir;
            }
            entries.push(TreeEntry {
                path: path.clone(),
                kind: EntryKind::Blob,
                content_hash: content_hash(content),
                size_bytes: Some(content.len() as u64),
            });
        }
        Ok(entries)
    }

    async fn get_file_content(
        &self,
        _credential: &Credential,
        repo: &RepoRef,
        path: &str,
        _git_ref: Option<&str>,
    ) -> Result<FileContent, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.check("get_file_content")?;
        let stored = state.repos.get(&repo.full_name()).ok_or_else(|| not_found(repo))?;
        Ok(match stored.files.get(path) {
            Some(content) => FileContent::found(content.clone()),
            None => FileContent::missing(),
        })
    }

    async fn get_branch_head(
        &self,
        _credential: &Credential,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<BranchHead, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.check("get_branch_head")?;
        let stored = state.repos.get(&repo.full_name()).ok_or_else(|| not_found(repo))?;
        let commit_sha = stored.head.clone().ok_or_else(|| GatewayError::EmptyRepository {
            repo: repo.full_name(),
            branch: branch.to_string(),
        })?;
        let files = stored.files.clone();
        let tree_sha = state.next_id("tree");
        state.trees.insert(tree_sha.clone(), files);
        Ok(BranchHead {
            commit_sha,
            tree_sha,
        })
    }

    async fn create_blob(
        &self,
        _credential: &Credential,
        _repo: &RepoRef,
        content: &[u8],
    ) -> Result<String, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.check("create_blob")?;
        let sha = state.next_id("blob");
        state.blobs.insert(sha.clone(), content.to_vec());
        Ok(sha)
    }

    async fn create_tree(
        &self,
        _credential: &Credential,
        _repo: &RepoRef,
        entries: &[NewTreeEntry],
        base_tree: Option<&str>,
    ) -> Result<String, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.check("create_tree")?;
        let mut files = match base_tree {
            Some(base) => state.trees.get(base).cloned().unwrap_or_default(),
            None => BTreeMap::new(),
        };
        for entry in entries {
            let content = state
                .blobs
                .get(&entry.blob_sha)
                .cloned()
                .ok_or_else(|| GatewayError::NotFound(entry.blob_sha.clone()))?;
            files.insert(entry.path.clone(), content);
        }
        let sha = state.next_id("tree");
        state.trees.insert(sha.clone(), files);
        Ok(sha)
    }

    async fn create_commit(
        &self,
        _credential: &Credential,
        _repo: &RepoRef,
        _message: &str,
        tree_sha: &str,
        _parents: &[String],
    ) -> Result<String, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.check("create_commit")?;
        let sha = state.next_id("commit");
        state.commits.insert(sha.clone(), tree_sha.to_string());
        Ok(sha)
    }

    async fn move_ref(
        &self,
        _credential: &Credential,
        repo: &RepoRef,
        _branch: &str,
        commit_sha: &str,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.check("move_ref")?;
        let tree = state
            .commits
            .get(commit_sha)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(commit_sha.to_string()))?;
        let files = state.trees.get(&tree).cloned().unwrap_or_default();
        let stored = state
            .repos
            .get_mut(&repo.full_name())
            .ok_or_else(|| not_found(repo))?;
        stored.files = files;
        stored.head = Some(commit_sha.to_string());
        Ok(())
    }

    async fn create_file(
        &self,
        _credential: &Credential,
        repo: &RepoRef,
        _branch: &str,
        path: &str,
        content: &[u8],
        _message: &str,
    ) -> Result<String, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.check("create_file")?;
        if state.fail_paths.contains(path) {
            return Err(GatewayError::Transient {
                status: 502,
                message: format!("injected failure for {}", path),
            });
        }
        let sha = state.next_id("commit");
        let stored = state
            .repos
            .get_mut(&repo.full_name())
            .ok_or_else(|| not_found(repo))?;
        stored.files.insert(path.to_string(), content.to_vec());
        stored.head = Some(sha.clone());
        Ok(sha)
    }

    async fn create_repository(
        &self,
        _credential: &Credential,
        name: &str,
        _description: &str,
        _private: bool,
    ) -> Result<RepoRef, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.check("create_repository")?;
        let sanitized = sanitize_repo_name(name)?;
        let full = format!("tester/{}", sanitized);
        if state.repos.contains_key(&full) {
            return Err(GatewayError::NameTaken { name: sanitized });
        }
        state.repos.insert(full.clone(), FakeRepo::default());
        Ok(Self::repo_ref(&full))
    }
}
