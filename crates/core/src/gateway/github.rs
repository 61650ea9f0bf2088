//! GitHub REST API gateway.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::{sanitize_repo_name, Credential, RepoGateway, AUTH_SCHEMES};
use crate::config::HostConfig;
use crate::errors::GatewayError;
use crate::models::{
    AuthUser, BranchHead, EntryKind, FileContent, NewTreeEntry, RepoRef, TreeEntry,
};

/// Branch assumed when the host reports no default branch.
pub const FALLBACK_BRANCH: &str = "main";

const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct WireRepo {
    name: String,
    owner: WireOwner,
    default_branch: Option<String>,
}

impl From<WireRepo> for RepoRef {
    fn from(wire: WireRepo) -> Self {
        RepoRef {
            owner: wire.owner.login,
            name: wire.name,
            default_branch: wire
                .default_branch
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| FALLBACK_BRANCH.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireTree {
    #[serde(default)]
    tree: Vec<WireTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct WireTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireSha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct WireRef {
    object: WireSha,
}

#[derive(Debug, Deserialize)]
struct WireCommit {
    tree: WireSha,
}

#[derive(Debug, Deserialize)]
struct WireContentsWrite {
    commit: WireSha,
}

#[derive(Debug, Deserialize)]
struct WireFile {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    login: String,
    avatar_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Asynchronous GitHub REST API gateway.
#[derive(Clone)]
pub struct GitHubGateway {
    http: reqwest::Client,
    api_url: Url,
}

impl GitHubGateway {
    pub fn new(api_url: &str, user_agent: &str) -> Result<Self, GatewayError> {
        let trimmed = api_url.trim().trim_end_matches('/');
        let api_url = Url::parse(trimmed)
            .map_err(|e| GatewayError::ParseError(format!("invalid API URL '{}': {}", trimmed, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let agent = HeaderValue::from_str(user_agent)
            .map_err(|_| GatewayError::ParseError(format!("invalid user agent '{}'", user_agent)))?;
        headers.insert(USER_AGENT, agent);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        info!(api_url = %api_url, "created GitHubGateway");
        Ok(Self { http, api_url })
    }

    pub fn from_config(host: &HostConfig) -> Result<Self, GatewayError> {
        Self::new(&host.api_url, &host.user_agent)
    }

    /// Build `{api_url}/{segments...}`. Segments containing `/` are split so
    /// nested file paths and branch names stay literal path components.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.api_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                GatewayError::ParseError(format!("API URL '{}' cannot be a base", self.api_url))
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.extend(segment.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    fn repo_endpoint(&self, repo: &RepoRef, tail: &[&str]) -> Result<Url, GatewayError> {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    /// Send a request, walking [`AUTH_SCHEMES`] until one is not answered
    /// with HTTP 401.
    async fn send<F>(
        &self,
        credential: &Credential,
        build: F,
    ) -> Result<reqwest::Response, GatewayError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send,
    {
        for scheme in AUTH_SCHEMES {
            let mut value = HeaderValue::from_str(&scheme.header_value(credential))
                .map_err(|_| GatewayError::Credential)?;
            value.set_sensitive(true);

            let resp = build(&self.http).header(AUTHORIZATION, value).send().await?;
            if resp.status() != StatusCode::UNAUTHORIZED {
                return Ok(resp);
            }
            debug!(scheme = %scheme, "host rejected auth scheme");
        }
        warn!("credential rejected under every auth scheme");
        Err(GatewayError::Credential)
    }

    async fn expect_success(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(error_from_status(status.as_u16(), &body))
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, GatewayError> {
        let resp = Self::expect_success(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| GatewayError::ParseError(e.to_string()))
    }

    /// Files over the contents API size limit come back with
    /// `encoding: "none"`; fetch those through the raw media type.
    async fn fetch_raw(
        &self,
        credential: &Credential,
        url: &Url,
        git_ref: &str,
    ) -> Result<Vec<u8>, GatewayError> {
        let resp = self
            .send(credential, |http| {
                http.get(url.clone())
                    .header(ACCEPT, RAW_MEDIA_TYPE)
                    .query(&[("ref", git_ref)])
            })
            .await?;
        let resp = Self::expect_success(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl RepoGateway for GitHubGateway {
    #[instrument(skip(self, credential))]
    async fn authenticated_user(&self, credential: &Credential) -> Result<AuthUser, GatewayError> {
        let url = self.endpoint(&["user"])?;
        let resp = self.send(credential, |http| http.get(url.clone())).await?;
        let user: WireUser = Self::read_json(resp).await?;
        debug!(login = %user.login, "fetched authenticated user");
        Ok(AuthUser {
            login: user.login,
            avatar_url: user.avatar_url,
        })
    }

    #[instrument(skip(self, credential))]
    async fn list_repositories(
        &self,
        credential: &Credential,
    ) -> Result<Vec<RepoRef>, GatewayError> {
        let url = self.endpoint(&["user", "repos"])?;
        let resp = self
            .send(credential, |http| {
                http.get(url.clone())
                    .query(&[("sort", "updated"), ("per_page", "100")])
            })
            .await?;
        let repos: Vec<WireRepo> = Self::read_json(resp).await?;
        debug!(count = repos.len(), "fetched repositories");
        Ok(repos.into_iter().map(RepoRef::from).collect())
    }

    #[instrument(skip(self, credential))]
    async fn get_repository(
        &self,
        credential: &Credential,
        owner: &str,
        name: &str,
    ) -> Result<RepoRef, GatewayError> {
        let url = self.endpoint(&["repos", owner, name])?;
        let resp = self.send(credential, |http| http.get(url.clone())).await?;
        let repo: WireRepo = Self::read_json(resp).await?;
        let repo = RepoRef::from(repo);
        debug!(repo = %repo, default_branch = %repo.default_branch, "fetched repository");
        Ok(repo)
    }

    #[instrument(skip(self, credential, repo), fields(repo = %repo))]
    async fn get_tree(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        git_ref: Option<&str>,
    ) -> Result<Vec<TreeEntry>, GatewayError> {
        let branch = git_ref.unwrap_or(&repo.default_branch);
        let url = self.repo_endpoint(repo, &["git", "trees", branch])?;
        let resp = self
            .send(credential, |http| {
                http.get(url.clone()).query(&[("recursive", "1")])
            })
            .await?;

        // 409 is "Git Repository is empty"; 404 is a branch with no commit.
        if matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::CONFLICT) {
            return Err(GatewayError::EmptyRepository {
                repo: repo.full_name(),
                branch: branch.to_string(),
            });
        }

        let wire: WireTree = Self::read_json(resp).await?;
        if wire.truncated {
            warn!(branch, "host truncated the recursive tree listing");
            return Err(GatewayError::TruncatedTree {
                repo: repo.full_name(),
                git_ref: branch.to_string(),
            });
        }

        let entries: Vec<TreeEntry> = wire
            .tree
            .into_iter()
            .filter_map(|e| {
                let kind = match e.kind.as_str() {
                    "blob" => EntryKind::Blob,
                    "tree" => EntryKind::Tree,
                    other => {
                        debug!(path = %e.path, kind = other, "skipping tree entry");
                        return None;
                    }
                };
                Some(TreeEntry {
                    path: e.path,
                    kind,
                    content_hash: e.sha,
                    size_bytes: e.size,
                })
            })
            .collect();
        debug!(count = entries.len(), branch, "fetched tree");
        Ok(entries)
    }

    #[instrument(skip(self, credential, repo), fields(repo = %repo))]
    async fn get_file_content(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<FileContent, GatewayError> {
        let branch = git_ref.unwrap_or(&repo.default_branch);
        let url = self.repo_endpoint(repo, &["contents", path])?;
        let resp = self
            .send(credential, |http| {
                http.get(url.clone()).query(&[("ref", branch)])
            })
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(path, "file absent at ref");
            return Ok(FileContent::missing());
        }

        let value: serde_json::Value = Self::read_json(resp).await?;
        if value.is_array() {
            debug!(path, "path is a directory");
            return Ok(FileContent::missing());
        }
        let file: WireFile =
            serde_json::from_value(value).map_err(|e| GatewayError::ParseError(e.to_string()))?;
        if file.kind != "file" {
            debug!(path, kind = %file.kind, "path is not a regular file");
            return Ok(FileContent::missing());
        }

        let body = match (file.encoding.as_deref(), file.content) {
            (Some("base64"), Some(content)) => decode_base64(&content)?,
            (Some("none"), _) | (_, None) => self.fetch_raw(credential, &url, branch).await?,
            (_, Some(content)) => content.into_bytes(),
        };
        debug!(path, bytes = body.len(), "fetched file");
        Ok(FileContent::found(body))
    }

    #[instrument(skip(self, credential, repo), fields(repo = %repo))]
    async fn get_branch_head(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<BranchHead, GatewayError> {
        let url = self.repo_endpoint(repo, &["git", "ref", "heads", branch])?;
        let resp = self.send(credential, |http| http.get(url.clone())).await?;
        if matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::CONFLICT) {
            return Err(GatewayError::EmptyRepository {
                repo: repo.full_name(),
                branch: branch.to_string(),
            });
        }
        let git_ref: WireRef = Self::read_json(resp).await?;
        let commit_sha = git_ref.object.sha;

        let url = self.repo_endpoint(repo, &["git", "commits", &commit_sha])?;
        let resp = self.send(credential, |http| http.get(url.clone())).await?;
        let commit: WireCommit = Self::read_json(resp).await?;

        debug!(branch, commit = %commit_sha, tree = %commit.tree.sha, "resolved branch head");
        Ok(BranchHead {
            commit_sha,
            tree_sha: commit.tree.sha,
        })
    }

    #[instrument(skip(self, credential, repo, content), fields(repo = %repo, bytes = content.len()))]
    async fn create_blob(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        content: &[u8],
    ) -> Result<String, GatewayError> {
        let url = self.repo_endpoint(repo, &["git", "blobs"])?;
        let payload = serde_json::json!({
            "content": BASE64.encode(content),
            "encoding": "base64",
        });
        let resp = self
            .send(credential, |http| http.post(url.clone()).json(&payload))
            .await?;
        let blob: WireSha = Self::read_json(resp).await?;
        Ok(blob.sha)
    }

    #[instrument(skip(self, credential, repo, entries), fields(repo = %repo, entries = entries.len()))]
    async fn create_tree(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        entries: &[NewTreeEntry],
        base_tree: Option<&str>,
    ) -> Result<String, GatewayError> {
        let url = self.repo_endpoint(repo, &["git", "trees"])?;
        let tree: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "path": e.path,
                    "mode": "100644",
                    "type": "blob",
                    "sha": e.blob_sha,
                })
            })
            .collect();
        let mut payload = serde_json::json!({ "tree": tree });
        if let Some(base) = base_tree {
            payload["base_tree"] = serde_json::Value::String(base.to_string());
        }
        let resp = self
            .send(credential, |http| http.post(url.clone()).json(&payload))
            .await?;
        let created: WireSha = Self::read_json(resp).await?;
        debug!(tree = %created.sha, "created tree");
        Ok(created.sha)
    }

    #[instrument(skip(self, credential, repo, message), fields(repo = %repo))]
    async fn create_commit(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String, GatewayError> {
        let url = self.repo_endpoint(repo, &["git", "commits"])?;
        let payload = serde_json::json!({
            "message": message,
            "tree": tree_sha,
            "parents": parents,
        });
        let resp = self
            .send(credential, |http| http.post(url.clone()).json(&payload))
            .await?;
        let commit: WireSha = Self::read_json(resp).await?;
        info!(commit = %commit.sha, "created commit");
        Ok(commit.sha)
    }

    #[instrument(skip(self, credential, repo), fields(repo = %repo))]
    async fn move_ref(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        branch: &str,
        commit_sha: &str,
    ) -> Result<(), GatewayError> {
        let url = self.repo_endpoint(repo, &["git", "refs", "heads", branch])?;
        let payload = serde_json::json!({ "sha": commit_sha, "force": false });
        let resp = self
            .send(credential, |http| http.patch(url.clone()).json(&payload))
            .await?;
        Self::expect_success(resp).await?;
        info!(branch, commit = commit_sha, "moved branch ref");
        Ok(())
    }

    #[instrument(skip(self, credential, repo, content, message), fields(repo = %repo))]
    async fn create_file(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        branch: &str,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<String, GatewayError> {
        let url = self.repo_endpoint(repo, &["contents", path])?;
        let payload = serde_json::json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": branch,
        });
        let resp = self
            .send(credential, |http| http.put(url.clone()).json(&payload))
            .await?;
        let written: WireContentsWrite = Self::read_json(resp).await?;
        debug!(path, commit = %written.commit.sha, "committed file via contents API");
        Ok(written.commit.sha)
    }

    #[instrument(skip(self, credential, description))]
    async fn create_repository(
        &self,
        credential: &Credential,
        name: &str,
        description: &str,
        private: bool,
    ) -> Result<RepoRef, GatewayError> {
        let sanitized = sanitize_repo_name(name)?;
        let url = self.endpoint(&["user", "repos"])?;
        let payload = serde_json::json!({
            "name": sanitized,
            "description": description,
            "private": private,
            "auto_init": false,
        });
        let resp = self
            .send(credential, |http| http.post(url.clone()).json(&payload))
            .await?;

        if resp.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body = resp.text().await.unwrap_or_default();
            let message = fold_error_body(422, &body);
            if message.to_ascii_lowercase().contains("already exists") {
                return Err(GatewayError::NameTaken { name: sanitized });
            }
            return Err(GatewayError::Validation { message });
        }

        let repo: WireRepo = Self::read_json(resp).await?;
        let repo = RepoRef::from(repo);
        info!(repo = %repo, private, "created repository");
        Ok(repo)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Decode the contents API transport encoding. GitHub wraps base64 at 60
/// columns, so whitespace is dropped first. The bytes are returned as they
/// are stored; no text decoding happens here.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, GatewayError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| GatewayError::ParseError(format!("invalid base64 content: {}", e)))
}

/// Map a non-success status and its body to a [`GatewayError`].
pub fn error_from_status(status: u16, body: &str) -> GatewayError {
    let message = fold_error_body(status, body);
    match status {
        401 => GatewayError::Credential,
        404 => GatewayError::NotFound(message),
        422 => GatewayError::Validation { message },
        500..=599 => GatewayError::Transient { status, message },
        _ => GatewayError::ApiError { status, message },
    }
}

/// Fold `{message, errors: [{field, message, code}]}` into one line.
/// Non-JSON bodies are returned verbatim.
pub fn fold_error_body(status: u16, body: &str) -> String {
    if body.trim().is_empty() {
        return format!("HTTP {}", status);
    }
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.to_string(),
    };

    let message = value
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string);

    let details: Vec<String> = value
        .get("errors")
        .and_then(|e| e.as_array())
        .map(|errors| errors.iter().filter_map(describe_field_error).collect())
        .unwrap_or_default();

    match (message, details.is_empty()) {
        (Some(msg), true) => msg,
        (Some(msg), false) => format!("{} ({})", msg, details.join("; ")),
        (None, false) => details.join("; "),
        (None, true) => body.to_string(),
    }
}

fn describe_field_error(error: &serde_json::Value) -> Option<String> {
    if let Some(text) = error.as_str() {
        return Some(text.to_string());
    }
    let field = error.get("field").and_then(|f| f.as_str());
    let detail = error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.get("code").and_then(|c| c.as_str()));
    match (field, detail) {
        (Some(field), Some(detail)) => Some(format!("{}: {}", field, detail)),
        (None, Some(detail)) => Some(detail.to_string()),
        (Some(field), None) => Some(format!("{}: invalid", field)),
        (None, None) => None,
    }
}
