//! Error types for the RepoFuse core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Push(#[from] PushError),

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Gateway errors
// ---------------------------------------------------------------------------

/// Errors from the remote repository host (GitHub REST API).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Every auth scheme was answered with HTTP 401.
    #[error("GitHub credential is invalid or expired, re-authenticate and try again")]
    Credential,

    /// The host answered HTTP 404.
    #[error("GitHub resource not found: {0}")]
    NotFound(String),

    /// The branch exists in name only: no commit has been made yet.
    #[error("repository {repo} has no commits on branch '{branch}'")]
    EmptyRepository { repo: String, branch: String },

    /// The host cut a recursive tree listing short; a merge built on it
    /// would silently miss files.
    #[error("tree listing of {repo}@{git_ref} was truncated by the host")]
    TruncatedTree { repo: String, git_ref: String },

    /// Repository creation collided with an existing repository.
    #[error("a repository named '{name}' already exists, choose another name")]
    NameTaken { name: String },

    /// The requested repository name has no usable characters.
    #[error("invalid repository name '{0}'")]
    InvalidName(String),

    /// HTTP 422 with the host's field-level details folded in.
    #[error("GitHub validation failed: {message}")]
    Validation { message: String },

    /// 5xx from the host. Not retried by the core.
    #[error("GitHub host error (HTTP {status}): {message}")]
    Transient { status: u16, message: String },

    /// Any other non-success status.
    #[error("GitHub API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// JSON or transport-encoding decode failure.
    #[error("GitHub response parse error: {0}")]
    ParseError(String),
}

impl GatewayError {
    /// HTTP status associated with this error, when the host answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            Self::Credential => Some(401),
            Self::NotFound(_) => Some(404),
            Self::EmptyRepository { .. } => Some(409),
            Self::NameTaken { .. } | Self::Validation { .. } => Some(422),
            Self::Transient { status, .. } | Self::ApiError { status, .. } => Some(*status),
            Self::InvalidName(_) | Self::ParseError(_) | Self::TruncatedTree { .. } => None,
        }
    }

    /// Whether a caller-level retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::HttpError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Planning errors
// ---------------------------------------------------------------------------

/// Errors from building a commit plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Two pending files share a path.
    #[error("commit plan contains '{0}' more than once")]
    DuplicatePath(String),

    /// Folder mode needs a non-empty prefix after trimming slashes.
    #[error("folder prefix must not be empty")]
    EmptyPrefix,

    /// A merge was asked to push to a branch other than the one it was
    /// compared against.
    #[error("session compared against branch '{compared}', cannot push it to '{requested}'")]
    BranchMismatch { compared: String, requested: String },
}

// ---------------------------------------------------------------------------
// Push errors
// ---------------------------------------------------------------------------

/// Errors from committing a plan to a destination branch.
#[derive(Debug, Error)]
pub enum PushError {
    /// A gateway call failed before anything became visible on the branch.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Nothing to commit.
    #[error("commit plan has no files")]
    EmptyPlan,

    /// The per-file fallback committed some files, then a later one failed.
    #[error(
        "partial write: {} file(s) committed before '{failed_path}' failed: {source}",
        .committed.len()
    )]
    PartialWrite {
        committed: Vec<String>,
        last_commit_sha: String,
        failed_path: String,
        #[source]
        source: GatewayError,
    },
}

// ---------------------------------------------------------------------------
// Locator errors
// ---------------------------------------------------------------------------

/// Errors from parsing a user-supplied repository locator.
#[derive(Debug, Error)]
pub enum LocatorError {
    /// Not `owner/name`, an HTTPS URL, or an SSH remote.
    #[error("cannot parse repository '{0}': expected owner/name or a repository URL")]
    Unrecognized(String),

    /// The URL points at a different host than the configured API.
    #[error("repository URL host '{host}' does not match the configured host '{expected}'")]
    ForeignHost { host: String, expected: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
