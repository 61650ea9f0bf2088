//! TOML-based configuration system for RepoFuse.
//!
//! The host token is never stored in the file. `host.token_env` names the
//! environment variable that holds it, resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::gateway::Credential;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Repository host API settings.
    #[serde(default)]
    pub host: HostConfig,

    /// Merge and push behaviour.
    #[serde(default)]
    pub merge: MergeConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// GitHub (or GitHub Enterprise Server) API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// REST API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// `User-Agent` sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Resolved token (not serialized).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_user_agent() -> String {
    format!("repofuse/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            user_agent: default_user_agent(),
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge, hydration and push settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Concurrent content fetches while hydrating a plan.
    #[serde(default = "default_concurrency")]
    pub hydrate_concurrency: usize,

    /// Concurrent blob uploads during a git-data push.
    #[serde(default = "default_concurrency")]
    pub blob_concurrency: usize,

    /// Commit message used when none is given on the command line.
    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    /// Whether `create-repo` makes private repositories.
    #[serde(default = "default_true")]
    pub private_repos: bool,
}

fn default_concurrency() -> usize {
    8
}
fn default_commit_message() -> String {
    "Merge via repofuse".into()
}
fn default_true() -> bool {
    true
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            hydrate_concurrency: default_concurrency(),
            blob_concurrency: default_concurrency(),
            commit_message: default_commit_message(),
            private_repos: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading / validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// Does **not** resolve environment variables; call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Like [`load_from_file`](Self::load_from_file), but a missing file
    /// yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load_from_file(path.as_ref()) {
            Err(ConfigError::FileNotFound(p)) => {
                debug!(path = %p, "no configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Resolve `_env` references into their secret values.
    ///
    /// A missing variable is not an error here; it surfaces when
    /// [`credential`](Self::credential) is asked for.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        self.host.token = resolve_optional_env(&self.host.token_env, "host.token_env");
        Ok(())
    }

    /// Validate semantic constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.api_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "host.api_url".into(),
                detail: "API URL must not be empty".into(),
            });
        }
        if !self.host.api_url.starts_with("http://") && !self.host.api_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "host.api_url".into(),
                detail: "API URL must start with http:// or https://".into(),
            });
        }
        if self.host.token_env.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "host.token_env".into(),
                detail: "token environment variable name must not be empty".into(),
            });
        }
        if self.merge.hydrate_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "merge.hydrate_concurrency".into(),
                detail: "concurrency must be > 0".into(),
            });
        }
        if self.merge.blob_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "merge.blob_concurrency".into(),
                detail: "concurrency must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Load (or default), resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_or_default(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// The resolved host credential.
    pub fn credential(&self) -> Result<Credential, ConfigError> {
        self.host
            .token
            .as_deref()
            .map(Credential::new)
            .ok_or_else(|| ConfigError::EnvVarMissing {
                var: self.host.token_env.clone(),
                field: "host.token_env".into(),
            })
    }

    /// Render this configuration as TOML, for `init`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Read an environment variable by name. Logs a warning and returns `None`
/// if the variable is unset or empty.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.trim().is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val.trim().to_string())
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
