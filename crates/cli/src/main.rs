//! RepoFuse command-line tool.
//!
//! Compares GitHub repositories, resolves conflicts, and commits the merged
//! file set into a destination repository, either at the root or under a
//! folder prefix. Also generates and validates configuration files.

mod account;
mod folder;
mod merge;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::Confirm;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use repofuse_core::config::AppConfig;
use repofuse_core::models::RepoRef;
use repofuse_core::{GitHubGateway, MergeEngine, MergeOptions, RepoLocator, Side};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// RepoFuse command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "repofuse",
    version,
    about = "Reconcile GitHub repositories into a single destination"
)]
struct Cli {
    /// Path to the TOML configuration file
    /// (default: ~/.config/repofuse/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter (overrides `log.level` from the config).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the account the configured token belongs to.
    Whoami,

    /// List repositories of the authenticated account.
    Repos,

    /// Compare two repositories without writing anything.
    Diff {
        /// Source repository (owner/name or URL).
        source: String,
        /// Target repository (owner/name or URL).
        target: String,

        /// Target branch to compare against (default: its default branch).
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Merge the source repository into the target repository.
    Merge {
        /// Source repository (owner/name or URL).
        source: String,
        /// Target repository (owner/name or URL).
        target: String,

        /// Resolve every conflict with one side.
        #[arg(long, value_enum)]
        prefer: Option<PreferArg>,

        /// Review conflicts one by one.
        #[arg(short, long)]
        interactive: bool,

        /// Target branch to compare against and push to (default: the
        /// target's default branch).
        #[arg(short, long)]
        branch: Option<String>,

        /// Commit message (default: `merge.commit_message`).
        #[arg(short, long)]
        message: Option<String>,

        /// Push even when conflicts are unresolved (they take source content).
        #[arg(short, long)]
        yes: bool,
    },

    /// Copy a whole repository into a folder of another repository.
    ImportFolder {
        /// Repository to copy.
        source: String,
        /// Repository that receives the folder.
        target: String,

        /// Folder inside the target.
        #[arg(short, long)]
        prefix: String,

        #[arg(short, long)]
        branch: Option<String>,

        #[arg(short, long)]
        message: Option<String>,
    },

    /// Copy a folder of one repository to the root of another.
    ExportFolder {
        /// Repository holding the folder.
        holder: String,
        /// Repository that receives the files.
        destination: String,

        /// Folder inside the holder.
        #[arg(short, long)]
        prefix: String,

        #[arg(short, long)]
        branch: Option<String>,

        #[arg(short, long)]
        message: Option<String>,
    },

    /// Create a repository under the authenticated account.
    CreateRepo {
        /// Repository name; sanitized to the host's allowed characters.
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Create a public repository regardless of `merge.private_repos`.
        #[arg(long)]
        public: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path (default: the `--config` path).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the configuration file.
    Validate,
}

/// Side chosen by `--prefer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PreferArg {
    Source,
    Target,
}

impl From<PreferArg> for Side {
    fn from(arg: PreferArg) -> Self {
        match arg {
            PreferArg::Source => Side::Source,
            PreferArg::Target => Side::Target,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    let level = cli
        .log_level
        .clone()
        .or_else(|| {
            AppConfig::load_or_default(&config_path)
                .ok()
                .map(|c| c.log.level)
        })
        .unwrap_or_else(|| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command, &config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config_path: &Path) -> Result<()> {
    match &command {
        Commands::Init { output } => return cmd_init(output.as_deref().unwrap_or(config_path)),
        Commands::Validate => return cmd_validate(config_path),
        _ => {}
    }

    // Everything else talks to the host.
    let workspace = Workspace::open(config_path)?;

    match command {
        Commands::Whoami => account::cmd_whoami(&workspace).await,
        Commands::Repos => account::cmd_repos(&workspace).await,
        Commands::CreateRepo {
            name,
            description,
            public,
        } => account::cmd_create_repo(&workspace, &name, &description, public).await,
        Commands::Diff {
            source,
            target,
            branch,
        } => merge::cmd_diff(&workspace, &source, &target, branch.as_deref()).await,
        Commands::Merge {
            source,
            target,
            prefer,
            interactive,
            branch,
            message,
            yes,
        } => {
            let options = merge::MergeArgs {
                prefer: prefer.map(Side::from),
                interactive,
                branch,
                message,
                yes,
            };
            merge::cmd_merge(&workspace, &source, &target, options).await
        }
        Commands::ImportFolder {
            source,
            target,
            prefix,
            branch,
            message,
        } => folder::cmd_import(&workspace, &source, &target, &prefix, branch, message).await,
        Commands::ExportFolder {
            holder,
            destination,
            prefix,
            branch,
            message,
        } => {
            folder::cmd_export(&workspace, &holder, &destination, &prefix, branch, message).await
        }
        Commands::Init { .. } | Commands::Validate => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repofuse")
        .join("config.toml")
}

/// Loaded configuration plus a connected engine.
pub struct Workspace {
    pub config: AppConfig,
    pub engine: MergeEngine<GitHubGateway>,
}

impl Workspace {
    fn open(config_path: &Path) -> Result<Self> {
        let config =
            AppConfig::load_and_resolve(config_path).context("failed to load configuration")?;
        let credential = config.credential().with_context(|| {
            format!(
                "no GitHub token: export {} or set host.token_env",
                config.host.token_env
            )
        })?;
        let gateway =
            GitHubGateway::from_config(&config.host).context("failed to create GitHub client")?;
        let engine = MergeEngine::new(
            Arc::new(gateway),
            credential,
            MergeOptions::from(&config.merge),
        );
        debug!(path = %config_path.display(), api_url = %config.host.api_url, "workspace opened");
        Ok(Self { config, engine })
    }

    /// Parse a user-supplied locator and look the repository up.
    pub async fn lookup(&self, input: &str) -> Result<RepoRef> {
        let locator = RepoLocator::parse(input, &self.config.host.api_url)
            .with_context(|| format!("invalid repository '{}'", input))?;
        self.engine
            .resolve(&locator)
            .await
            .with_context(|| format!("failed to look up repository {}", locator))
    }

    /// `--message`, falling back to the configured default.
    pub fn message(&self, message: Option<String>) -> String {
        message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.merge.commit_message.clone())
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", output.display()))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !overwrite {
            println!(
                "{}",
                style::warn("Init cancelled. Existing file was not modified.")
            );
            return Ok(());
        }
    }

    let body = AppConfig::default()
        .to_toml()
        .context("failed to render default configuration")?;
    let content = format!(
        "# RepoFuse configuration\n# The token itself is read from the variable named by host.token_env.\n\n{}",
        body
    );

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    std::fs::write(output, content).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!();
    println!("Next steps:");
    println!("  1. Export your GitHub token: export GITHUB_TOKEN=...");
    println!(
        "  2. Validate with: repofuse validate --config {}",
        output.display()
    );
    println!("  3. Check the token: repofuse whoami");

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config = if config_path.exists() {
        let config =
            AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
        println!("  [OK] TOML structure is valid");
        config
    } else {
        println!("  [--] File not found, checking defaults");
        AppConfig::default()
    };

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => println!("  [OK] All fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  API URL        : {}", config.host.api_url);
    println!(
        "  Token ({:<7}): {}",
        config.host.token_env,
        if config.host.token.is_some() {
            "set"
        } else {
            "NOT SET"
        }
    );
    println!("  Hydrate conc.  : {}", config.merge.hydrate_concurrency);
    println!("  Blob conc.     : {}", config.merge.blob_concurrency);
    println!("  Commit message : {}", config.merge.commit_message);
    println!("  Private repos  : {}", config.merge.private_repos);
    println!("  Log level      : {}", config.log.level);
    println!();

    if config.host.token.is_some() {
        println!("{}", style::success("Configuration is valid."));
    } else {
        println!(
            "{}",
            style::warn(&format!(
                "Configuration is valid, but {} is not set.",
                config.host.token_env
            ))
        );
    }
    Ok(())
}
