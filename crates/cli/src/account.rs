//! Account-level commands: `whoami`, `repos`, `create-repo`.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use repofuse_core::gateway::locator::repo_web_url;
use repofuse_core::RepoGateway;

use crate::style;
use crate::Workspace;

pub async fn cmd_whoami(workspace: &Workspace) -> Result<()> {
    let engine = &workspace.engine;
    let user = engine
        .gateway()
        .authenticated_user(engine.credential())
        .await
        .context("failed to verify token")?;

    println!("{}", style::success(&format!("Authenticated as {}", user.login)));
    println!("  API: {}", workspace.config.host.api_url);
    Ok(())
}

pub async fn cmd_repos(workspace: &Workspace) -> Result<()> {
    let engine = &workspace.engine;
    let repos = engine
        .gateway()
        .list_repositories(engine.credential())
        .await
        .context("failed to list repositories")?;

    if repos.is_empty() {
        println!("No repositories found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Repository", "Default branch"]);
    for repo in &repos {
        table.add_row(vec![Cell::new(repo.full_name()), Cell::new(&repo.default_branch)]);
    }

    println!("{}", table);
    println!();
    println!(
        "{}",
        style::dim(&format!("{} most recently updated repositories", repos.len()))
    );
    Ok(())
}

pub async fn cmd_create_repo(
    workspace: &Workspace,
    name: &str,
    description: &str,
    public: bool,
) -> Result<()> {
    let private = !public && workspace.config.merge.private_repos;
    let repo = workspace
        .engine
        .create_repository(name, description, private)
        .await
        .with_context(|| format!("failed to create repository '{}'", name))?;

    println!(
        "{}",
        style::success(&format!(
            "Created {} repository {}",
            if private { "private" } else { "public" },
            repo
        ))
    );
    println!(
        "  {}",
        repo_web_url(&workspace.config.host.api_url, &repo.owner, &repo.name)
    );
    Ok(())
}
