//! Folder (subtree) mode commands.

use anyhow::{Context, Result};

use repofuse_core::models::PushOutcome;

use crate::style;
use crate::Workspace;

/// Copy every file of `source` into `target` under `prefix`.
pub async fn cmd_import(
    workspace: &Workspace,
    source: &str,
    target: &str,
    prefix: &str,
    branch: Option<String>,
    message: Option<String>,
) -> Result<()> {
    let source = workspace.lookup(source).await?;
    let target = workspace.lookup(target).await?;
    let message = workspace.message(message);

    let spinner = style::spinner(format!("Importing {} into {}/{}...", source, target, prefix));
    let outcome = workspace
        .engine
        .import_folder(&source, &target, prefix, branch, &message)
        .await;
    spinner.finish_and_clear();
    let outcome =
        outcome.with_context(|| format!("failed to import {} into {}", source, target))?;

    report(&outcome, &target.to_string());
    Ok(())
}

/// Copy the `prefix` folder of `holder` to the root of `destination`.
pub async fn cmd_export(
    workspace: &Workspace,
    holder: &str,
    destination: &str,
    prefix: &str,
    branch: Option<String>,
    message: Option<String>,
) -> Result<()> {
    let holder = workspace.lookup(holder).await?;
    let destination = workspace.lookup(destination).await?;
    let message = workspace.message(message);

    let spinner = style::spinner(format!(
        "Exporting {}/{} to {}...",
        holder, prefix, destination
    ));
    let outcome = workspace
        .engine
        .export_folder(&holder, &destination, prefix, branch, &message)
        .await;
    spinner.finish_and_clear();
    let outcome = outcome
        .with_context(|| format!("failed to export {} from {}", prefix, holder))?;

    report(&outcome, &destination.to_string());
    Ok(())
}

fn report(outcome: &PushOutcome, repo: &str) {
    println!(
        "{}",
        style::success(&format!(
            "Committed {} file(s) to {}@{}",
            outcome.files_written, repo, outcome.branch
        ))
    );
    println!("  Commit  : {}", outcome.commit_sha);
    println!("  Strategy: {}", outcome.strategy);
}
