//! `diff` and `merge` commands.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use dialoguer::Select;

use repofuse_core::models::FileChange;
use repofuse_core::reconcile::DiffSummary;
use repofuse_core::{MergeSession, Side};

use crate::style;
use crate::Workspace;

/// Lines of each side shown during interactive review.
const PREVIEW_LINES: usize = 12;

/// Options of the `merge` command.
#[derive(Debug, Clone, Default)]
pub struct MergeArgs {
    pub prefer: Option<Side>,
    pub interactive: bool,
    pub branch: Option<String>,
    pub message: Option<String>,
    pub yes: bool,
}

async fn compare(
    workspace: &Workspace,
    source: &str,
    target: &str,
    branch: Option<&str>,
) -> Result<MergeSession> {
    let source = workspace.lookup(source).await?;
    let target = workspace.lookup(target).await?;

    let spinner = style::spinner(format!("Comparing {} with {}...", source, target));
    let session = workspace.engine.compare_into(&source, &target, branch).await;
    spinner.finish_and_clear();
    session.with_context(|| format!("failed to compare {} with {}", source, target))
}

/// Show what a merge of `source` into `target` would do.
pub async fn cmd_diff(
    workspace: &Workspace,
    source: &str,
    target: &str,
    branch: Option<&str>,
) -> Result<()> {
    let session = compare(workspace, source, target, branch).await?;
    print_changes(&session);
    Ok(())
}

/// Compare, resolve, and push `source` into `target`.
pub async fn cmd_merge(
    workspace: &Workspace,
    source: &str,
    target: &str,
    args: MergeArgs,
) -> Result<()> {
    let mut session = compare(workspace, source, target, args.branch.as_deref()).await?;
    print_changes(&session);

    let summary = session.summary();
    if summary.is_identical() {
        return Ok(());
    }

    if summary.conflicts > 0 && (args.prefer.is_some() || args.interactive) {
        let spinner = style::spinner(format!("Loading {} conflict(s)...", summary.conflicts));
        let loaded = workspace.engine.load_conflict_contents(&mut session).await;
        spinner.finish_and_clear();
        loaded.context("failed to load conflicting files")?;

        if let Some(side) = args.prefer {
            let resolved = session.state.resolve_all(side);
            println!(
                "{}",
                style::success(&format!("Resolved {} conflict(s) with {} content", resolved, side))
            );
        }
        if args.interactive {
            review_conflicts(&mut session)?;
        }
    }

    let unresolved = session.state.count_unresolved_conflicts();
    if unresolved > 0 {
        if !args.yes {
            anyhow::bail!(
                "{} conflict(s) unresolved; use --prefer, --interactive, or --yes to take source content",
                unresolved
            );
        }
        println!(
            "{}",
            style::warn(&format!(
                "{} unresolved conflict(s) will take source content",
                unresolved
            ))
        );
    }

    let target = session.target.clone();
    let message = workspace.message(args.message);
    let spinner = style::spinner(format!("Pushing into {}@{}...", target, session.target_branch));
    let outcome = workspace.engine.merge(session, None, &message).await;
    spinner.finish_and_clear();
    let outcome = outcome.with_context(|| format!("failed to push merge into {}", target))?;

    println!(
        "{}",
        style::success(&format!(
            "Committed {} file(s) to {}@{}",
            outcome.files_written, target, outcome.branch
        ))
    );
    println!("  Commit  : {}", outcome.commit_sha);
    println!("  Strategy: {}", outcome.strategy);
    Ok(())
}

fn print_changes(session: &MergeSession) {
    let summary = session.summary();
    println!();
    println!(
        "{}",
        style::header(&format!(
            "{} → {}@{}",
            session.source, session.target, session.target_branch
        ))
    );
    println!(
        "{}",
        style::dim(&format!(
            "session {} at {}",
            session.id,
            session.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ))
    );
    if session.target_empty {
        println!("{}", style::dim("Target has no commits yet."));
    }
    println!();

    if summary.is_identical() {
        println!("{}", style::success("Repositories are identical, nothing to merge"));
        println!();
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Status", "Path", "Resolved"]);
    for change in session.state.changes() {
        table.add_row(vec![
            style::status_cell(change.status),
            Cell::new(&change.path),
            Cell::new(if change.resolved { "yes" } else { "" }),
        ]);
    }
    println!("{}", table);
    println!();
    println!("{}", summary_line(&summary));
    println!();
}

fn summary_line(summary: &DiffSummary) -> String {
    format!(
        "{} conflict(s), {} added, {} only in target",
        summary.conflicts, summary.added, summary.deleted
    )
}

fn review_conflicts(session: &mut MergeSession) -> Result<()> {
    let paths: Vec<String> = session
        .state
        .conflict_paths()
        .into_iter()
        .map(String::from)
        .collect();
    let total = paths.len();

    for (i, path) in paths.iter().enumerate() {
        let Some(change) = session.state.get(path) else {
            continue;
        };
        println!();
        println!("{}", style::header(&format!("[{}/{}] {}", i + 1, total, path)));
        print_side("source", change.source_content.as_deref());
        print_side("target", change.target_content.as_deref());

        let options = options_for(change);
        let labels: Vec<&str> = options.iter().map(|(label, _)| *label).collect();
        let choice = Select::new()
            .with_prompt("Keep which version?")
            .items(&labels)
            .default(0)
            .interact()
            .context("failed to read selection")?;

        match options[choice].1 {
            Some(side) => {
                session.state.resolve_side(path, side);
            }
            None => {
                session.state.unresolve(path);
            }
        }
    }
    Ok(())
}

/// Selectable answers for one conflict. A side without a text preview is
/// still offered; its bytes are read when the merge is pushed.
fn options_for(change: &FileChange) -> Vec<(&'static str, Option<Side>)> {
    let label = |shown: bool, text: &'static str, binary: &'static str| {
        if shown {
            text
        } else {
            binary
        }
    };
    vec![
        (
            label(change.source_content.is_some(), "Keep source", "Keep source (no preview)"),
            Some(Side::Source),
        ),
        (
            label(change.target_content.is_some(), "Keep target", "Keep target (no preview)"),
            Some(Side::Target),
        ),
        ("Skip (leave unresolved)", None),
    ]
}

fn print_side(label: &str, content: Option<&str>) {
    match content {
        Some(content) => {
            println!("{}", style::dim(&format!("--- {} ({} bytes)", label, content.len())));
            println!("{}", preview(content, PREVIEW_LINES));
        }
        None => println!("{}", style::dim(&format!("--- {} (binary, no preview)", label))),
    }
}

fn preview(content: &str, max_lines: usize) -> String {
    let total = content.lines().count();
    let mut shown: Vec<&str> = content.lines().take(max_lines).collect();
    if total > max_lines {
        shown.push("...");
    }
    shown.join("\n")
}
