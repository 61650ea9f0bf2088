//! Terminal styling for RepoFuse output: marks, change-status cells, and
//! the progress spinner.

use std::time::Duration;

use comfy_table::{Cell, Color};
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use repofuse_core::models::ChangeStatus;

/// `✓ msg` with a green mark, for completed pushes and writes.
pub fn success(msg: &str) -> String {
    format!("{} {}", Style::new().green().apply_to("✓"), msg)
}

/// `⚠ msg` with a yellow mark, for soft-gate notices.
pub fn warn(msg: &str) -> String {
    format!("{} {}", Style::new().yellow().apply_to("⚠"), msg)
}

/// Bold line, used above change tables and per-conflict reviews.
pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

/// De-emphasized detail line.
pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Table cell for a change status.
pub fn status_cell(status: ChangeStatus) -> Cell {
    let cell = Cell::new(status.to_string());
    match status {
        ChangeStatus::Conflict => cell.fg(Color::Red),
        ChangeStatus::Modified => cell.fg(Color::Yellow),
        ChangeStatus::Added => cell.fg(Color::Green),
        ChangeStatus::Deleted => cell.fg(Color::Blue),
    }
}

/// Steady-ticking spinner with `msg`.
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        spinner.set_style(
            template.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(msg.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_keep_message() {
        assert!(success("pushed").ends_with(" pushed"));
        assert!(warn("2 unresolved").contains("⚠"));
        assert!(header("acme/app").contains("acme/app"));
    }
}
