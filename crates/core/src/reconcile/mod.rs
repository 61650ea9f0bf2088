//! Reconciliation: diff two trees, record resolutions, plan the commit.

pub mod differ;
pub mod planner;
pub mod resolution;

pub use differ::{DiffSummary, TreeReconciler};
pub use planner::{CommitPlanner, ContentProvider, Origin, PlannedFile};
pub use resolution::{ResolutionState, Side};
