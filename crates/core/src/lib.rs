//! RepoFuse core library.
//!
//! This crate provides the repository reconciliation engine: a typed client
//! for the GitHub REST API, a two-way tree differ, conflict resolution state,
//! commit planning for root and folder merges, and a commit writer with a
//! fallback for empty repositories.

pub mod config;
pub mod errors;
pub mod gateway;
pub mod merge_engine;
pub mod models;
pub mod reconcile;
pub mod writer;

// Re-exports for convenience.
pub use config::AppConfig;
pub use errors::CoreError;
pub use gateway::{Credential, GitHubGateway, RepoGateway, RepoLocator};
pub use merge_engine::{MergeEngine, MergeOptions, MergeSession};
pub use reconcile::{ResolutionState, Side, TreeReconciler};
pub use writer::CommitWriter;
