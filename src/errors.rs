//! Typed error hierarchy for demobot.
//!
//! Three top-level enums cover the three processing units:
//! - `MaterializeError` — file-set validation and write failures
//! - `BootstrapError` — prerequisite bootstrap failures (fatal per repository)
//! - `PipelineError` — demo generation failures (fatal per issue)
//!
//! Label and comment failures after a pull request exists are deliberately
//! not part of this taxonomy: the PR is the commit point, and those steps
//! are best-effort notifications logged at the call site.

use thiserror::Error;

/// Errors from applying a file set to a working copy.
///
/// Validation variants carry the offending key so the operator can see
/// exactly which generated path was rejected.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("Empty filename supplied")]
    EmptyPath,

    #[error("Absolute path not allowed: {path}")]
    AbsolutePath { path: String },

    #[error("Path traversal detected in: {path}")]
    Traversal { path: String },

    #[error("File {path} resolves outside the working copy root")]
    EscapesRoot { path: String },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from a single prerequisite bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The existence probe failed for a reason other than "not found".
    #[error("Remote query for {path} failed: {source}")]
    RemoteQuery {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error("Git operation failed: {0}")]
    Git(#[source] anyhow::Error),

    #[error("Failed to open pull request: {0}")]
    PullRequest(#[source] anyhow::Error),
}

/// Errors from processing a single issue through the demo pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Generation call failed for issue #{issue}: {source}")]
    Generation {
        issue: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Validation(#[from] MaterializeError),

    #[error("Git operation failed: {0}")]
    Git(#[source] anyhow::Error),

    #[error("Failed to open pull request: {0}")]
    PullRequest(#[source] anyhow::Error),
}
