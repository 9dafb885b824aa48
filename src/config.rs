//! Runtime configuration for demobot.
//!
//! All configuration is resolved once at process start into an explicit
//! [`Config`] struct and passed by parameter into every component — no
//! component reads ambient environment state directly. `.env` files are
//! loaded (via dotenvy) before `Config::from_env` runs, so the same binary
//! works locally, in CI, or as a scheduled batch job.

use std::path::PathBuf;

use thiserror::Error;

/// Label added to an issue once a demo PR has been opened for it.
/// Issues carrying this label are excluded from further processing.
pub const IN_PROGRESS_LABEL: &str = "in-progress";

/// Default label marking an issue as a demo-generation request.
pub const DEFAULT_TRACKING_LABEL: &str = "python_demonstrator";

/// Default directory under which per-repository working copies are kept.
pub const DEFAULT_CLONE_ROOT: &str = "repo_clone";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {var}")]
    Missing { var: &'static str },

    #[error("TARGET_REPOS contains an invalid repository slug '{slug}' (expected owner/name)")]
    InvalidRepoSlug { slug: String },

    #[error("TARGET_REPOS is empty")]
    NoRepos,
}

/// A single remote repository and its local working copy location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub owner: String,
    pub name: String,
    /// Local working copy path, derived from the clone root.
    pub workdir: PathBuf,
}

impl RepoHandle {
    /// Parse an `owner/name` slug into a handle rooted at `clone_root`.
    pub fn parse(slug: &str, clone_root: &std::path::Path) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = slug.split('/').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(ConfigError::InvalidRepoSlug {
                slug: slug.to_string(),
            });
        }
        let owner = parts[0].to_string();
        let name = parts[1].to_string();
        let workdir = clone_root.join(format!("{}_{}", owner, name));
        Ok(Self {
            owner,
            name,
            workdir,
        })
    }

    /// The `owner/name` slug.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub token with `repo` scope, used for both the REST API and git pushes.
    pub github_token: String,
    /// Credential for the code-generation API.
    pub openai_api_key: String,
    /// Repositories to reconcile, in processing order.
    pub repos: Vec<RepoHandle>,
    /// Label marking issues as demo-generation requests.
    pub tracking_label: String,
    /// Directory holding the per-repository working copies.
    pub clone_root: PathBuf,
    /// Model name for the generation call.
    pub model: String,
    /// Base URL of the generation API.
    pub openai_base_url: String,
}

impl Config {
    /// Build configuration from the process environment.
    ///
    /// `GH_TOKEN`, `OPENAI_API_KEY` and `TARGET_REPOS` are required; the
    /// rest have defaults. Fails before any repository is touched.
    pub fn from_env() -> Result<Self, ConfigError> {
        let github_token = require("GH_TOKEN")?;
        let openai_api_key = require("OPENAI_API_KEY")?;
        let target_repos = require("TARGET_REPOS")?;

        let tracking_label = std::env::var("PYTHON_DEMONSTRATOR_LABEL")
            .unwrap_or_else(|_| DEFAULT_TRACKING_LABEL.to_string());
        let clone_root = PathBuf::from(
            std::env::var("DEMOBOT_CLONE_ROOT").unwrap_or_else(|_| DEFAULT_CLONE_ROOT.to_string()),
        );
        let model =
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let openai_base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let repos = Self::parse_repo_list(&target_repos, &clone_root)?;

        Ok(Self {
            github_token,
            openai_api_key,
            repos,
            tracking_label,
            clone_root,
            model,
            openai_base_url,
        })
    }

    /// Parse a comma-separated repository list, preserving order and
    /// skipping empty segments.
    pub fn parse_repo_list(
        raw: &str,
        clone_root: &std::path::Path,
    ) -> Result<Vec<RepoHandle>, ConfigError> {
        let repos: Vec<RepoHandle> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|slug| RepoHandle::parse(slug, clone_root))
            .collect::<Result<_, _>>()?;
        if repos.is_empty() {
            return Err(ConfigError::NoRepos);
        }
        Ok(repos)
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing { var }),
    }
}
