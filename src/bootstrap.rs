//! Prerequisite bootstrapping.
//!
//! Each repository must carry two structural prerequisites before demo
//! generation is allowed: a `renovate.json` file and at least one workflow
//! under `.github/workflows/`. [`ensure`] probes the remote for one
//! prerequisite and, when it is missing, materializes an embedded default,
//! commits it on a fresh work branch, pushes, and opens a pull request.
//!
//! Bootstrapping is idempotent from the remote's point of view: when the
//! prerequisite exists the call performs zero writes and zero git
//! operations.

use std::path::PathBuf;

use crate::config::RepoHandle;
use crate::errors::BootstrapError;
use crate::fileset::FileSet;
use crate::git::{work_branch_name, WorkingCopy, BASE_BRANCH};
use crate::github::{GithubClient, Probe, PullRequest};

const DEFAULT_RENOVATE_JSON: &str = r#"{
  "extends": [
    "config:base"
  ],
  "schedule": [
    "before 5am on Monday"
  ],
  "automerge": false
}
"#;

const DEFAULT_WORKFLOW_YAML: &str = r#"name: Build & Push Docker Image

on:
  push:
    branches: [main]
  workflow_dispatch:

jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: Checkout repository
        uses: actions/checkout@v4

      - name: Log in to GitHub Container Registry
        uses: docker/login-action@v3
        with:
          registry: ghcr.io
          username: ${{ env.GHCR_USERNAME }}
          password: ${{ secrets.GHCR_TOKEN }}

      - name: Set up QEMU
        uses: docker/setup-qemu-action@v3

      - name: Set up Docker Buildx
        uses: docker/setup-buildx-action@v3

      - name: Build and push
        uses: docker/build-push-action@v6
        with:
          context: .
          push: true
          platforms: linux/amd64,linux/arm64
          tags: |
            ghcr.io/${{ env.GHCR_USERNAME }}/python-demonstrator:latest
            ghcr.io/${{ env.GHCR_USERNAME }}/python-demonstrator:${{ github.sha }}
"#;

/// What kind of remote presence satisfies the prerequisite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrereqKind {
    /// A specific file must exist.
    File,
    /// A directory must exist and contain at least one entry.
    NonEmptyDir,
}

/// A static prerequisite descriptor.
#[derive(Debug, Clone)]
pub struct Prereq {
    pub probe_path: &'static str,
    pub kind: PrereqKind,
    pub branch_prefix: &'static str,
    pub commit_message: &'static str,
    pub pr_title: &'static str,
    pub pr_body: &'static str,
    /// Relative path → content pairs materialized when missing.
    default_files: &'static [(&'static str, &'static str)],
}

impl Prereq {
    /// The two prerequisites, in the fixed order they are checked:
    /// renovate config first, workflow directory second.
    pub fn all() -> [Prereq; 2] {
        [Self::renovate(), Self::workflow()]
    }

    pub fn renovate() -> Prereq {
        Prereq {
            probe_path: "renovate.json",
            kind: PrereqKind::File,
            branch_prefix: "add-renovate",
            commit_message: "Add default renovate.json",
            pr_title: "Add default renovate.json",
            pr_body: "A minimal `renovate.json` file was added automatically so that \
                      the repository can be processed by the `python_demonstrator` workflow. \
                      Feel free to adapt it after the PR is merged.\n\n---\n*Created by `demobot`*",
            default_files: &[("renovate.json", DEFAULT_RENOVATE_JSON)],
        }
    }

    pub fn workflow() -> Prereq {
        Prereq {
            probe_path: ".github/workflows",
            kind: PrereqKind::NonEmptyDir,
            branch_prefix: "add-workflow",
            commit_message: "Add default GitHub Actions workflow",
            pr_title: "Add default GitHub Actions workflow",
            pr_body: "A basic workflow that builds a multi-arch Docker image and pushes it \
                      to GitHub Container Registry (`ghcr.io`) has been added automatically. \
                      You may edit or extend it after merging.\n\n---\n*Created by `demobot`*",
            default_files: &[(".github/workflows/docker.yml", DEFAULT_WORKFLOW_YAML)],
        }
    }

    /// The default content materialized when the prerequisite is missing.
    pub fn default_files(&self) -> FileSet {
        self.default_files
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

/// Outcome of one prerequisite bootstrap.
#[derive(Debug)]
pub enum Outcome {
    /// The prerequisite already existed; nothing was done.
    AlreadyPresent,
    /// A default was created and proposed via this pull request.
    Created(PullRequest),
}

impl Outcome {
    pub fn took_action(&self) -> bool {
        matches!(self, Outcome::Created(_))
    }
}

/// Decide whether a probe result satisfies the prerequisite kind.
fn is_present(kind: PrereqKind, probe: &Probe) -> bool {
    match (kind, probe) {
        (_, Probe::NotFound) => false,
        (PrereqKind::File, _) => true,
        (PrereqKind::NonEmptyDir, Probe::Dir { entries }) => *entries > 0,
        // A file where a directory was expected still exists remotely;
        // leave it alone rather than open a conflicting PR.
        (PrereqKind::NonEmptyDir, Probe::File) => true,
    }
}

/// Ensure one prerequisite exists, bootstrapping it if missing.
pub async fn ensure(
    github: &GithubClient,
    wc: &WorkingCopy,
    repo: &RepoHandle,
    prereq: &Prereq,
    token: &str,
) -> Result<Outcome, BootstrapError> {
    let probe = github
        .probe_contents(repo, prereq.probe_path)
        .await
        .map_err(|source| BootstrapError::RemoteQuery {
            path: prereq.probe_path.to_string(),
            source,
        })?;

    if is_present(prereq.kind, &probe) {
        return Ok(Outcome::AlreadyPresent);
    }

    tracing::info!(
        repo = %repo.full_name(),
        path = prereq.probe_path,
        "prerequisite missing, creating default"
    );

    let workdir = wc.workdir().map_err(BootstrapError::Git)?;
    let written = prereq.default_files().apply(&workdir)?;
    let relative: Vec<PathBuf> = written
        .iter()
        .map(|p| {
            p.strip_prefix(&workdir)
                .map(PathBuf::from)
                .map_err(|e| BootstrapError::Git(e.into()))
        })
        .collect::<Result<_, _>>()?;

    let branch = work_branch_name(prereq.branch_prefix);
    wc.checkout_new_branch(&branch).map_err(BootstrapError::Git)?;
    wc.stage_paths(&relative).map_err(BootstrapError::Git)?;
    wc.commit(prereq.commit_message).map_err(BootstrapError::Git)?;
    wc.push_branch(&branch, token).map_err(BootstrapError::Git)?;

    let pr = github
        .create_pull_request(repo, prereq.pr_title, prereq.pr_body, &branch, BASE_BRANCH)
        .await
        .map_err(BootstrapError::PullRequest)?;

    tracing::info!(repo = %repo.full_name(), pr = %pr.html_url, "bootstrap PR opened");

    wc.checkout_branch(BASE_BRANCH).map_err(BootstrapError::Git)?;
    Ok(Outcome::Created(pr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prereq_order_is_renovate_then_workflow() {
        let [first, second] = Prereq::all();
        assert_eq!(first.probe_path, "renovate.json");
        assert_eq!(second.probe_path, ".github/workflows");
    }

    #[test]
    fn test_renovate_default_is_valid_json() {
        let prereq = Prereq::renovate();
        let files = prereq.default_files();
        let content = files.0.get("renovate.json").unwrap();
        let value: serde_json::Value = serde_json::from_str(content).unwrap();
        assert_eq!(value["automerge"], serde_json::json!(false));
        assert!(value["extends"].is_array());
    }

    #[test]
    fn test_workflow_default_lands_under_workflows_dir() {
        let prereq = Prereq::workflow();
        let files = prereq.default_files();
        assert_eq!(files.len(), 1);
        let content = files.0.get(".github/workflows/docker.yml").unwrap();
        assert!(content.starts_with("name: Build & Push Docker Image"));
    }

    #[test]
    fn test_is_present_file_kind() {
        assert!(!is_present(PrereqKind::File, &Probe::NotFound));
        assert!(is_present(PrereqKind::File, &Probe::File));
        assert!(is_present(PrereqKind::File, &Probe::Dir { entries: 0 }));
    }

    #[test]
    fn test_is_present_dir_kind_requires_entries() {
        assert!(!is_present(PrereqKind::NonEmptyDir, &Probe::NotFound));
        assert!(!is_present(PrereqKind::NonEmptyDir, &Probe::Dir { entries: 0 }));
        assert!(is_present(PrereqKind::NonEmptyDir, &Probe::Dir { entries: 3 }));
        assert!(is_present(PrereqKind::NonEmptyDir, &Probe::File));
    }

    #[test]
    fn test_outcome_took_action() {
        assert!(!Outcome::AlreadyPresent.took_action());
        let pr = PullRequest {
            number: 1,
            title: "t".into(),
            html_url: "u".into(),
        };
        assert!(Outcome::Created(pr).took_action());
    }

    #[test]
    fn test_branch_prefixes() {
        assert_eq!(Prereq::renovate().branch_prefix, "add-renovate");
        assert_eq!(Prereq::workflow().branch_prefix, "add-workflow");
    }
}
