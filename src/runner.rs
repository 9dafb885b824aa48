//! Run orchestration: the per-issue demo pipeline, the per-repository
//! reconciler, and the run driver.
//!
//! Error isolation follows the smallest unit that preserves forward
//! progress: a failed issue does not abort its repository, a failed
//! repository does not abort the run. Nothing is retried within a run;
//! the next scheduled invocation picks up whatever was skipped.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::{error, info, warn};

use crate::bootstrap::{self, Prereq};
use crate::config::{Config, RepoHandle, IN_PROGRESS_LABEL};
use crate::errors::PipelineError;
use crate::generator::{build_prompt, CodeGenerator};
use crate::git::{work_branch_name, WorkingCopy, BASE_BRANCH};
use crate::github::{authenticated_clone_url, GithubClient, Issue, PullRequest};

const LOCK_FILE: &str = ".demobot.lock";

/// Filter out issues already marked in progress.
///
/// Pure, order-preserving filter over already-fetched label data; remote
/// listing order is kept, no sorting is applied.
pub fn eligible_issues(issues: Vec<Issue>, exclusion_label: &str) -> Vec<Issue> {
    issues
        .into_iter()
        .filter(|issue| !issue.has_label(exclusion_label))
        .collect()
}

/// Commit message (and PR title) for a demo branch.
fn demo_commit_message(issue: &Issue) -> String {
    format!("Add demo for issue #{}: {}", issue.number, issue.title)
}

fn demo_pr_body(issue: &Issue) -> String {
    format!(
        "Generated from issue #{} by an automated demonstrator.\n\n---\n*Created by `demobot`*",
        issue.number
    )
}

fn demo_comment_body(pr: &PullRequest) -> String {
    format!(
        "Demo added: [{}]({}) - labeled `{}`.",
        pr.title, pr.html_url, IN_PROGRESS_LABEL
    )
}

/// Process one eligible issue end to end: generate, materialize, branch,
/// commit, push, open a PR, then best-effort label and comment.
///
/// The PR is the commit point. Label or comment failures afterwards are
/// logged and never roll it back; the issue may legitimately remain
/// without the in-progress label even though a PR exists.
pub async fn process_issue(
    github: &GithubClient,
    generator: &CodeGenerator,
    wc: &WorkingCopy,
    repo: &RepoHandle,
    issue: &Issue,
    token: &str,
) -> Result<PullRequest, PipelineError> {
    info!(repo = %repo.full_name(), issue = issue.number, "generating code");

    let prompt = build_prompt(issue);
    let files = generator
        .generate(&prompt)
        .await
        .map_err(|source| PipelineError::Generation {
            issue: issue.number,
            source,
        })?;

    let workdir = wc.workdir().map_err(PipelineError::Git)?;
    let written = files.apply(&workdir)?;
    info!(
        repo = %repo.full_name(),
        issue = issue.number,
        files = written.len(),
        "generated files saved"
    );

    let branch = work_branch_name(&format!("demo-{}", issue.number));
    wc.checkout_new_branch(&branch).map_err(PipelineError::Git)?;

    // Stage the full working-tree diff, not just the files written above:
    // bootstrap artifacts or earlier leftovers belong on this branch too.
    wc.stage_all().map_err(PipelineError::Git)?;
    let message = demo_commit_message(issue);
    wc.commit(&message).map_err(PipelineError::Git)?;
    wc.push_branch(&branch, token).map_err(PipelineError::Git)?;

    let pr = github
        .create_pull_request(repo, &message, &demo_pr_body(issue), &branch, BASE_BRANCH)
        .await
        .map_err(PipelineError::PullRequest)?;
    info!(repo = %repo.full_name(), issue = issue.number, pr = %pr.html_url, "PR opened");

    // Best-effort notifications after the commit point.
    if let Err(e) = github.add_label(repo, issue.number, IN_PROGRESS_LABEL).await {
        warn!(
            issue = issue.number,
            error = %format!("{:#}", e),
            "could not add {} label", IN_PROGRESS_LABEL
        );
    }
    if let Err(e) = github
        .create_comment(repo, issue.number, &demo_comment_body(&pr))
        .await
    {
        warn!(issue = issue.number, error = %format!("{:#}", e), "could not comment on issue");
    }

    wc.checkout_branch(BASE_BRANCH).map_err(PipelineError::Git)?;
    Ok(pr)
}

/// Reconcile one repository: clone or refresh the working copy, bootstrap
/// missing prerequisites (short-circuiting the rest of the run for this
/// repository if any bootstrap PR was opened), then process each eligible
/// issue.
pub async fn reconcile_repo(
    cfg: &Config,
    github: &GithubClient,
    generator: &CodeGenerator,
    repo: &RepoHandle,
) -> Result<()> {
    info!(repo = %repo.full_name(), "scanning repository");

    let url = authenticated_clone_url(repo, &cfg.github_token);
    let wc = WorkingCopy::ensure(&url, &repo.workdir)
        .with_context(|| format!("Failed to prepare working copy for {}", repo.full_name()))?;
    wc.refresh_base(BASE_BRANCH)
        .with_context(|| format!("Failed to refresh {} for {}", BASE_BRANCH, repo.full_name()))?;

    for prereq in Prereq::all() {
        let outcome = bootstrap::ensure(github, &wc, repo, &prereq, &cfg.github_token).await?;
        if outcome.took_action() {
            info!(
                repo = %repo.full_name(),
                path = prereq.probe_path,
                "bootstrap performed, skipping issue processing this run"
            );
            return Ok(());
        }
    }

    let issues = github.list_open_issues(repo, &cfg.tracking_label).await?;
    let eligible = eligible_issues(issues, IN_PROGRESS_LABEL);
    if eligible.is_empty() {
        info!(
            repo = %repo.full_name(),
            label = %cfg.tracking_label,
            "no eligible open issues"
        );
        return Ok(());
    }

    for issue in &eligible {
        match process_issue(github, generator, &wc, repo, issue, &cfg.github_token).await {
            Ok(_) => {}
            Err(e) => {
                error!(
                    repo = %repo.full_name(),
                    issue = issue.number,
                    error = %format!("{:#}", anyhow::Error::from(e)),
                    "issue processing failed, continuing with next issue"
                );
                // A failed issue may have left the working copy on its
                // work branch; the next issue must fork off the base.
                if let Err(e) = wc.checkout_branch(BASE_BRANCH) {
                    error!(
                        repo = %repo.full_name(),
                        error = %format!("{:#}", e),
                        "could not restore base branch, aborting repository"
                    );
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Acquire the single-instance run lock under the clone root.
///
/// Concurrent runs against the same working copies would race on branches
/// and pushes; a second invocation fails fast instead.
pub fn acquire_run_lock(clone_root: &Path) -> Result<File> {
    std::fs::create_dir_all(clone_root)
        .with_context(|| format!("Failed to create {}", clone_root.display()))?;
    let lock_path = clone_root.join(LOCK_FILE);
    let file = File::create(&lock_path)
        .with_context(|| format!("Failed to create lock file {}", lock_path.display()))?;
    file.try_lock_exclusive().with_context(|| {
        format!(
            "Another demobot run holds the lock at {}",
            lock_path.display()
        )
    })?;
    Ok(file)
}

/// Run the reconciler over every configured repository, in order,
/// isolating per-repository failures.
pub async fn run(cfg: &Config) -> Result<()> {
    let _lock = acquire_run_lock(&cfg.clone_root)?;

    let github = GithubClient::new(&cfg.github_token)?;
    let generator = CodeGenerator::new(&cfg.openai_api_key, &cfg.openai_base_url, &cfg.model)?;

    for repo in &cfg.repos {
        if let Err(e) = reconcile_repo(cfg, &github, &generator, repo).await {
            error!(
                repo = %repo.full_name(),
                error = %format!("{:#}", e),
                "repository processing failed, continuing with next repository"
            );
        }
    }

    Ok(())
}
