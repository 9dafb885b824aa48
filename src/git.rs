//! Git plumbing over a local working copy.
//!
//! Wraps git2 with the handful of operations the reconciler sequences:
//! authenticated clone, base-branch refresh, work-branch creation, staging
//! (exact paths or the full tree), commit, and push. Each operation is
//! treated as atomic by the callers; this module does not retry.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use git2::{Repository, Signature};

/// The base branch every work branch forks from and every pull request
/// targets.
pub const BASE_BRANCH: &str = "main";

const COMMIT_NAME: &str = "demobot";
const COMMIT_EMAIL: &str = "demobot@localhost";

/// Generate a unique work-branch name: `<prefix>-<hex6>`.
pub fn work_branch_name(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &suffix[..6])
}

pub struct WorkingCopy {
    repo: Repository,
}

impl WorkingCopy {
    /// Open an existing working copy.
    pub fn open(dir: &Path) -> Result<Self> {
        let repo = Repository::open(dir)
            .with_context(|| format!("Failed to open git repository at {}", dir.display()))?;
        Ok(Self { repo })
    }

    /// Clone `url` into `dest`, creating parent directories as needed.
    /// Credentials are expected to be embedded in the URL.
    pub fn clone_from(url: &str, dest: &Path) -> Result<Self> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let repo = Repository::clone(url, dest)
            .with_context(|| format!("Failed to clone into {}", dest.display()))?;
        Ok(Self { repo })
    }

    /// Open the working copy at `dest`, cloning it first if absent.
    pub fn ensure(url: &str, dest: &Path) -> Result<Self> {
        if dest.join(".git").exists() {
            Self::open(dest)
        } else {
            Self::clone_from(url, dest)
        }
    }

    pub fn workdir(&self) -> Result<PathBuf> {
        self.repo
            .workdir()
            .map(Path::to_path_buf)
            .context("Repository has no working directory")
    }

    /// Fetch `branch` from origin and hard-reset the local branch to the
    /// fetched tip. Run before any branching so reused clones never fork
    /// work branches off a stale base.
    pub fn refresh_base(&self, branch: &str) -> Result<()> {
        let mut remote = self
            .repo
            .find_remote("origin")
            .context("No 'origin' remote configured")?;
        remote
            .fetch(&[branch], None, None)
            .with_context(|| format!("Failed to fetch origin/{}", branch))?;

        let fetched = self
            .repo
            .find_reference(&format!("refs/remotes/origin/{}", branch))
            .with_context(|| format!("origin/{} not found after fetch", branch))?;
        let target = fetched
            .peel_to_commit()
            .context("Failed to resolve fetched branch tip")?;

        // Retarget the local branch ref directly; branch() refuses to
        // force-update the currently checked-out branch.
        let refname = format!("refs/heads/{}", branch);
        match self.repo.find_reference(&refname) {
            Ok(mut local) => {
                local
                    .set_target(target.id(), "demobot: refresh base")
                    .with_context(|| format!("Failed to update local branch {}", branch))?;
            }
            Err(_) => {
                self.repo
                    .branch(branch, &target, false)
                    .with_context(|| format!("Failed to create local branch {}", branch))?;
            }
        }
        self.checkout_branch(branch)?;
        self.repo
            .reset(target.as_object(), git2::ResetType::Hard, None)
            .with_context(|| format!("Failed to reset {} to origin/{}", branch, branch))?;
        Ok(())
    }

    /// Create `name` off the current HEAD and check it out.
    pub fn checkout_new_branch(&self, name: &str) -> Result<()> {
        let head = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .context("Failed to resolve HEAD commit")?;
        self.repo
            .branch(name, &head, false)
            .with_context(|| format!("Failed to create branch {}", name))?;
        self.checkout_branch(name)
    }

    /// Check out an existing local branch.
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        self.repo
            .set_head(&format!("refs/heads/{}", name))
            .with_context(|| format!("Failed to set HEAD to {}", name))?;
        let mut opts = git2::build::CheckoutBuilder::new();
        opts.force();
        self.repo
            .checkout_head(Some(&mut opts))
            .with_context(|| format!("Failed to check out {}", name))?;
        Ok(())
    }

    /// Name of the currently checked-out branch.
    pub fn current_branch(&self) -> Result<String> {
        let head = self.repo.head().context("Failed to read HEAD")?;
        head.shorthand()
            .map(String::from)
            .context("HEAD is not a named branch")
    }

    /// Stage exactly the given workdir-relative paths.
    pub fn stage_paths(&self, paths: &[PathBuf]) -> Result<()> {
        let mut index = self.repo.index().context("Failed to open index")?;
        for path in paths {
            index
                .add_path(path)
                .with_context(|| format!("Failed to stage {}", path.display()))?;
        }
        index.write().context("Failed to write index")?;
        Ok(())
    }

    /// Stage the full working-tree diff: every file under the root,
    /// tracked or not. This is the explicit step that combines bootstrap
    /// artifacts with generated files on the same work branch.
    pub fn stage_all(&self) -> Result<()> {
        let mut index = self.repo.index().context("Failed to open index")?;
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .context("Failed to stage working tree")?;
        index.write().context("Failed to write index")?;
        Ok(())
    }

    /// Commit the index with `message`. Returns the commit SHA.
    pub fn commit(&self, message: &str) -> Result<String> {
        let mut index = self.repo.index().context("Failed to open index")?;
        let tree_id = index.write_tree().context("Failed to write tree")?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = Signature::now(COMMIT_NAME, COMMIT_EMAIL)?;

        // Handle unborn branch (fresh repo with no commits yet)
        let commit_id = if let Some(parent) = self.head_commit() {
            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?
        } else {
            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?
        };
        Ok(commit_id.to_string())
    }

    fn head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }

    /// Push `branch` to origin under the same name.
    pub fn push_branch(&self, branch: &str, token: &str) -> Result<()> {
        let mut remote = self
            .repo
            .find_remote("origin")
            .context("No 'origin' remote configured")?;

        let mut callbacks = git2::RemoteCallbacks::new();
        let token = token.to_string();
        callbacks.credentials(move |_url, _username, _allowed| {
            git2::Cred::userpass_plaintext("x-access-token", &token)
        });
        let mut opts = git2::PushOptions::new();
        opts.remote_callbacks(callbacks);

        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
        remote
            .push(&[&refspec], Some(&mut opts))
            .with_context(|| format!("Failed to push branch {}", branch))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) -> Repository {
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir, &opts).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);
        repo
    }

    fn init_bare_origin(dir: &Path) -> Repository {
        let mut opts = git2::RepositoryInitOptions::new();
        opts.bare(true);
        opts.initial_head("main");
        Repository::init_opts(dir, &opts).unwrap()
    }

    fn seed_commit(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
        let wc = WorkingCopy::open(dir).unwrap();
        wc.stage_all().unwrap();
        wc.commit(&format!("add {}", name)).unwrap();
    }

    #[test]
    fn test_work_branch_name_shape() {
        let name = work_branch_name("demo-17");
        assert!(name.starts_with("demo-17-"));
        let suffix = name.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        // Suffixes are random, two calls should differ
        assert_ne!(name, work_branch_name("demo-17"));
    }

    #[test]
    fn test_commit_on_unborn_branch() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let wc = WorkingCopy::open(dir.path()).unwrap();
        wc.stage_all().unwrap();
        let sha = wc.commit("init").unwrap();
        assert_eq!(sha.len(), 40);
        assert_eq!(wc.current_branch().unwrap(), "main");
    }

    #[test]
    fn test_checkout_new_branch_and_back() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        seed_commit(dir.path(), "a.txt", "one");

        let wc = WorkingCopy::open(dir.path()).unwrap();
        wc.checkout_new_branch("demo-1-abc123").unwrap();
        assert_eq!(wc.current_branch().unwrap(), "demo-1-abc123");

        wc.checkout_branch("main").unwrap();
        assert_eq!(wc.current_branch().unwrap(), "main");
    }

    #[test]
    fn test_stage_paths_stages_only_named_files() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        seed_commit(dir.path(), "base.txt", "base");

        fs::write(dir.path().join("staged.txt"), "yes").unwrap();
        fs::write(dir.path().join("unstaged.txt"), "no").unwrap();

        let wc = WorkingCopy::open(dir.path()).unwrap();
        wc.stage_paths(&[PathBuf::from("staged.txt")]).unwrap();
        wc.commit("add staged").unwrap();

        let repo = Repository::open(dir.path()).unwrap();
        let tree = repo.head().unwrap().peel_to_tree().unwrap();
        assert!(tree.get_name("staged.txt").is_some());
        assert!(tree.get_name("unstaged.txt").is_none());
    }

    #[test]
    fn test_stage_all_includes_untracked_files() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        seed_commit(dir.path(), "base.txt", "base");

        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/new.py"), "pass").unwrap();

        let wc = WorkingCopy::open(dir.path()).unwrap();
        wc.stage_all().unwrap();
        wc.commit("snapshot").unwrap();

        let repo = Repository::open(dir.path()).unwrap();
        let tree = repo.head().unwrap().peel_to_tree().unwrap();
        let sub = tree.get_name("sub").unwrap();
        let sub_tree = repo.find_tree(sub.id()).unwrap();
        assert!(sub_tree.get_name("new.py").is_some());
    }

    #[test]
    fn test_clone_and_push_work_branch_to_local_remote() {
        // libgit2 only pushes to bare local remotes, so seed a bare origin
        // through a side working copy first.
        let origin_dir = tempdir().unwrap();
        init_bare_origin(origin_dir.path());

        let seed_dir = tempdir().unwrap();
        let seed_repo = init_repo(seed_dir.path());
        seed_commit(seed_dir.path(), "README.md", "# seed");
        seed_repo
            .remote("origin", origin_dir.path().to_str().unwrap())
            .unwrap();
        WorkingCopy::open(seed_dir.path())
            .unwrap()
            .push_branch("main", "unused-token")
            .unwrap();

        // Fresh clone sees the seeded commit
        let clone_dir = tempdir().unwrap();
        let wc = WorkingCopy::ensure(origin_dir.path().to_str().unwrap(), clone_dir.path())
            .unwrap();
        assert!(clone_dir.path().join("README.md").exists());

        wc.checkout_new_branch("demo-5-fff000").unwrap();
        fs::write(clone_dir.path().join("demo.py"), "print(5)").unwrap();
        wc.stage_all().unwrap();
        wc.commit("Add demo for issue #5: test").unwrap();
        wc.push_branch("demo-5-fff000", "unused-token").unwrap();

        let origin = Repository::open(origin_dir.path()).unwrap();
        assert!(origin.find_reference("refs/heads/demo-5-fff000").is_ok());
    }

    #[test]
    fn test_refresh_base_picks_up_remote_commits() {
        let src_dir = tempdir().unwrap();
        init_repo(src_dir.path());
        seed_commit(src_dir.path(), "a.txt", "one");

        let clone_dir = tempdir().unwrap();
        let wc = WorkingCopy::clone_from(src_dir.path().to_str().unwrap(), clone_dir.path())
            .unwrap();
        assert!(!clone_dir.path().join("b.txt").exists());

        // New commit lands upstream after the clone
        seed_commit(src_dir.path(), "b.txt", "two");

        wc.refresh_base("main").unwrap();
        assert!(clone_dir.path().join("b.txt").exists());
        assert_eq!(wc.current_branch().unwrap(), "main");
    }

    #[test]
    fn test_ensure_reuses_existing_clone() {
        let src_dir = tempdir().unwrap();
        init_repo(src_dir.path());
        seed_commit(src_dir.path(), "a.txt", "one");

        let clone_dir = tempdir().unwrap();
        WorkingCopy::clone_from(src_dir.path().to_str().unwrap(), clone_dir.path()).unwrap();

        // Local-only marker survives a second ensure: no re-clone happened
        fs::write(clone_dir.path().join("marker.txt"), "local").unwrap();
        WorkingCopy::ensure("file:///nonexistent", clone_dir.path()).unwrap();
        assert!(clone_dir.path().join("marker.txt").exists());
    }
}
