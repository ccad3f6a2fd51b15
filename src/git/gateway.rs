//! Hardened subprocess gateway to git.
//!
//! Uses the git CLI directly (rather than libgit2) for mutable operations
//! to ensure compatibility with worktrees, hooks, and sparse checkouts.
//! Every invocation runs against one bound repository root with a deadline,
//! and every user-influenced ref is validated before it reaches argv.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::{classify_git_failure, GitError, Result};

/// Low-level options for a direct merge invocation.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Commit message for the merge commit.
    pub message: Option<String>,
    /// Force a merge commit even when fast-forward is possible.
    pub no_ff: bool,
    /// Stage the merged result without committing it.
    pub squash: bool,
    /// Perform the merge but stop before creating the commit.
    pub no_commit: bool,
    /// Merge strategy (e.g. "ort", "recursive").
    pub strategy: Option<String>,
    /// Options forwarded to the chosen strategy (e.g. "theirs").
    pub strategy_options: Vec<String>,
}

impl MergeOptions {
    fn to_args(&self, branch: &str) -> Vec<String> {
        let mut args = vec!["merge".to_string()];
        if self.no_ff {
            args.push("--no-ff".to_string());
        }
        if self.squash {
            args.push("--squash".to_string());
        }
        if self.no_commit {
            args.push("--no-commit".to_string());
        }
        if let Some(strategy) = &self.strategy {
            args.push(format!("--strategy={strategy}"));
        }
        for opt in &self.strategy_options {
            args.push(format!("--strategy-option={opt}"));
        }
        if let Some(message) = &self.message {
            args.push("-m".to_string());
            args.push(message.clone());
        }
        args.push(branch.to_string());
        args
    }

    fn validate(&self) -> Result<()> {
        if let Some(strategy) = &self.strategy {
            validate_cli_value("merge strategy", strategy)?;
        }
        for opt in &self.strategy_options {
            validate_cli_value("strategy option", opt)?;
        }
        Ok(())
    }
}

/// Reject ref names git would mistreat or that could smuggle flags into
/// argv. This is an injection-prevention boundary: anything failing here
/// never reaches a subprocess.
pub(crate) fn validate_ref(name: &str) -> Result<()> {
    let fail = |why: &str| {
        Err(GitError::Validation(format!(
            "invalid ref name {name:?}: {why}"
        )))
    };
    if name.is_empty() {
        return fail("empty");
    }
    if name == "@" {
        return fail("bare @ is reserved");
    }
    if name.starts_with('-') {
        return fail("leading dash");
    }
    if name
        .chars()
        .any(|c| c == '\0' || c.is_whitespace() || c.is_control())
    {
        return fail("whitespace or control character");
    }
    if name.contains("..") {
        return fail("contains ..");
    }
    if name.contains("@{") {
        return fail("contains @{");
    }
    if name.contains("//") {
        return fail("contains //");
    }
    if name.ends_with('/') {
        return fail("trailing slash");
    }
    if name.ends_with(".lock") {
        return fail("reserved .lock suffix");
    }
    if name.ends_with('.') {
        return fail("trailing dot");
    }
    Ok(())
}

/// Lighter check for non-ref values that still land on argv.
fn validate_cli_value(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(GitError::Validation(format!("{what} must not be empty")));
    }
    if value.starts_with('-') {
        return Err(GitError::Validation(format!(
            "{what} {value:?} must not start with a dash"
        )));
    }
    if value.chars().any(|c| c == '\0' || c.is_control()) {
        return Err(GitError::Validation(format!(
            "{what} {value:?} contains control characters"
        )));
    }
    Ok(())
}

/// Locate the git executable, resolve symlinks, and verify it is a regular
/// executable file outside the repository (a git binary planted inside the
/// repo via PATH manipulation must never be executed).
fn resolve_git_binary(repo_root: &Path) -> Result<PathBuf> {
    let found = which::which("git")
        .map_err(|e| GitError::Validation(format!("git executable not found on PATH: {e}")))?;
    let resolved = found.canonicalize()?;
    let metadata = std::fs::metadata(&resolved)?;
    if !metadata.is_file() {
        return Err(GitError::Validation(format!(
            "{} is not a regular file",
            resolved.display()
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(GitError::Validation(format!(
                "{} is not executable",
                resolved.display()
            )));
        }
    }
    if resolved.starts_with(repo_root) {
        return Err(GitError::Validation(format!(
            "refusing git binary {} located inside the repository",
            resolved.display()
        )));
    }
    Ok(resolved)
}

/// Gateway bound to one repository root.
///
/// Holds no cache: every call re-invokes git and reflects live repository
/// state.
#[derive(Debug)]
pub struct GitGateway {
    repo_root: PathBuf,
    git_bin: PathBuf,
    timeout: Duration,
}

impl GitGateway {
    /// Bind to a repository, verifying both the git binary and that the
    /// path is a genuine (non-bare) repository.
    pub async fn new(repo_root: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let requested = repo_root.as_ref();
        let repo_root = requested.canonicalize().map_err(|e| {
            GitError::Validation(format!("repository path {}: {e}", requested.display()))
        })?;
        let git_bin = resolve_git_binary(&repo_root)?;
        let gateway = Self {
            repo_root,
            git_bin,
            timeout,
        };
        let probe = gateway.run(&["rev-parse", "--is-inside-work-tree"]).await?;
        if probe != "true" {
            return Err(GitError::Validation(format!(
                "{} is not a git working tree",
                gateway.repo_root.display()
            )));
        }
        Ok(gateway)
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Run a git subcommand at the repository root.
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let root = self.repo_root.clone();
        self.run_in(&root, args).await
    }

    /// Run a git subcommand in an arbitrary working directory (merge and
    /// cherry-pick must execute inside the ephemeral worktree they target).
    ///
    /// Applies the configured timeout; on expiry the child is killed and a
    /// `Timeout` error is returned. Non-zero exits come back classified with
    /// captured stderr.
    pub async fn run_in(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        debug!(?args, cwd = %cwd.display(), "running git");
        let child = Command::new(&self.git_bin)
            .args(args)
            .current_dir(cwd)
            // Pin the locale so error classification sees stable phrases.
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                // Dropping the wait future reaps the child via kill_on_drop.
                warn!(?args, timeout = ?self.timeout, "git command timed out, killing");
                return Err(GitError::Timeout {
                    command: args.join(" "),
                    timeout: self.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(classify_git_failure(
                args.first().unwrap_or(&""),
                &stdout,
                &stderr,
            ));
        }
        Ok(stdout.trim().to_string())
    }

    // ─── Refs and history ────────────────────────────────────────────────

    pub async fn current_branch_in(&self, dir: &Path) -> Result<String> {
        self.run_in(dir, &["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    pub async fn head_commit(&self) -> Result<String> {
        self.run(&["rev-parse", "HEAD"]).await
    }

    /// Abbreviated tip commit of a branch.
    pub async fn short_head(&self, branch: &str) -> Result<String> {
        validate_ref(branch)?;
        self.run(&["rev-parse", "--short", branch]).await
    }

    /// Full tip commit of a local branch.
    pub async fn branch_tip(&self, branch: &str) -> Result<String> {
        validate_ref(branch)?;
        let refspec = format!("refs/heads/{branch}");
        self.run(&["rev-parse", refspec.as_str()]).await
    }

    pub async fn symbolic_ref(&self, refname: &str) -> Result<String> {
        validate_cli_value("ref name", refname)?;
        self.run(&["symbolic-ref", refname]).await
    }

    pub async fn branch_exists(&self, branch: &str) -> Result<bool> {
        validate_ref(branch)?;
        let refspec = format!("refs/heads/{branch}");
        match self
            .run(&["rev-parse", "--verify", "--quiet", refspec.as_str()])
            .await
        {
            Ok(_) => Ok(true),
            Err(GitError::Execution { .. } | GitError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a branch without checking it out anywhere.
    #[instrument(skip(self))]
    pub async fn create_branch(&self, branch: &str, base: &str) -> Result<()> {
        validate_ref(branch)?;
        validate_ref(base)?;
        self.run(&["branch", branch, base]).await.map(drop)
    }

    #[instrument(skip(self))]
    pub async fn delete_branch(&self, branch: &str, force: bool) -> Result<()> {
        validate_ref(branch)?;
        let flag = if force { "-D" } else { "-d" };
        self.run(&["branch", flag, branch]).await.map(drop)
    }

    /// Local branches whose short name starts with `prefix`.
    pub async fn branches_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        validate_ref(prefix)?;
        let pattern = format!("refs/heads/{prefix}*");
        let out = self
            .run(&[
                "for-each-ref",
                "--format=%(refname:short)",
                pattern.as_str(),
            ])
            .await?;
        Ok(out
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Whether every commit of `ancestor` is reachable from `descendant`.
    pub async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        validate_ref(ancestor)?;
        validate_ref(descendant)?;
        match self
            .run(&["merge-base", "--is-ancestor", ancestor, descendant])
            .await
        {
            Ok(_) => Ok(true),
            // Exit status 1 with no output means "not an ancestor".
            Err(GitError::Execution { ref stderr, .. }) if stderr.is_empty() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Commits reachable from `tip` but not `base`, oldest first.
    pub async fn commits_between(&self, base: &str, tip: &str) -> Result<Vec<String>> {
        validate_ref(base)?;
        validate_ref(tip)?;
        let range = format!("{base}..{tip}");
        let out = self
            .run(&["rev-list", "--reverse", range.as_str()])
            .await?;
        Ok(out
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// (ahead, behind) of `branch` relative to `base`. Ahead counts
    /// first-parent commits so one no-ff task merge reads as one step.
    pub async fn ahead_behind(&self, base: &str, branch: &str) -> Result<(usize, usize)> {
        validate_ref(base)?;
        validate_ref(branch)?;
        let ahead_range = format!("{base}..{branch}");
        let behind_range = format!("{branch}..{base}");
        let ahead = self
            .run(&["rev-list", "--count", "--first-parent", ahead_range.as_str()])
            .await?;
        let behind = self
            .run(&["rev-list", "--count", behind_range.as_str()])
            .await?;
        Ok((parse_count(&ahead), parse_count(&behind)))
    }

    /// Whether the working tree at the repo root has unresolved merge paths.
    pub async fn has_unmerged_paths(&self) -> Result<bool> {
        let out = self.run(&["status", "--porcelain"]).await?;
        Ok(out.lines().any(|line| {
            matches!(
                line.get(..2),
                Some("DD" | "AU" | "UD" | "UA" | "DU" | "AA" | "UU")
            )
        }))
    }

    // ─── Merging ─────────────────────────────────────────────────────────

    /// Merge `branch` into the branch checked out at `dir`.
    #[instrument(skip(self, options), fields(dir = %dir.display()))]
    pub async fn merge_in(&self, dir: &Path, branch: &str, options: &MergeOptions) -> Result<()> {
        validate_ref(branch)?;
        options.validate()?;
        let args = options.to_args(branch);
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_in(dir, &argv).await.map(drop)
    }

    pub async fn merge_abort_in(&self, dir: &Path) -> Result<()> {
        self.run_in(dir, &["merge", "--abort"]).await.map(drop)
    }

    pub async fn cherry_pick_in(&self, dir: &Path, commit: &str) -> Result<()> {
        validate_ref(commit)?;
        self.run_in(dir, &["cherry-pick", commit]).await.map(drop)
    }

    pub async fn cherry_pick_abort_in(&self, dir: &Path) -> Result<()> {
        self.run_in(dir, &["cherry-pick", "--abort"]).await.map(drop)
    }

    /// Skip the current (empty) step of an in-progress cherry-pick.
    pub async fn cherry_pick_skip_in(&self, dir: &Path) -> Result<()> {
        self.run_in(dir, &["cherry-pick", "--skip"]).await.map(drop)
    }

    /// Hard-reset the checkout at `dir` to `commit`.
    pub async fn reset_hard_in(&self, dir: &Path, commit: &str) -> Result<()> {
        validate_ref(commit)?;
        self.run_in(dir, &["reset", "--hard", commit]).await.map(drop)
    }

    // ─── Worktree primitives ─────────────────────────────────────────────

    /// Add a worktree. Paths always follow an explicit end-of-flags `--` so
    /// a path starting with `-` can never be parsed as an option. `force`
    /// tolerates a branch that is already checked out elsewhere.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn add_worktree(
        &self,
        path: &Path,
        branch: &str,
        create_branch: bool,
        base: Option<&str>,
        force: bool,
    ) -> Result<()> {
        validate_ref(branch)?;
        if let Some(base) = base {
            validate_ref(base)?;
        }
        let path_str = path.to_string_lossy();
        let mut args: Vec<&str> = vec!["worktree", "add"];
        if force {
            args.push("--force");
        }
        if create_branch {
            args.push("-b");
            args.push(branch);
        }
        args.push("--");
        args.push(&path_str);
        if create_branch {
            args.push(base.unwrap_or("HEAD"));
        } else {
            args.push(branch);
        }
        self.run(&args).await.map(drop)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn remove_worktree(&self, path: &Path, force: bool) -> Result<()> {
        let path_str = path.to_string_lossy();
        let mut args: Vec<&str> = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push("--");
        args.push(&path_str);
        self.run(&args).await.map(drop)
    }

    pub async fn lock_worktree(&self, path: &Path, reason: Option<&str>) -> Result<()> {
        let path_str = path.to_string_lossy();
        let mut args: Vec<&str> = vec!["worktree", "lock"];
        if let Some(reason) = reason {
            args.push("--reason");
            args.push(reason);
        }
        args.push("--");
        args.push(&path_str);
        self.run(&args).await.map(drop)
    }

    pub async fn unlock_worktree(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run(&["worktree", "unlock", "--", &path_str])
            .await
            .map(drop)
    }

    /// Prune stale worktree metadata; returns git's verbose report.
    pub async fn prune_worktrees(&self) -> Result<String> {
        self.run(&["worktree", "prune", "-v"]).await
    }

    pub async fn list_worktrees_porcelain(&self) -> Result<String> {
        self.run(&["worktree", "list", "--porcelain"]).await
    }
}

fn parse_count(raw: &str) -> usize {
    raw.trim().parse().unwrap_or_else(|_| {
        warn!(%raw, "unparseable rev-list count");
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_ref_accepts_normal_branch_names() {
        for name in [
            "main",
            "feature/login",
            "swarm/wf-1",
            "swarm/wf-1__t1",
            "v1.2.3",
        ] {
            assert!(validate_ref(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn validate_ref_rejects_hostile_names() {
        for name in [
            "",
            "@",
            "-rf",
            "--force",
            "a b",
            "a\tb",
            "a\nb",
            "a\0b",
            "a..b",
            "a@{1}",
            "a//b",
            "trailing/",
            "trailing.",
            "branch.lock",
        ] {
            assert!(
                matches!(validate_ref(name), Err(GitError::Validation(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn merge_options_build_expected_args() {
        let options = MergeOptions {
            message: Some("Merge task t1".to_string()),
            no_ff: true,
            ..MergeOptions::default()
        };
        assert_eq!(
            options.to_args("swarm/wf-1__t1"),
            vec!["merge", "--no-ff", "-m", "Merge task t1", "swarm/wf-1__t1"]
        );
    }

    #[test]
    fn merge_options_include_strategy_flags() {
        let options = MergeOptions {
            squash: true,
            no_commit: true,
            strategy: Some("ort".to_string()),
            strategy_options: vec!["theirs".to_string()],
            ..MergeOptions::default()
        };
        let args = options.to_args("topic");
        assert!(args.contains(&"--squash".to_string()));
        assert!(args.contains(&"--no-commit".to_string()));
        assert!(args.contains(&"--strategy=ort".to_string()));
        assert!(args.contains(&"--strategy-option=theirs".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("topic"));
    }

    #[test]
    fn merge_options_reject_flag_smuggling_strategy() {
        let options = MergeOptions {
            strategy: Some("-evil".to_string()),
            ..MergeOptions::default()
        };
        assert!(matches!(options.validate(), Err(GitError::Validation(_))));
    }

    #[test]
    fn parse_count_defaults_to_zero_on_garbage() {
        assert_eq!(parse_count("42\n"), 42);
        assert_eq!(parse_count("not-a-number"), 0);
    }
}
