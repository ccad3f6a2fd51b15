//! Worktree CRUD scoped to one managed base directory.
//!
//! Every mutating operation checks that its target lies lexically inside the
//! base directory before touching git or the filesystem.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{GitError, Result};
use crate::git::gateway::GitGateway;

/// Entry from `git worktree list --porcelain`.
#[derive(Debug, Clone)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub head: Option<String>,
    /// Short branch name, absent for detached or bare entries.
    pub branch: Option<String>,
    pub bare: bool,
    pub detached: bool,
    /// Lock reason; `Some("")` when locked without one.
    pub locked: Option<String>,
    /// Prune reason reported by git (e.g. gitdir pointing nowhere).
    pub prunable: Option<String>,
}

/// CRUD over worktrees confined to `<repo_root>/<base_dir>`.
#[derive(Debug)]
pub struct WorktreeStore {
    gateway: Arc<GitGateway>,
    base_dir: PathBuf,
}

impl WorktreeStore {
    /// `base_dir` may be relative; it is resolved against the gateway's
    /// (already canonicalized) repository root.
    pub fn new(gateway: Arc<GitGateway>, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let base_dir = if base_dir.is_absolute() {
            normalize(&base_dir)
        } else {
            normalize(&gateway.repo_root().join(base_dir))
        };
        Self { gateway, base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Lexical containment check; never touches the filesystem, so it holds
    /// for paths that do not exist yet.
    pub fn contains(&self, path: &Path) -> bool {
        let abs = if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.gateway.repo_root().join(path))
        };
        abs.starts_with(&self.base_dir) && abs != self.base_dir
    }

    /// Create a worktree at `<base_dir>/<name>` attached to `branch`.
    ///
    /// If the branch does not exist it is created from `base` (default
    /// `HEAD`) as part of the same `worktree add` invocation, so branch and
    /// checkout appear atomically. Fails if the target path already exists.
    #[instrument(skip(self))]
    pub async fn create(&self, name: &str, branch: &str, base: Option<&str>) -> Result<PathBuf> {
        let rel = Path::new(name);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(GitError::Validation(format!(
                "invalid worktree name {name:?}"
            )));
        }
        let path = self.base_dir.join(rel);
        if path.exists() {
            return Err(GitError::Validation(format!(
                "worktree path already exists: {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let create_branch = !self.gateway.branch_exists(branch).await?;
        self.gateway
            .add_worktree(&path, branch, create_branch, base, false)
            .await?;
        info!(path = %path.display(), %branch, created_branch = create_branch, "worktree created");
        Ok(path)
    }

    /// Containment-exempt primitive for ephemeral checkouts at an exact
    /// path. `force` tolerates a branch already checked out elsewhere.
    pub(crate) async fn create_at(
        &self,
        path: &Path,
        branch: &str,
        create_branch: bool,
        base: Option<&str>,
        force: bool,
    ) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.gateway
            .add_worktree(path, branch, create_branch, base, force)
            .await
    }

    /// Remove a worktree. Rejects any path outside the managed base
    /// directory whether or not it exists.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn remove(&self, path: &Path, force: bool) -> Result<()> {
        if !self.contains(path) {
            return Err(GitError::Validation(format!(
                "path {} is outside the managed worktree directory {}",
                path.display(),
                self.base_dir.display()
            )));
        }
        self.gateway.remove_worktree(path, force).await
    }

    /// All worktrees the repository knows about, main checkout included.
    pub async fn list(&self) -> Result<Vec<WorktreeEntry>> {
        let raw = self.gateway.list_worktrees_porcelain().await?;
        Ok(parse_worktree_list(&raw))
    }

    /// Worktrees under the managed base directory.
    pub async fn list_managed(&self) -> Result<Vec<WorktreeEntry>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|entry| self.contains(&entry.path))
            .collect())
    }

    pub async fn lock(&self, path: &Path, reason: Option<&str>) -> Result<()> {
        if !self.contains(path) {
            return Err(GitError::Validation(format!(
                "path {} is outside the managed worktree directory",
                path.display()
            )));
        }
        self.gateway.lock_worktree(path, reason).await
    }

    pub async fn unlock(&self, path: &Path) -> Result<()> {
        if !self.contains(path) {
            return Err(GitError::Validation(format!(
                "path {} is outside the managed worktree directory",
                path.display()
            )));
        }
        self.gateway.unlock_worktree(path).await
    }

    /// Prune stale worktree metadata; returns the paths git removed.
    pub async fn prune(&self) -> Result<Vec<String>> {
        let report = self.gateway.prune_worktrees().await?;
        Ok(parse_prune_report(&report))
    }

    /// Remove managed worktrees that git flags prunable or whose directory
    /// is older than `max_age`. Per-item failures are logged and skipped,
    /// never fatal. Returns the number of worktrees removed.
    #[instrument(skip(self))]
    pub async fn cleanup_stale(&self, max_age: Duration) -> Result<usize> {
        let mut removed = 0;
        for entry in self.list_managed().await? {
            let stale = entry.prunable.is_some() || dir_older_than(&entry.path, max_age);
            if !stale {
                continue;
            }
            match self.remove(&entry.path, true).await {
                Ok(()) => {
                    debug!(path = %entry.path.display(), "removed stale worktree");
                    removed += 1;
                }
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "skipping stale worktree that failed to remove");
                }
            }
        }
        // Prunable entries with a missing directory only clear via prune.
        if let Err(e) = self.gateway.prune_worktrees().await {
            warn!(error = %e, "worktree prune after stale cleanup failed");
        }
        Ok(removed)
    }
}

/// Collapse `.` and `..` components without consulting the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn dir_older_than(path: &Path, max_age: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age > max_age)
}

fn parse_worktree_list(raw: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in raw.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(WorktreeEntry {
                path: PathBuf::from(path),
                head: None,
                branch: None,
                bare: false,
                detached: false,
                locked: None,
                prunable: None,
            });
        } else if let Some(entry) = current.as_mut() {
            if let Some(head) = line.strip_prefix("HEAD ") {
                entry.head = Some(head.to_string());
            } else if let Some(branch) = line.strip_prefix("branch ") {
                entry.branch = Some(
                    branch
                        .strip_prefix("refs/heads/")
                        .unwrap_or(branch)
                        .to_string(),
                );
            } else if line == "bare" {
                entry.bare = true;
            } else if line == "detached" {
                entry.detached = true;
            } else if let Some(reason) = line.strip_prefix("locked ") {
                entry.locked = Some(reason.to_string());
            } else if line == "locked" {
                entry.locked = Some(String::new());
            } else if let Some(reason) = line.strip_prefix("prunable ") {
                entry.prunable = Some(reason.to_string());
            } else if line == "prunable" {
                entry.prunable = Some(String::new());
            }
        }
    }
    if let Some(entry) = current {
        entries.push(entry);
    }
    entries
}

/// Parse `git worktree prune -v` output ("Removing worktrees/<id>: reason").
fn parse_prune_report(report: &str) -> Vec<String> {
    report
        .lines()
        .filter_map(|line| line.strip_prefix("Removing "))
        .map(|rest| rest.split(':').next().unwrap_or(rest).trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_traversal() {
        assert_eq!(
            normalize(Path::new("/repo/.swarmtree/../../etc")),
            PathBuf::from("/etc")
        );
        assert_eq!(
            normalize(Path::new("/repo/./wt/a")),
            PathBuf::from("/repo/wt/a")
        );
    }

    #[test]
    fn parse_worktree_list_reads_all_fields() {
        let raw = "\
worktree /repo
HEAD 1111111111111111111111111111111111111111
branch refs/heads/main

worktree /repo/.swarmtree/wf-1/t1__login
HEAD 2222222222222222222222222222222222222222
branch refs/heads/swarm/wf-1__t1
locked agent in flight

worktree /repo/.swarmtree/wf-1/t2__stale
HEAD 3333333333333333333333333333333333333333
detached
prunable gitdir file points to non-existent location
";
        let entries = parse_worktree_list(raw);
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].branch.as_deref(), Some("main"));
        assert!(!entries[0].detached);

        assert_eq!(entries[1].branch.as_deref(), Some("swarm/wf-1__t1"));
        assert_eq!(entries[1].locked.as_deref(), Some("agent in flight"));
        assert!(entries[1].prunable.is_none());

        assert!(entries[2].detached);
        assert!(entries[2].branch.is_none());
        assert!(entries[2]
            .prunable
            .as_deref()
            .is_some_and(|r| r.contains("non-existent")));
    }

    #[test]
    fn parse_worktree_list_handles_bare_and_flag_only_lines() {
        let raw = "worktree /repo\nbare\n\nworktree /repo/wt\nHEAD abc\nlocked\nprunable\n";
        let entries = parse_worktree_list(raw);
        assert!(entries[0].bare);
        assert_eq!(entries[1].locked.as_deref(), Some(""));
        assert_eq!(entries[1].prunable.as_deref(), Some(""));
    }

    #[test]
    fn parse_prune_report_extracts_paths() {
        let report = "Removing worktrees/t1__login: gitdir file points to non-existent location\nRemoving worktrees/t2: worktree directory is missing\n";
        assert_eq!(
            parse_prune_report(report),
            vec!["worktrees/t1__login", "worktrees/t2"]
        );
        assert!(parse_prune_report("").is_empty());
    }
}
