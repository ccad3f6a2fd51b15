//! Workflow orchestration over the git gateway and worktree store.
//!
//! One workflow owns a branch (`<prefix>/<workflow_id>`) and a worktree
//! root; each task gets a sub-branch and a checkout beneath that root, so
//! parallel agents edit the same repository without touching each other's
//! files. Merging back happens inside throwaway worktrees so the operator's
//! primary checkout is never disturbed.
//!
//! Git is unsafe for concurrent ref mutation even across unrelated
//! branches, so every operation serializes on one instance-wide mutex.
//! Public methods acquire it and delegate to `*_locked` helpers that assume
//! it is held; the helpers never lock, which removes re-entrancy hazards.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{GitError, Result};
use crate::git::{GitGateway, MergeOptions, WorktreeStore};
use crate::settings::WorktreeSettings;
use crate::workflow::naming;
use crate::workflow::types::{
    MergeStrategy, Task, TaskStatus, TaskWorktree, WorkflowHandle, WorkflowStatus,
};

/// Directory names for throwaway merge/finalize worktrees under a workflow
/// root. Prefixed with `_` so task-directory scans skip them.
const MERGE_DIR: &str = "_merge";
const FINALIZE_DIR: &str = "_finalize";

/// Coordinates workflow and task branch/worktree lifecycle.
#[derive(Debug)]
pub struct WorkflowOrchestrator {
    gateway: Arc<GitGateway>,
    store: WorktreeStore,
    settings: WorktreeSettings,
    /// Serializes all operations; see module docs.
    op_lock: Mutex<()>,
}

/// Throwaway checkout private to one in-flight operation. Removed via
/// [`WorkflowOrchestrator::discard_ephemeral`] on every exit path before
/// the operation releases the lock.
struct EphemeralWorktree {
    path: PathBuf,
}

impl WorkflowOrchestrator {
    pub async fn new(settings: WorktreeSettings) -> Result<Self> {
        let gateway =
            Arc::new(GitGateway::new(&settings.repo_root, settings.command_timeout()).await?);
        let store = WorktreeStore::new(Arc::clone(&gateway), settings.base_dir.as_str());
        Ok(Self {
            gateway,
            store,
            settings,
            op_lock: Mutex::new(()),
        })
    }

    pub fn gateway(&self) -> &GitGateway {
        &self.gateway
    }

    pub fn store(&self) -> &WorktreeStore {
        &self.store
    }

    /// Branch a workflow lives on. Pure derivation.
    pub fn workflow_branch(&self, workflow_id: &str) -> String {
        naming::workflow_branch(&self.settings.branch_prefix, workflow_id)
    }

    /// Branch a task lives on; always prefixed by the workflow branch.
    pub fn task_branch(&self, workflow_id: &str, task_id: &str) -> String {
        naming::task_branch(&self.settings.branch_prefix, workflow_id, task_id)
    }

    fn workflow_root(&self, workflow_id: &str) -> PathBuf {
        self.store.base_dir().join(workflow_id)
    }

    // ─── Workflow lifecycle ──────────────────────────────────────────────

    /// Create (or reuse) a workflow branch and its worktree root.
    ///
    /// With no base branch given, resolution order is: the remote-tracked
    /// default, local `main`, local `master`, then the literal `"main"`.
    /// The branch is created without a checkout so the primary working
    /// directory's current branch is never disturbed. Idempotent: calling
    /// again for an existing workflow reuses it.
    #[instrument(skip(self))]
    pub async fn initialize_workflow(
        &self,
        workflow_id: &str,
        base_branch: Option<&str>,
    ) -> Result<WorkflowHandle> {
        let _guard = self.op_lock.lock().await;
        self.initialize_workflow_locked(workflow_id, base_branch).await
    }

    async fn initialize_workflow_locked(
        &self,
        workflow_id: &str,
        base_branch: Option<&str>,
    ) -> Result<WorkflowHandle> {
        naming::validate_identifier("workflow id", workflow_id)?;
        let base = self.resolve_base_branch(base_branch).await?;
        let branch = self.workflow_branch(workflow_id);
        if self.gateway.branch_exists(&branch).await? {
            debug!(%branch, "workflow branch already exists, reusing");
        } else {
            self.gateway.create_branch(&branch, &base).await?;
        }
        let root = self.workflow_root(workflow_id);
        tokio::fs::create_dir_all(&root).await?;
        info!(workflow = workflow_id, %branch, %base, "workflow initialized");
        self.workflow_handle_locked(workflow_id, &branch, &base, &root)
            .await
    }

    async fn resolve_base_branch(&self, requested: Option<&str>) -> Result<String> {
        if let Some(base) = requested {
            if !base.is_empty() {
                crate::git::validate_ref(base)?;
                return Ok(base.to_string());
            }
        }
        if let Ok(target) = self.gateway.symbolic_ref("refs/remotes/origin/HEAD").await {
            if let Some(branch) = target.strip_prefix("refs/remotes/origin/") {
                return Ok(branch.to_string());
            }
        }
        for candidate in ["main", "master"] {
            if self.gateway.branch_exists(candidate).await? {
                return Ok(candidate.to_string());
            }
        }
        Ok("main".to_string())
    }

    async fn workflow_handle_locked(
        &self,
        workflow_id: &str,
        branch: &str,
        base: &str,
        root: &Path,
    ) -> Result<WorkflowHandle> {
        let task_count = task_dirs(root).len();
        let pending_merges = self.unmerged_tasks_locked(branch).await?.len();
        Ok(WorkflowHandle {
            workflow_id: workflow_id.to_string(),
            workflow_branch: branch.to_string(),
            base_branch: base.to_string(),
            worktree_root: root.to_path_buf(),
            created_at: dir_created_at(root),
            task_count,
            pending_merges,
        })
    }

    // ─── Task lifecycle ──────────────────────────────────────────────────

    /// Create a task branch off the workflow branch and check it out under
    /// the workflow root. Get-or-create: if the worktree path already
    /// exists, the existing descriptor is returned.
    #[instrument(skip(self, task), fields(task = %task.id))]
    pub async fn create_task_worktree(
        &self,
        workflow_id: &str,
        task: &Task,
    ) -> Result<TaskWorktree> {
        let _guard = self.op_lock.lock().await;
        self.create_task_worktree_locked(workflow_id, task).await
    }

    async fn create_task_worktree_locked(
        &self,
        workflow_id: &str,
        task: &Task,
    ) -> Result<TaskWorktree> {
        naming::validate_identifier("workflow id", workflow_id)?;
        naming::validate_identifier("task id", &task.id)?;
        let wf_branch = self.workflow_branch(workflow_id);
        let branch = self.task_branch(workflow_id, &task.id);
        let dir_name = naming::task_dir_name(&task.id, &task.label, self.settings.max_slug_len);
        let path = self.workflow_root(workflow_id).join(&dir_name);

        if path.exists() {
            let status = self.task_status_locked(&path).await?;
            debug!(path = %path.display(), ?status, "task worktree already exists, reusing");
            return Ok(TaskWorktree {
                task_id: task.id.clone(),
                branch,
                path,
                status,
            });
        }
        if !self.gateway.branch_exists(&wf_branch).await? {
            return Err(GitError::NotFound(format!(
                "workflow branch {wf_branch} (initialize the workflow first)"
            )));
        }

        let created = self
            .store
            .create(
                &format!("{workflow_id}/{dir_name}"),
                &branch,
                Some(&wf_branch),
            )
            .await?;
        info!(task = %task.id, %branch, path = %created.display(), "task worktree created");
        Ok(TaskWorktree {
            task_id: task.id.clone(),
            branch,
            path: created,
            status: TaskStatus::Active,
        })
    }

    /// Stale when git no longer tracks the directory as a healthy worktree:
    /// either it carries a prune reason or it fell out of the worktree list
    /// entirely.
    async fn task_status_locked(&self, path: &Path) -> Result<TaskStatus> {
        let healthy = self
            .store
            .list()
            .await?
            .into_iter()
            .any(|entry| entry.path == *path && entry.prunable.is_none());
        Ok(if healthy {
            TaskStatus::Active
        } else {
            TaskStatus::Stale
        })
    }

    /// Remove a task's worktree, located by task-id prefix scan of the
    /// workflow root. Removal is best-effort; `remove_branch` additionally
    /// force-deletes the task branch. No-op when the root is absent.
    #[instrument(skip(self))]
    pub async fn remove_task_worktree(
        &self,
        workflow_id: &str,
        task_id: &str,
        remove_branch: bool,
    ) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.remove_task_worktree_locked(workflow_id, task_id, remove_branch)
            .await
    }

    async fn remove_task_worktree_locked(
        &self,
        workflow_id: &str,
        task_id: &str,
        remove_branch: bool,
    ) -> Result<()> {
        naming::validate_identifier("workflow id", workflow_id)?;
        naming::validate_identifier("task id", task_id)?;
        let root = self.workflow_root(workflow_id);
        if root.is_dir() {
            if let Some(path) = find_task_dir(&root, task_id) {
                self.remove_worktree_best_effort(&path).await;
            } else {
                debug!(task = task_id, "no worktree directory for task");
            }
        }
        if remove_branch {
            let branch = self.task_branch(workflow_id, task_id);
            if let Err(e) = self.gateway.delete_branch(&branch, true).await {
                warn!(%branch, error = %e, "failed to delete task branch");
            }
        }
        Ok(())
    }

    // ─── Merging ─────────────────────────────────────────────────────────

    /// Fold one task branch into its workflow branch.
    ///
    /// The merge runs inside a throwaway worktree checked out to the
    /// workflow branch, never in the primary checkout or the task's own
    /// worktree. On conflict the in-progress merge or cherry-pick is
    /// aborted before the error propagates, and the throwaway worktree is
    /// torn down on every exit path.
    #[instrument(skip(self))]
    pub async fn merge_task_to_workflow(
        &self,
        workflow_id: &str,
        task_id: &str,
        strategy: MergeStrategy,
    ) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.merge_task_locked(workflow_id, task_id, strategy).await
    }

    async fn merge_task_locked(
        &self,
        workflow_id: &str,
        task_id: &str,
        strategy: MergeStrategy,
    ) -> Result<()> {
        naming::validate_identifier("workflow id", workflow_id)?;
        naming::validate_identifier("task id", task_id)?;
        let wf_branch = self.workflow_branch(workflow_id);
        let task_branch = self.task_branch(workflow_id, task_id);
        if !self.gateway.branch_exists(&wf_branch).await? {
            return Err(GitError::NotFound(format!("workflow branch {wf_branch}")));
        }
        if !self.gateway.branch_exists(&task_branch).await? {
            return Err(GitError::NotFound(format!("task branch {task_branch}")));
        }

        let root = self.workflow_root(workflow_id);
        tokio::fs::create_dir_all(&root).await?;
        let ephemeral = self.ephemeral_worktree(&root, MERGE_DIR, &wf_branch).await?;
        let subject = format!("task {task_id}");
        let result = match strategy {
            MergeStrategy::Sequential | MergeStrategy::Parallel => {
                self.merge_branch_in(&ephemeral.path, &task_branch, &subject, &wf_branch)
                    .await
            }
            MergeStrategy::Rebase => {
                self.replay_commits_in(&ephemeral.path, &task_branch, task_id, &wf_branch)
                    .await
            }
        };
        self.discard_ephemeral(ephemeral).await;
        if result.is_ok() {
            info!(task = task_id, %strategy, branch = %wf_branch, "task merged into workflow");
        }
        result
    }

    /// No-fast-forward merge of `branch` into whatever `dir` has checked
    /// out, aborting in place on conflict.
    async fn merge_branch_in(
        &self,
        dir: &Path,
        branch: &str,
        subject: &str,
        target: &str,
    ) -> Result<()> {
        let options = MergeOptions {
            message: Some(format!("Merge {subject} into {target}")),
            no_ff: true,
            ..MergeOptions::default()
        };
        match self.gateway.merge_in(dir, branch, &options).await {
            Ok(()) => Ok(()),
            Err(GitError::Conflict(detail)) => {
                warn!(%branch, %target, "merge conflict, aborting");
                if let Err(e) = self.gateway.merge_abort_in(dir).await {
                    debug!(error = %e, "merge abort failed (possibly nothing in progress)");
                }
                Err(GitError::Conflict(format!("{subject}: {detail}")))
            }
            Err(e) => Err(e),
        }
    }

    /// Replay the task's commits onto the workflow branch one at a time,
    /// oldest first, keeping history linear.
    ///
    /// The replay is atomic: on any failure the workflow branch is reset to
    /// the tip it had before the first pick, so a retry starts from a clean
    /// slate. A pick that comes back empty (the change is already on the
    /// workflow branch) is skipped, not treated as a failure.
    async fn replay_commits_in(
        &self,
        dir: &Path,
        task_branch: &str,
        task_id: &str,
        wf_branch: &str,
    ) -> Result<()> {
        let commits = self.gateway.commits_between(wf_branch, task_branch).await?;
        let start = self.gateway.branch_tip(wf_branch).await?;
        debug!(task = task_id, count = commits.len(), "replaying task commits");
        for commit in &commits {
            let picked = match self.gateway.cherry_pick_in(dir, commit).await {
                Err(GitError::Execution { ref stderr, .. })
                    if crate::error::is_already_applied(stderr) =>
                {
                    debug!(task = task_id, %commit, "change already applied, skipping");
                    self.gateway.cherry_pick_skip_in(dir).await
                }
                other => other,
            };
            if let Err(e) = picked {
                warn!(task = task_id, %commit, error = %e, "replay failed, rolling back");
                if let Err(abort_err) = self.gateway.cherry_pick_abort_in(dir).await {
                    debug!(error = %abort_err, "cherry-pick abort failed");
                }
                // Abort only undoes the in-flight pick; earlier picks of
                // this replay are commits on the branch and need the reset.
                if let Err(reset_err) = self.gateway.reset_hard_in(dir, &start).await {
                    warn!(branch = %wf_branch, error = %reset_err, "failed to restore workflow branch tip");
                }
                return Err(match e {
                    GitError::Conflict(detail) => GitError::Conflict(format!(
                        "task {task_id} at commit {commit}: {detail}"
                    )),
                    other => other,
                });
            }
        }
        Ok(())
    }

    /// Merge several tasks under one lock hold. Failures are collected per
    /// task and reported together; tasks that merged stay merged.
    #[instrument(skip(self, task_ids))]
    pub async fn merge_all_tasks(
        &self,
        workflow_id: &str,
        task_ids: &[String],
        strategy: MergeStrategy,
    ) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        let mut failures = Vec::new();
        for task_id in task_ids {
            if let Err(e) = self.merge_task_locked(workflow_id, task_id, strategy).await {
                warn!(task = %task_id, error = %e, "task merge failed, continuing with remaining tasks");
                failures.push((task_id.clone(), e.to_string()));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(GitError::MergeBatch { failures })
        }
    }

    // ─── Finalize and cleanup ────────────────────────────────────────────

    /// Optionally merge the workflow branch into the resolved default base,
    /// then remove all task worktrees. Task and workflow branches are
    /// preserved so history survives finalization.
    #[instrument(skip(self))]
    pub async fn finalize_workflow(&self, workflow_id: &str, merge: bool) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.finalize_workflow_locked(workflow_id, merge, None).await
    }

    /// Finalize onto an explicit base branch instead of the resolved
    /// default.
    #[instrument(skip(self))]
    pub async fn finalize_workflow_onto(
        &self,
        workflow_id: &str,
        base_branch: &str,
    ) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.finalize_workflow_locked(workflow_id, true, Some(base_branch))
            .await
    }

    async fn finalize_workflow_locked(
        &self,
        workflow_id: &str,
        merge: bool,
        base_branch: Option<&str>,
    ) -> Result<()> {
        naming::validate_identifier("workflow id", workflow_id)?;
        let wf_branch = self.workflow_branch(workflow_id);
        let root = self.workflow_root(workflow_id);

        if merge {
            if !self.gateway.branch_exists(&wf_branch).await? {
                return Err(GitError::NotFound(format!("workflow branch {wf_branch}")));
            }
            let base = self.resolve_base_branch(base_branch).await?;
            tokio::fs::create_dir_all(&root).await?;
            // The base branch is usually checked out in the operator's
            // primary copy; the forced ephemeral checkout leaves that copy's
            // files alone while the merge advances the ref.
            let ephemeral = self.ephemeral_worktree(&root, FINALIZE_DIR, &base).await?;
            let subject = format!("workflow {workflow_id}");
            let result = self
                .merge_branch_in(&ephemeral.path, &wf_branch, &subject, &base)
                .await;
            self.discard_ephemeral(ephemeral).await;
            result?;
            info!(workflow = workflow_id, %base, "workflow merged into base");
        }

        if root.is_dir() {
            for dir in task_dirs(&root) {
                self.remove_worktree_best_effort(&dir).await;
            }
        }
        info!(workflow = workflow_id, merged = merge, "workflow finalized");
        Ok(())
    }

    /// Tear down a workflow's entire namespace: every worktree under its
    /// root, the root directory itself, and every branch sharing the
    /// workflow's namespace prefix. Each step is best-effort; failures are
    /// logged and the cleanup continues.
    #[instrument(skip(self))]
    pub async fn cleanup_workflow(
        &self,
        workflow_id: &str,
        remove_workflow_branch: bool,
    ) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.cleanup_workflow_locked(workflow_id, remove_workflow_branch)
            .await
    }

    async fn cleanup_workflow_locked(
        &self,
        workflow_id: &str,
        remove_workflow_branch: bool,
    ) -> Result<()> {
        naming::validate_identifier("workflow id", workflow_id)?;
        let root = self.workflow_root(workflow_id);
        if root.is_dir() {
            // Ephemeral residue included, hence sub_dirs over task_dirs.
            for dir in sub_dirs(&root) {
                self.remove_worktree_best_effort(&dir).await;
            }
            if let Err(e) = tokio::fs::remove_dir_all(&root).await {
                warn!(root = %root.display(), error = %e, "failed to delete workflow root");
            }
        }
        if let Err(e) = self.gateway.prune_worktrees().await {
            debug!(error = %e, "worktree prune failed");
        }

        let wf_branch = self.workflow_branch(workflow_id);
        let task_prefix = format!("{wf_branch}__");
        match self.gateway.branches_with_prefix(&task_prefix).await {
            Ok(branches) => {
                for branch in branches {
                    if let Err(e) = self.gateway.delete_branch(&branch, true).await {
                        warn!(%branch, error = %e, "failed to delete task branch");
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to enumerate task branches"),
        }
        if remove_workflow_branch {
            if let Err(e) = self.gateway.delete_branch(&wf_branch, true).await {
                warn!(branch = %wf_branch, error = %e, "failed to delete workflow branch");
            }
        }
        info!(workflow = workflow_id, "workflow cleaned up");
        Ok(())
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    /// Snapshot of the workflow branch: conflict presence, ahead/behind
    /// counts against the resolved default base, unmerged tasks, and the
    /// tip.
    #[instrument(skip(self))]
    pub async fn get_workflow_status(&self, workflow_id: &str) -> Result<WorkflowStatus> {
        let _guard = self.op_lock.lock().await;
        self.workflow_status_locked(workflow_id, None).await
    }

    /// Status against an explicit base branch, for workflows initialized
    /// from something other than the default (the orchestrator is stateless
    /// between calls and cannot remember the original base).
    #[instrument(skip(self))]
    pub async fn get_workflow_status_against(
        &self,
        workflow_id: &str,
        base_branch: &str,
    ) -> Result<WorkflowStatus> {
        let _guard = self.op_lock.lock().await;
        self.workflow_status_locked(workflow_id, Some(base_branch))
            .await
    }

    async fn workflow_status_locked(
        &self,
        workflow_id: &str,
        base_branch: Option<&str>,
    ) -> Result<WorkflowStatus> {
        naming::validate_identifier("workflow id", workflow_id)?;
        let wf_branch = self.workflow_branch(workflow_id);
        if !self.gateway.branch_exists(&wf_branch).await? {
            return Err(GitError::NotFound(format!("workflow branch {wf_branch}")));
        }
        let base = self.resolve_base_branch(base_branch).await?;
        let has_conflicts = self.gateway.has_unmerged_paths().await?;
        let (ahead_of_base, behind_base) = self.gateway.ahead_behind(&base, &wf_branch).await?;
        let unmerged_tasks = self.unmerged_tasks_locked(&wf_branch).await?;
        let head = self.gateway.short_head(&wf_branch).await?;
        Ok(WorkflowStatus {
            workflow_id: workflow_id.to_string(),
            workflow_branch: wf_branch,
            base_branch: base,
            head,
            has_conflicts,
            ahead_of_base,
            behind_base,
            unmerged_tasks,
        })
    }

    /// Workflows that have both a worktree-root directory and a live
    /// workflow branch, sorted by identifier.
    #[instrument(skip(self))]
    pub async fn list_active_workflows(&self) -> Result<Vec<WorkflowHandle>> {
        let _guard = self.op_lock.lock().await;
        let base_dir = self.store.base_dir().to_path_buf();
        let mut handles = Vec::new();
        if !base_dir.is_dir() {
            return Ok(handles);
        }
        let base = self.resolve_base_branch(None).await?;
        for dir in sub_dirs(&base_dir) {
            let Some(workflow_id) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if naming::validate_identifier("workflow id", workflow_id).is_err() {
                continue;
            }
            let branch = self.workflow_branch(workflow_id);
            if !self.gateway.branch_exists(&branch).await? {
                debug!(workflow = workflow_id, "directory without workflow branch, skipping");
                continue;
            }
            handles.push(
                self.workflow_handle_locked(workflow_id, &branch, &base, &dir)
                    .await?,
            );
        }
        handles.sort_by(|a, b| a.workflow_id.cmp(&b.workflow_id));
        Ok(handles)
    }

    /// Task identifiers whose branches are not yet merged into the
    /// workflow branch, via ancestry checks.
    async fn unmerged_tasks_locked(&self, workflow_branch: &str) -> Result<Vec<String>> {
        let prefix = format!("{workflow_branch}__");
        let mut unmerged = Vec::new();
        for branch in self.gateway.branches_with_prefix(&prefix).await? {
            if !self.gateway.is_ancestor(&branch, workflow_branch).await? {
                let task_id = branch.strip_prefix(&prefix).unwrap_or(&branch).to_string();
                unmerged.push(task_id);
            }
        }
        Ok(unmerged)
    }

    // ─── Ephemeral worktrees ─────────────────────────────────────────────

    /// Check `branch` out into a throwaway worktree under the workflow
    /// root. Residue from a killed operation is cleared first, so a retry
    /// after a crash starts clean.
    async fn ephemeral_worktree(
        &self,
        root: &Path,
        name: &str,
        branch: &str,
    ) -> Result<EphemeralWorktree> {
        let path = root.join(name);
        if path.exists() {
            debug!(path = %path.display(), "clearing leftover ephemeral worktree");
            self.remove_worktree_best_effort(&path).await;
        }
        self.store.create_at(&path, branch, false, None, true).await?;
        Ok(EphemeralWorktree { path })
    }

    async fn discard_ephemeral(&self, worktree: EphemeralWorktree) {
        self.remove_worktree_best_effort(&worktree.path).await;
    }

    /// Removal ladder: git remove, forced git remove, then plain directory
    /// delete, followed by a metadata prune. Never fails.
    async fn remove_worktree_best_effort(&self, path: &Path) {
        if let Err(e) = self.store.remove(path, false).await {
            debug!(path = %path.display(), error = %e, "worktree remove failed, forcing");
            if let Err(e) = self.store.remove(path, true).await {
                warn!(path = %path.display(), error = %e, "forced worktree remove failed, deleting directory");
                if let Err(e) = tokio::fs::remove_dir_all(path).await {
                    warn!(path = %path.display(), error = %e, "directory delete failed");
                }
            }
        }
        if let Err(e) = self.gateway.prune_worktrees().await {
            debug!(error = %e, "worktree prune failed");
        }
    }
}

/// All immediate subdirectories of `root`.
fn sub_dirs(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect()
}

/// Task worktree directories: subdirectories whose names do not start with
/// `_` (which marks ephemeral merge/finalize checkouts).
fn task_dirs(root: &Path) -> Vec<PathBuf> {
    sub_dirs(root)
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.starts_with('_'))
        })
        .collect()
}

/// Directory matching a task id, either exactly or as `<task_id>__<slug>`.
fn find_task_dir(root: &Path, task_id: &str) -> Option<PathBuf> {
    let marker = format!("{task_id}__");
    task_dirs(root).into_iter().find(|path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n == task_id || n.starts_with(&marker))
    })
}

fn dir_created_at(path: &Path) -> DateTime<Utc> {
    std::fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_task_dir_matches_id_prefix_only() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir(root.join("t1__fix-login")).unwrap();
        std::fs::create_dir(root.join("t10__other")).unwrap();
        std::fs::create_dir(root.join("_merge")).unwrap();

        let found = find_task_dir(root, "t1").unwrap();
        assert!(found.ends_with("t1__fix-login"));
        assert!(find_task_dir(root, "t2").is_none());
        // the ephemeral dir is never treated as a task
        assert!(find_task_dir(root, "_merge").is_none());
    }

    #[test]
    fn task_dirs_skip_ephemeral_directories() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir(root.join("t1__a")).unwrap();
        std::fs::create_dir(root.join("_merge")).unwrap();
        std::fs::create_dir(root.join("_finalize")).unwrap();
        assert_eq!(task_dirs(root).len(), 1);
        assert_eq!(sub_dirs(root).len(), 3);
    }
}
