//! Descriptor types for workflows and their task worktrees.
//!
//! These carry serde derives so the calling layer's persisted-state
//! backends can store them as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::GitError;

/// Task descriptor supplied by the calling layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Opaque identifier, used in branch and directory names.
    pub id: String,
    /// Human-readable label, slugged into the worktree directory name.
    pub label: String,
}

impl Task {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// How a task branch is folded back into its workflow branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// No-fast-forward merge, one merge commit per task.
    Sequential,
    /// Replay the task's commits one at a time, keeping history linear.
    Rebase,
    /// Same mechanics as sequential; tasks are expected to be disjoint.
    Parallel,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sequential => "sequential",
            Self::Rebase => "rebase",
            Self::Parallel => "parallel",
        };
        f.write_str(name)
    }
}

impl FromStr for MergeStrategy {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "rebase" => Ok(Self::Rebase),
            "parallel" => Ok(Self::Parallel),
            other => Err(GitError::Validation(format!(
                "unknown merge strategy {other:?} (expected sequential, rebase, or parallel)"
            ))),
        }
    }
}

/// One workflow's isolated namespace: its branch and worktree root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowHandle {
    pub workflow_id: String,
    pub workflow_branch: String,
    pub base_branch: String,
    pub worktree_root: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Task worktree directories currently on disk.
    pub task_count: usize,
    /// Task branches not yet merged into the workflow branch.
    pub pending_merges: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Git tracks the directory as a healthy worktree.
    Active,
    /// The directory exists but git flags it prunable or no longer lists
    /// it; the checkout needs to be recreated before an agent uses it.
    Stale,
}

/// One task's branch and checkout beneath its workflow root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWorktree {
    pub task_id: String,
    pub branch: String,
    pub path: PathBuf,
    pub status: TaskStatus,
}

/// Snapshot of a workflow branch relative to its base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub workflow_id: String,
    pub workflow_branch: String,
    pub base_branch: String,
    /// Abbreviated tip commit of the workflow branch.
    pub head: String,
    /// Unresolved merge paths in the primary working tree.
    pub has_conflicts: bool,
    pub ahead_of_base: usize,
    pub behind_base: usize,
    /// Task identifiers whose branches are not yet merged.
    pub unmerged_tasks: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_strategy_round_trips_through_str() {
        for (text, strategy) in [
            ("sequential", MergeStrategy::Sequential),
            ("rebase", MergeStrategy::Rebase),
            ("parallel", MergeStrategy::Parallel),
        ] {
            assert_eq!(text.parse::<MergeStrategy>().unwrap(), strategy);
            assert_eq!(strategy.to_string(), text);
        }
        assert!("octopus".parse::<MergeStrategy>().is_err());
    }

    #[test]
    fn handle_serializes_for_state_backends() {
        let handle = WorkflowHandle {
            workflow_id: "wf-1".to_string(),
            workflow_branch: "swarm/wf-1".to_string(),
            base_branch: "main".to_string(),
            worktree_root: PathBuf::from("/repo/.swarmtree/wf-1"),
            created_at: Utc::now(),
            task_count: 2,
            pending_merges: 1,
        };
        let json = serde_json::to_string(&handle).unwrap();
        assert!(json.contains("swarm/wf-1"));
    }
}
