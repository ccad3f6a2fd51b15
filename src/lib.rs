//! Isolated git worktrees for parallel multi-agent workflows.
//!
//! A workflow groups related tasks under one git branch and one worktree
//! root; each task gets its own branch and checkout so concurrent agents
//! never edit the same files. The [`WorkflowOrchestrator`] drives the whole
//! lifecycle: initialize, hand out task worktrees, merge task branches back
//! (sequential, rebase, or parallel), finalize onto a base branch, and tear
//! everything down.
//!
//! ```no_run
//! use swarmtree::{MergeStrategy, Task, WorkflowOrchestrator, WorktreeSettings};
//!
//! # async fn run() -> swarmtree::Result<()> {
//! let orchestrator =
//!     WorkflowOrchestrator::new(WorktreeSettings::with_repo("/path/to/repo")).await?;
//! orchestrator.initialize_workflow("wf-1", None).await?;
//! let wt = orchestrator
//!     .create_task_worktree("wf-1", &Task::new("t1", "Fix login"))
//!     .await?;
//! // ... an agent works inside wt.path ...
//! orchestrator
//!     .merge_task_to_workflow("wf-1", "t1", MergeStrategy::Sequential)
//!     .await?;
//! orchestrator.finalize_workflow("wf-1", true).await?;
//! orchestrator.cleanup_workflow("wf-1", true).await?;
//! # Ok(())
//! # }
//! ```
//!
//! All git access goes through [`GitGateway`], which binds to one validated
//! repository, sanitizes every ref that reaches argv, and enforces a
//! deadline per subprocess. [`WorktreeStore`] confines worktree CRUD to the
//! managed base directory.

pub mod error;
pub mod git;
pub mod settings;
pub mod workflow;

pub use error::{GitError, Result};
pub use git::{GitGateway, MergeOptions, WorktreeEntry, WorktreeStore};
pub use settings::WorktreeSettings;
pub use workflow::{
    MergeStrategy, Task, TaskStatus, TaskWorktree, WorkflowHandle, WorkflowOrchestrator,
    WorkflowStatus,
};
