//! Workflow layer: naming, descriptor types, and the orchestrator.

pub mod naming;
mod orchestrator;
mod types;

pub use orchestrator::WorkflowOrchestrator;
pub use types::{MergeStrategy, Task, TaskStatus, TaskWorktree, WorkflowHandle, WorkflowStatus};
