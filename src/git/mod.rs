//! Git boundary: hardened subprocess gateway and worktree store.

mod gateway;
mod store;

pub use gateway::{GitGateway, MergeOptions};
pub use store::{WorktreeEntry, WorktreeStore};

pub(crate) use gateway::validate_ref;
