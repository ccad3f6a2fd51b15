//! Configuration for the worktree orchestration layer.
//!
//! Loading (files, CLI flags, env) belongs to the calling application; this
//! crate only defines the settings shape and its defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeSettings {
    /// Path to the repository the orchestrator operates on.
    pub repo_root: PathBuf,

    /// Directory under the repo root that holds all managed worktrees.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Namespace prefix for every branch this crate creates.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,

    /// Per-invocation git timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Length cap for the sanitized label slug in worktree directory names.
    #[serde(default = "default_slug_len")]
    pub max_slug_len: usize,
}

fn default_base_dir() -> String {
    ".swarmtree".to_string()
}

fn default_branch_prefix() -> String {
    "swarm".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_slug_len() -> usize {
    32
}

impl Default for WorktreeSettings {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            base_dir: default_base_dir(),
            branch_prefix: default_branch_prefix(),
            command_timeout_secs: default_timeout_secs(),
            max_slug_len: default_slug_len(),
        }
    }
}

impl WorktreeSettings {
    /// Settings for a specific repository with everything else defaulted.
    pub fn with_repo(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            ..Self::default()
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let settings = WorktreeSettings::default();
        assert_eq!(settings.base_dir, ".swarmtree");
        assert_eq!(settings.branch_prefix, "swarm");
        assert_eq!(settings.command_timeout(), Duration::from_secs(60));
        assert!(settings.max_slug_len > 0);
    }

    #[test]
    fn with_repo_overrides_only_the_root() {
        let settings = WorktreeSettings::with_repo("/srv/repo");
        assert_eq!(settings.repo_root, PathBuf::from("/srv/repo"));
        assert_eq!(settings.branch_prefix, "swarm");
    }
}
