//! Error taxonomy for swarmtree operations.
//!
//! Every failure surfaces as a [`GitError`] variant so callers can react to
//! the class of failure (validation, timeout, conflict, missing ref, other
//! subprocess failure) without parsing message strings themselves.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GitError>;

/// Structured errors surfaced at the library boundary.
#[derive(Debug, Error)]
pub enum GitError {
    /// Malformed input caught before any subprocess ran; no side effects.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The subprocess exceeded its deadline and was killed.
    #[error("git {command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// A merge, rebase replay, or finalize produced unresolved conflicts.
    /// The in-progress operation has already been aborted.
    #[error("merge conflict: {0}")]
    Conflict(String),

    /// A branch, worktree, or workflow the operation needs is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-zero exit, carrying the captured stderr.
    #[error("git {command} failed: {stderr}")]
    Execution { command: String, stderr: String },

    /// The subprocess could not be spawned, or a filesystem step failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Aggregate result of a batch merge; successful tasks stay merged.
    #[error("{} task merge(s) failed: {}", .failures.len(), summarize(.failures))]
    MergeBatch { failures: Vec<(String, String)> },
}

fn summarize(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(task, err)| format!("{task}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Phrases git prints when an automatic merge, cherry-pick, or rebase stops
/// on conflicts. Checked against combined stdout and stderr because git
/// reports conflicts on stdout.
const CONFLICT_MARKERS: &[&str] = &[
    "CONFLICT",
    "Automatic merge failed",
    "could not apply",
    "after resolving the conflicts",
    "needs merge",
];

/// Phrases indicating a missing repository, ref, or worktree.
const NOT_FOUND_MARKERS: &[&str] = &[
    "not a git repository",
    "unknown revision",
    "does not exist",
    "no such ref",
    "not found",
    "invalid reference",
    "is not a working tree",
];

/// Phrases git prints when a cherry-pick stops because the resulting patch
/// is empty, i.e. the change is already present on the target branch.
const ALREADY_APPLIED_MARKERS: &[&str] = &["is now empty", "nothing to commit"];

/// Whether a failed cherry-pick reported an empty result rather than a real
/// failure. Resolved with `cherry-pick --skip`.
pub(crate) fn is_already_applied(detail: &str) -> bool {
    ALREADY_APPLIED_MARKERS.iter().any(|m| detail.contains(m))
}

/// Classify a failed git invocation into the taxonomy.
///
/// Git has no structured error protocol, so this substring table is the one
/// place in the crate that interprets its output. The gateway pins
/// `LC_ALL=C` on every invocation so localized builds cannot change the
/// phrases; differing git *versions* remain a portability risk.
pub(crate) fn classify_git_failure(command: &str, stdout: &str, stderr: &str) -> GitError {
    let combined = format!("{stdout}\n{stderr}");
    let detail = if stderr.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.trim().to_string()
    };

    if CONFLICT_MARKERS.iter().any(|m| combined.contains(m)) {
        GitError::Conflict(detail)
    } else if NOT_FOUND_MARKERS.iter().any(|m| combined.contains(m)) {
        GitError::NotFound(detail)
    } else {
        GitError::Execution {
            command: command.to_string(),
            stderr: detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_output_classifies_as_conflict() {
        let err = classify_git_failure(
            "merge",
            "CONFLICT (content): Merge conflict in src/lib.rs\nAutomatic merge failed; fix conflicts and then commit the result.",
            "",
        );
        assert!(matches!(err, GitError::Conflict(_)));
    }

    #[test]
    fn cherry_pick_failure_classifies_as_conflict() {
        let err = classify_git_failure(
            "cherry-pick",
            "",
            "error: could not apply deadbee... add feature\nhint: After resolving the conflicts, mark them with",
        );
        assert!(matches!(err, GitError::Conflict(_)));
    }

    #[test]
    fn missing_repository_classifies_as_not_found() {
        let err = classify_git_failure(
            "rev-parse",
            "",
            "fatal: not a git repository (or any of the parent directories): .git",
        );
        assert!(matches!(err, GitError::NotFound(_)));
    }

    #[test]
    fn missing_branch_classifies_as_not_found() {
        let err = classify_git_failure("branch", "", "error: branch 'nope' not found.");
        assert!(matches!(err, GitError::NotFound(_)));
    }

    #[test]
    fn other_failures_classify_as_execution_with_stderr() {
        let err = classify_git_failure("push", "", "fatal: unable to access remote");
        match err {
            GitError::Execution { command, stderr } => {
                assert_eq!(command, "push");
                assert!(stderr.contains("unable to access"));
            }
            other => panic!("expected Execution, got {other:?}"),
        }
    }

    #[test]
    fn empty_output_classifies_as_execution() {
        // merge-base --is-ancestor exits 1 with no output; the gateway maps
        // that Execution value back to a boolean.
        let err = classify_git_failure("merge-base", "", "");
        assert!(matches!(err, GitError::Execution { ref stderr, .. } if stderr.is_empty()));
    }

    #[test]
    fn empty_cherry_pick_reads_as_already_applied() {
        assert!(is_already_applied(
            "The previous cherry-pick is now empty, possibly due to conflict resolution."
        ));
        assert!(is_already_applied("nothing to commit, working tree clean"));
        assert!(!is_already_applied(
            "error: could not apply deadbee... add feature"
        ));
    }

    #[test]
    fn merge_batch_display_lists_every_failure() {
        let err = GitError::MergeBatch {
            failures: vec![
                ("t1".to_string(), "merge conflict: boom".to_string()),
                ("t4".to_string(), "not found: branch".to_string()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 task merge(s) failed"));
        assert!(msg.contains("t1: merge conflict"));
        assert!(msg.contains("t4: not found"));
    }
}
