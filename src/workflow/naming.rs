//! Pure derivations for branch names and worktree directory names.
//!
//! Workflow branch: `<prefix>/<workflow_id>`
//! Task branch:     `<prefix>/<workflow_id>__<task_id>`
//! Task directory:  `<task_id>__<sanitized label>`
//!
//! Task branches are namespaced under their workflow branch, which is what
//! lets cleanup delete everything sharing the namespace prefix.

use crate::error::{GitError, Result};

pub fn workflow_branch(prefix: &str, workflow_id: &str) -> String {
    format!("{prefix}/{workflow_id}")
}

pub fn task_branch(prefix: &str, workflow_id: &str, task_id: &str) -> String {
    format!("{}__{task_id}", workflow_branch(prefix, workflow_id))
}

/// Workflow and task identifiers end up in branch names and directory
/// names, so they get a stricter character set than general refs.
pub fn validate_identifier(kind: &str, id: &str) -> Result<()> {
    let fail = |why: &str| {
        Err(GitError::Validation(format!(
            "invalid {kind} {id:?}: {why}"
        )))
    };
    if id.is_empty() {
        return fail("empty");
    }
    if id.starts_with('-') || id.starts_with('.') {
        return fail("must not start with a dash or dot");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return fail("only ascii alphanumerics, dash, underscore, and dot are allowed");
    }
    if id.contains("..") || id.ends_with('.') || id.ends_with(".lock") {
        return fail("dot sequence reserved by git");
    }
    Ok(())
}

/// Lowercase slug of a human label: non-alphanumerics collapse to single
/// dashes, capped at `max_len` bytes.
pub fn sanitize_label(label: &str, max_len: usize) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in label.chars() {
        if slug.len() >= max_len {
            break;
        }
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
                if slug.len() >= max_len {
                    break;
                }
            }
            slug.push(c.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Directory name for a task worktree under its workflow root.
pub fn task_dir_name(task_id: &str, label: &str, max_slug_len: usize) -> String {
    let slug = sanitize_label(label, max_slug_len);
    if slug.is_empty() {
        task_id.to_string()
    } else {
        format!("{task_id}__{slug}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_branch_is_prefixed_by_workflow_branch_and_deterministic() {
        let wf = workflow_branch("swarm", "wf-1");
        let task = task_branch("swarm", "wf-1", "t1");
        assert!(task.starts_with(&wf));
        assert_eq!(wf, "swarm/wf-1");
        assert_eq!(task, "swarm/wf-1__t1");
        assert_eq!(task, task_branch("swarm", "wf-1", "t1"));
    }

    #[test]
    fn identifiers_reject_hostile_input() {
        for id in ["", "-leading", ".hidden", "a/b", "a b", "a..b", "x.lock", "dot."] {
            assert!(
                matches!(
                    validate_identifier("task id", id),
                    Err(GitError::Validation(_))
                ),
                "{id:?} should be rejected"
            );
        }
        for id in ["t1", "wf-1", "task_42", "v1.2"] {
            assert!(validate_identifier("task id", id).is_ok(), "{id:?}");
        }
    }

    #[test]
    fn sanitize_label_lowercases_and_collapses() {
        assert_eq!(sanitize_label("Add OAuth2 Login!", 32), "add-oauth2-login");
        assert_eq!(sanitize_label("  lots   of\tspace ", 32), "lots-of-space");
        assert_eq!(sanitize_label("***", 32), "");
    }

    #[test]
    fn sanitize_label_caps_length() {
        let slug = sanitize_label("a very long label that keeps going and going", 12);
        assert!(slug.len() <= 12, "slug was {slug:?}");
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn task_dir_name_falls_back_to_task_id() {
        assert_eq!(task_dir_name("t1", "Fix login", 32), "t1__fix-login");
        assert_eq!(task_dir_name("t1", "!!!", 32), "t1");
    }
}
