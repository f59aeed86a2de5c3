//! Deletion lifecycle rules.
//!
//! A comment tree moves `Active -> SoftDeleted -> HardDeleted`. The planning
//! functions here are pure: the store runs them inside its transaction against
//! a freshly loaded [`CommentTree`] and either executes the returned plan or
//! records the [`FailureReason`] in the audit log.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CommentError;
use crate::policy::{self, Action, Decision, Principal};
use crate::tree::CommentTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    SoftDeleted,
    HardDeleted,
}

impl LifecycleState {
    pub fn of(deleted: bool) -> Self {
        if deleted {
            LifecycleState::SoftDeleted
        } else {
            LifecycleState::Active
        }
    }

    /// Soft-deleting twice is allowed so retries stay idempotent.
    pub fn transition(self, to: LifecycleState) -> Result<LifecycleState, CommentError> {
        use LifecycleState::*;
        match (self, to) {
            (Active, SoftDeleted) | (SoftDeleted, SoftDeleted) => Ok(to),
            (SoftDeleted, HardDeleted) => Ok(to),
            (Active, HardDeleted) => Err(CommentError::PreconditionFailed(
                "must soft-delete before hard-delete".into(),
            )),
            (HardDeleted, _) => Err(CommentError::NotFound(
                "comment was permanently deleted".into(),
            )),
            (from, to) => Err(CommentError::Invalid(format!(
                "cannot move a comment from {:?} to {:?}",
                from, to
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum FailureReason {
    PermissionDenied,
    NotFound,
    NotSoftDeleted { active: Vec<String> },
    LiveChildren { children: Vec<String> },
    HasReplies { children: Vec<String> },
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::PermissionDenied => "permission_denied",
            FailureReason::NotFound => "not_found",
            FailureReason::NotSoftDeleted { .. } => "not_soft_deleted",
            FailureReason::LiveChildren { .. } => "live_children",
            FailureReason::HasReplies { .. } => "has_replies",
        }
    }

    pub fn to_error(&self, comment_id: &str) -> CommentError {
        match self {
            FailureReason::PermissionDenied => CommentError::AuthorizationDenied(format!(
                "administrator role required to permanently delete {}",
                comment_id
            )),
            FailureReason::NotFound => CommentError::NotFound(comment_id.to_string()),
            FailureReason::NotSoftDeleted { .. } => {
                CommentError::PreconditionFailed(self.to_string())
            }
            FailureReason::LiveChildren { .. } | FailureReason::HasReplies { .. } => {
                CommentError::IntegrityViolation(self.to_string())
            }
        }
    }

    /// Human string stored in the audit log next to the structured code.
    pub fn audit_reason(&self, requested: &str) -> String {
        format!("FAILED: {} (requested reason: {})", self, requested)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::PermissionDenied => write!(f, "administrator role required"),
            FailureReason::NotFound => write!(f, "comment not found"),
            FailureReason::NotSoftDeleted { active } => write!(
                f,
                "must soft-delete before hard-delete; {} comment(s) still active: {}",
                active.len(),
                active.join(", ")
            ),
            FailureReason::LiveChildren { children } => write!(
                f,
                "comment has {} live repl{}: {}",
                children.len(),
                if children.len() == 1 { "y" } else { "ies" },
                children.join(", ")
            ),
            FailureReason::HasReplies { children } => write!(
                f,
                "comment still has soft-deleted replies ({}); erase the whole tree instead",
                children.join(", ")
            ),
        }
    }
}

fn can_erase(deleted: bool) -> bool {
    LifecycleState::of(deleted)
        .transition(LifecycleState::HardDeleted)
        .is_ok()
}

/// Rows to remove, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardDeletePlan {
    pub root: String,
    pub ids: Vec<String>,
}

impl HardDeletePlan {
    pub fn descendant_count(&self) -> u32 {
        self.ids.len() as u32
    }
}

/// Role gate, existence, then the whole-subtree soft-delete precondition.
pub fn plan_hard_delete(
    tree: &CommentTree,
    root: &str,
    principal: &Principal,
) -> Result<HardDeletePlan, FailureReason> {
    if let Decision::Deny(_) = policy::evaluate(principal, &Action::HardDeleteTree) {
        return Err(FailureReason::PermissionDenied);
    }

    let subtree = tree.subtree(root);
    if subtree.is_empty() {
        return Err(FailureReason::NotFound);
    }

    let active: Vec<String> = subtree
        .iter()
        .filter(|n| !can_erase(n.deleted))
        .map(|n| n.id.clone())
        .collect();
    if !active.is_empty() {
        return Err(FailureReason::NotSoftDeleted { active });
    }

    Ok(HardDeletePlan {
        root: root.to_string(),
        ids: subtree.into_iter().map(|n| n.id.clone()).collect(),
    })
}

/// Single-row physical delete. The integrity guard runs before the role gate,
/// so a comment with live replies is refused for every caller.
pub fn plan_physical_delete(
    tree: &CommentTree,
    id: &str,
    principal: &Principal,
) -> Result<HardDeletePlan, FailureReason> {
    let Some(node) = tree.get(id) else {
        return Err(FailureReason::NotFound);
    };

    let live: Vec<String> = tree.live_children(id).iter().map(|c| c.id.clone()).collect();
    if !live.is_empty() {
        return Err(FailureReason::LiveChildren { children: live });
    }

    if let Decision::Deny(_) = policy::evaluate(principal, &Action::PhysicalDelete) {
        return Err(FailureReason::PermissionDenied);
    }

    let replies: Vec<String> = tree.children(id).map(|c| c.id.clone()).collect();
    if !replies.is_empty() {
        return Err(FailureReason::HasReplies { children: replies });
    }

    if !can_erase(node.deleted) {
        return Err(FailureReason::NotSoftDeleted {
            active: vec![id.to_string()],
        });
    }

    Ok(HardDeletePlan {
        root: id.to_string(),
        ids: vec![id.to_string()],
    })
}
