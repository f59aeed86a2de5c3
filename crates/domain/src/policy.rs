use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CommentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

/// The caller, as resolved by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

impl Principal {
    pub fn member(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Member,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    CreateComment,
    EditComment { author_id: &'a str },
    SoftDelete { author_id: &'a str },
    HardDeleteTree,
    PhysicalDelete,
    ReadAuditLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Anonymous,
    NotAuthor,
    AdminOnly,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Anonymous => write!(f, "caller is not identified"),
            DenyReason::NotAuthor => write!(f, "only the author or an administrator may do this"),
            DenyReason::AdminOnly => write!(f, "administrator role required"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), CommentError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(CommentError::AuthorizationDenied(reason.to_string())),
        }
    }
}

/// Single policy evaluation point, consulted before every mutating store operation.
pub fn evaluate(principal: &Principal, action: &Action<'_>) -> Decision {
    if principal.user_id.trim().is_empty() {
        return Decision::Deny(DenyReason::Anonymous);
    }

    match action {
        Action::CreateComment => Decision::Allow,
        Action::EditComment { author_id } | Action::SoftDelete { author_id } => {
            if principal.is_admin() || principal.user_id == *author_id {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotAuthor)
            }
        }
        Action::HardDeleteTree | Action::PhysicalDelete | Action::ReadAuditLog => {
            if principal.is_admin() {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::AdminOnly)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authors_edit_their_own_comments() {
        let alice = Principal::member("alice");
        assert!(evaluate(&alice, &Action::EditComment { author_id: "alice" }).is_allowed());
        assert_eq!(
            evaluate(&alice, &Action::SoftDelete { author_id: "bob" }),
            Decision::Deny(DenyReason::NotAuthor)
        );
        let root = Principal::admin("root");
        assert!(evaluate(&root, &Action::SoftDelete { author_id: "bob" }).is_allowed());
    }

    #[test]
    fn hard_delete_is_admin_only() {
        let err = evaluate(&Principal::member("alice"), &Action::HardDeleteTree)
            .into_result()
            .unwrap_err();
        assert!(matches!(err, CommentError::AuthorizationDenied(_)));
        assert!(evaluate(&Principal::admin("root"), &Action::HardDeleteTree).is_allowed());
    }

    #[test]
    fn anonymous_caller_is_rejected() {
        assert_eq!(
            evaluate(&Principal::admin(" "), &Action::CreateComment),
            Decision::Deny(DenyReason::Anonymous)
        );
    }
}
