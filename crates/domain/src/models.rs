use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CommentError;

pub const MAX_CONTENT_LEN: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptId(String);

impl ScriptId {
    pub fn new(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        if s.is_empty() {
            return Err("Script ID cannot be empty.".to_string());
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
        {
            return Err("Script ID contains invalid characters.".to_string());
        }
        if s.len() > 64 {
            return Err("Script ID is too long (max 64 chars).".to_string());
        }
        Ok(Self(s))
    }

    pub fn new_unchecked(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-confirmed comment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub script_id: ScriptId,
    pub parent_comment_id: Option<String>,
    pub user_id: String,
    pub content: String,
    pub start_position: u32,
    pub end_position: u32,
    pub deleted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

/// What a user submits when creating a comment or a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub script_id: ScriptId,
    pub parent_comment_id: Option<String>,
    pub content: String,
    pub start_position: u32,
    pub end_position: u32,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), CommentError> {
        validate_content(&self.content)?;
        validate_range(self.start_position, self.end_position)
    }
}

/// Partial update for `update(id, fields)`. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentPatch {
    pub content: Option<String>,
    pub start_position: Option<u32>,
    pub end_position: Option<u32>,
}

impl CommentPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.start_position.is_none() && self.end_position.is_none()
    }

    pub fn validate(&self) -> Result<(), CommentError> {
        if self.is_empty() {
            return Err(CommentError::Invalid("update carries no fields".into()));
        }
        if let Some(content) = &self.content {
            validate_content(content)?;
        }
        Ok(())
    }
}

pub fn validate_content(content: &str) -> Result<(), CommentError> {
    if content.trim().is_empty() {
        return Err(CommentError::Invalid("comment content cannot be blank".into()));
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(CommentError::Invalid(format!(
            "comment content is too long (max {} chars)",
            MAX_CONTENT_LEN
        )));
    }
    Ok(())
}

pub fn validate_range(start: u32, end: u32) -> Result<(), CommentError> {
    if start > end {
        return Err(CommentError::Invalid(format!(
            "start position {} is after end position {}",
            start, end
        )));
    }
    Ok(())
}

/// Pending (`temp_id`) vs server-assigned (`id`) identity of a comment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CommentRef {
    Pending { temp_id: String },
    Confirmed { id: String },
}

impl CommentRef {
    pub fn key(&self) -> &str {
        match self {
            CommentRef::Pending { temp_id } => temp_id,
            CommentRef::Confirmed { id } => id,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CommentRef::Pending { .. })
    }
}

/// Client-local comment awaiting (or just past) server confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimisticComment {
    pub temp_id: String,
    pub real_id: Option<String>,
    pub script_id: ScriptId,
    pub parent_comment_id: Option<String>,
    pub user_id: String,
    pub content: String,
    pub start_position: u32,
    pub end_position: u32,
    pub deleted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

impl OptimisticComment {
    pub fn pending(
        temp_id: impl Into<String>,
        user_id: impl Into<String>,
        draft: &NewComment,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            temp_id: temp_id.into(),
            real_id: None,
            script_id: draft.script_id.clone(),
            parent_comment_id: draft.parent_comment_id.clone(),
            user_id: user_id.into(),
            content: draft.content.clone(),
            start_position: draft.start_position,
            end_position: draft.end_position,
            deleted: false,
            created_at,
            updated_at: None,
        }
    }

    /// Reconciliation is the only place this flips from `Pending` to `Confirmed`.
    pub fn reference(&self) -> CommentRef {
        match &self.real_id {
            Some(id) => CommentRef::Confirmed { id: id.clone() },
            None => CommentRef::Pending {
                temp_id: self.temp_id.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(AuditOutcome::Success),
            "failed" => Some(AuditOutcome::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardDeleteAuditLogEntry {
    pub id: i64,
    pub root_comment_id: String,
    pub operator_id: String,
    pub descendant_count: u32,
    pub reason: String,
    pub outcome: AuditOutcome,
    pub failure_code: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardDeleteOutcome {
    pub success: bool,
    pub descendants_deleted: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteOutcome {
    pub marked: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_id_rejects_bad_input() {
        assert!(ScriptId::new("pilot-ep01").is_ok());
        assert!(ScriptId::new("").is_err());
        assert!(ScriptId::new("has space").is_err());
        assert!(ScriptId::new("x".repeat(65)).is_err());
    }

    #[test]
    fn new_comment_validation() {
        let mut draft = NewComment {
            script_id: ScriptId::new_unchecked("s1".into()),
            parent_comment_id: None,
            content: "nice line".into(),
            start_position: 3,
            end_position: 9,
        };
        assert!(draft.validate().is_ok());

        draft.content = "   ".into();
        assert!(matches!(draft.validate(), Err(CommentError::Invalid(_))));

        draft.content = "ok".into();
        draft.start_position = 10;
        assert!(matches!(draft.validate(), Err(CommentError::Invalid(_))));
    }

    #[test]
    fn reference_follows_real_id() {
        let draft = NewComment {
            script_id: ScriptId::new_unchecked("s1".into()),
            parent_comment_id: None,
            content: "hi".into(),
            start_position: 0,
            end_position: 2,
        };
        let now = chrono::NaiveDateTime::default();
        let mut oc = OptimisticComment::pending("temp-1", "alice", &draft, now);
        assert_eq!(
            oc.reference(),
            CommentRef::Pending {
                temp_id: "temp-1".into()
            }
        );
        oc.real_id = Some("real-1".into());
        assert_eq!(oc.reference().key(), "real-1");
        assert!(!oc.reference().is_pending());
    }
}
