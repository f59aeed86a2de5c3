use crate::models::{Comment, ScriptId};
use serde::{Deserialize, Serialize};

/// Change feed published by the server after each committed write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestEvent {
    CommentSaved {
        script_id: ScriptId,
        comment: Comment,
    },
    CommentsSoftDeleted {
        script_id: ScriptId,
        comment_ids: Vec<String>,
    },
    CommentTreeErased {
        script_id: ScriptId,
        root_comment_id: String,
        comment_ids: Vec<String>,
    },
}

impl IngestEvent {
    pub fn script_id(&self) -> &ScriptId {
        match self {
            IngestEvent::CommentSaved { script_id, .. }
            | IngestEvent::CommentsSoftDeleted { script_id, .. }
            | IngestEvent::CommentTreeErased { script_id, .. } => script_id,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            IngestEvent::CommentSaved { comment, .. } if comment.updated_at.is_some() => {
                "update_comment"
            }
            IngestEvent::CommentSaved { .. } => "new_comment",
            IngestEvent::CommentsSoftDeleted { .. } => "delete_comment",
            IngestEvent::CommentTreeErased { .. } => "erase_comment_tree",
        }
    }
}
