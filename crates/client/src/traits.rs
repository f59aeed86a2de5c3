use async_trait::async_trait;
use domain::{
    Comment, CommentError, CommentPatch, HardDeleteOutcome, NewComment, ScriptId,
    SoftDeleteOutcome,
};
use serde::{Deserialize, Serialize};

/// Named procedures the store executes atomically on its side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteProcedure {
    CascadeSoftDelete { comment_ids: Vec<String> },
    HardDeleteCommentTree { comment_id: String, reason: String },
}

impl RemoteProcedure {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteProcedure::CascadeSoftDelete { .. } => "cascade_soft_delete",
            RemoteProcedure::HardDeleteCommentTree { .. } => "hard_delete_comment_tree",
        }
    }
}

/// The persistent store as seen from one signed-in session. Every call is
/// authorised server-side for `current_user`.
#[async_trait]
pub trait CommentBackend: Send + Sync {
    fn current_user(&self) -> &str;

    async fn insert(&self, draft: &NewComment, txn_id: &str) -> Result<Comment, CommentError>;

    async fn update(&self, id: &str, patch: &CommentPatch) -> Result<Comment, CommentError>;

    async fn select_by_script(&self, script_id: &ScriptId) -> Result<Vec<Comment>, CommentError>;

    /// The store expands each id to its current reply subtree and returns
    /// every id it newly marked.
    async fn cascade_soft_delete(
        &self,
        comment_ids: &[String],
    ) -> Result<SoftDeleteOutcome, CommentError>;

    async fn soft_delete_comment(
        &self,
        comment_id: &str,
    ) -> Result<SoftDeleteOutcome, CommentError>;

    async fn hard_delete_comment_tree(
        &self,
        comment_id: &str,
        reason: &str,
    ) -> Result<HardDeleteOutcome, CommentError>;

    /// Untyped entry point for callers that only know the procedure by name.
    async fn remote_procedure(
        &self,
        call: &RemoteProcedure,
    ) -> Result<serde_json::Value, CommentError> {
        let value = match call {
            RemoteProcedure::CascadeSoftDelete { comment_ids } => {
                serde_json::to_value(self.cascade_soft_delete(comment_ids).await?)
            }
            RemoteProcedure::HardDeleteCommentTree { comment_id, reason } => {
                serde_json::to_value(self.hard_delete_comment_tree(comment_id, reason).await?)
            }
        };
        value.map_err(|e| CommentError::Internal(e.to_string()))
    }
}
