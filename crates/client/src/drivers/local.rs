use async_trait::async_trait;
use domain::{
    Comment, CommentError, CommentPatch, HardDeleteOutcome, NewComment, Principal, ScriptId,
    SoftDeleteOutcome,
};
use storage::Db;

use crate::traits::CommentBackend;

/// Talks to the database in-process, acting as a fixed principal.
#[derive(Clone)]
pub struct LocalBackend {
    db: Db,
    principal: Principal,
}

impl LocalBackend {
    pub fn new(db: Db, principal: Principal) -> Self {
        Self { db, principal }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}

#[async_trait]
impl CommentBackend for LocalBackend {
    fn current_user(&self) -> &str {
        &self.principal.user_id
    }

    async fn insert(&self, draft: &NewComment, txn_id: &str) -> Result<Comment, CommentError> {
        self.db
            .insert_comment(&self.principal, draft, Some(txn_id))
            .await
    }

    async fn update(&self, id: &str, patch: &CommentPatch) -> Result<Comment, CommentError> {
        self.db.update_comment(&self.principal, id, patch).await
    }

    async fn select_by_script(&self, script_id: &ScriptId) -> Result<Vec<Comment>, CommentError> {
        self.db.select_by_script(script_id).await
    }

    async fn cascade_soft_delete(
        &self,
        comment_ids: &[String],
    ) -> Result<SoftDeleteOutcome, CommentError> {
        let batch = self
            .db
            .cascade_soft_delete(&self.principal, comment_ids)
            .await?;
        Ok(SoftDeleteOutcome {
            marked: batch.comments.into_iter().map(|c| c.id).collect(),
        })
    }

    async fn soft_delete_comment(
        &self,
        comment_id: &str,
    ) -> Result<SoftDeleteOutcome, CommentError> {
        let batch = self
            .db
            .soft_delete_comment(&self.principal, comment_id)
            .await?;
        Ok(SoftDeleteOutcome {
            marked: batch.comments.into_iter().map(|c| c.id).collect(),
        })
    }

    async fn hard_delete_comment_tree(
        &self,
        comment_id: &str,
        reason: &str,
    ) -> Result<HardDeleteOutcome, CommentError> {
        let erased = self
            .db
            .hard_delete_comment_tree(&self.principal, comment_id, reason)
            .await?;
        Ok(erased.outcome)
    }
}
