use chrono::Utc;
use domain::{
    policy::{self, Action},
    validate_range, Comment, CommentError, CommentPatch, NewComment, Principal, ScriptId,
};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::{
    db_err,
    models::{SqlComment, COMMENT_COLUMNS},
    Db,
};

pub(crate) async fn fetch_comment(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<SqlComment>, CommentError> {
    sqlx::query_as::<_, SqlComment>(&format!(
        "SELECT {} FROM comments WHERE id = ?",
        COMMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)
}

fn new_comment_id() -> String {
    format!("c_{:032x}", rand::random::<u128>())
}

impl Db {
    /// `txn_id` makes the insert idempotent per author: a retried request
    /// returns the row created by the first delivery.
    pub async fn insert_comment(
        &self,
        principal: &Principal,
        draft: &NewComment,
        txn_id: Option<&str>,
    ) -> Result<Comment, CommentError> {
        policy::evaluate(principal, &Action::CreateComment).into_result()?;
        draft.validate()?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(txn) = txn_id {
            let existing = sqlx::query_as::<_, SqlComment>(&format!(
                "SELECT {} FROM comments WHERE user_id = ? AND txn_id = ?",
                COMMENT_COLUMNS
            ))
            .bind(&principal.user_id)
            .bind(txn)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            if let Some(row) = existing {
                debug!("Duplicate delivery for txn {}, returning {}", txn, row.id);
                return Ok(row.into());
            }
        }

        // 回复必须挂在同一剧本下、仍然存活的评论上
        if let Some(parent_id) = &draft.parent_comment_id {
            match fetch_comment(&mut tx, parent_id).await? {
                None => {
                    return Err(CommentError::IntegrityViolation(format!(
                        "parent comment {} does not exist",
                        parent_id
                    )))
                }
                Some(p) if p.script_id != draft.script_id.as_str() => {
                    return Err(CommentError::IntegrityViolation(format!(
                        "parent comment {} belongs to another script",
                        parent_id
                    )))
                }
                Some(p) if p.deleted => {
                    return Err(CommentError::PreconditionFailed(format!(
                        "cannot reply to deleted comment {}",
                        parent_id
                    )))
                }
                Some(_) => {}
            }
        }

        let comment = Comment {
            id: new_comment_id(),
            script_id: draft.script_id.clone(),
            parent_comment_id: draft.parent_comment_id.clone(),
            user_id: principal.user_id.clone(),
            content: draft.content.clone(),
            start_position: draft.start_position,
            end_position: draft.end_position,
            deleted: false,
            created_at: Utc::now().naive_utc(),
            updated_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO comments (
                id, script_id, parent_comment_id, user_id, content,
                start_position, end_position, deleted, txn_id, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, FALSE, ?, ?, NULL)
            "#,
        )
        .bind(&comment.id)
        .bind(comment.script_id.as_str())
        .bind(&comment.parent_comment_id)
        .bind(&comment.user_id)
        .bind(&comment.content)
        .bind(comment.start_position)
        .bind(comment.end_position)
        .bind(txn_id)
        .bind(comment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        info!("Comment created: {} on {}", comment.id, comment.script_id);
        Ok(comment)
    }

    pub async fn update_comment(
        &self,
        principal: &Principal,
        id: &str,
        patch: &CommentPatch,
    ) -> Result<Comment, CommentError> {
        patch.validate()?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let current = fetch_comment(&mut tx, id)
            .await?
            .ok_or_else(|| CommentError::NotFound(id.to_string()))?;

        policy::evaluate(
            principal,
            &Action::EditComment {
                author_id: &current.user_id,
            },
        )
        .into_result()?;

        if current.deleted {
            return Err(CommentError::PreconditionFailed(format!(
                "cannot edit deleted comment {}",
                id
            )));
        }

        let mut comment: Comment = current.into();
        if let Some(content) = &patch.content {
            comment.content = content.clone();
        }
        if let Some(start) = patch.start_position {
            comment.start_position = start;
        }
        if let Some(end) = patch.end_position {
            comment.end_position = end;
        }
        validate_range(comment.start_position, comment.end_position)?;
        comment.updated_at = Some(Utc::now().naive_utc());

        sqlx::query(
            r#"
            UPDATE comments
            SET content = ?, start_position = ?, end_position = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&comment.content)
        .bind(comment.start_position)
        .bind(comment.end_position)
        .bind(comment.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        debug!("Comment updated: {}", id);
        Ok(comment)
    }

    pub async fn get_comment(&self, id: &str) -> Result<Option<Comment>, CommentError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        Ok(fetch_comment(&mut conn, id).await?.map(Into::into))
    }

    /// Includes soft-deleted rows so clients can keep the thread shape.
    pub async fn select_by_script(
        &self,
        script_id: &ScriptId,
    ) -> Result<Vec<Comment>, CommentError> {
        let rows = sqlx::query_as::<_, SqlComment>(&format!(
            "SELECT {} FROM comments WHERE script_id = ? ORDER BY created_at ASC, id ASC",
            COMMENT_COLUMNS
        ))
        .bind(script_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{draft, memory_db, seed_thread};
    use domain::{CommentError, CommentPatch, Principal, ScriptId};

    #[tokio::test]
    async fn insert_is_idempotent_per_txn() {
        let db = memory_db().await;
        let alice = Principal::member("alice");
        let d = draft("s1", None, "hello");

        let first = db.insert_comment(&alice, &d, Some("temp-1")).await.unwrap();
        let again = db.insert_comment(&alice, &d, Some("temp-1")).await.unwrap();
        assert_eq!(first.id, again.id);

        let all = db
            .select_by_script(&ScriptId::new_unchecked("s1".into()))
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn reply_requires_live_parent_on_same_script() {
        let db = memory_db().await;
        let alice = Principal::member("alice");

        let err = db
            .insert_comment(&alice, &draft("s1", Some("ghost"), "hi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommentError::IntegrityViolation(_)));

        let parent = db.insert_comment(&alice, &draft("s1", None, "p"), None).await.unwrap();
        let err = db
            .insert_comment(&alice, &draft("s2", Some(&parent.id), "hi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommentError::IntegrityViolation(_)));

        db.cascade_soft_delete(&alice, &[parent.id.clone()]).await.unwrap();
        let err = db
            .insert_comment(&alice, &draft("s1", Some(&parent.id), "hi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommentError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn only_author_or_admin_can_edit() {
        let db = memory_db().await;
        let (parent, _, _) = seed_thread(&db).await;

        let patch = CommentPatch::content("mine now");
        let err = db
            .update_comment(&Principal::member("bob"), &parent.id, &patch)
            .await
            .unwrap_err();
        assert!(matches!(err, CommentError::AuthorizationDenied(_)));

        let patch = CommentPatch::content("edited");
        let updated = db
            .update_comment(&Principal::member("alice"), &parent.id, &patch)
            .await
            .unwrap();
        assert_eq!(updated.content, "edited");
        assert!(updated.updated_at.is_some());

        let stored = db.get_comment(&parent.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "edited");
    }

    #[tokio::test]
    async fn update_unknown_comment_is_not_found() {
        let db = memory_db().await;
        let err = db
            .update_comment(&Principal::admin("root"), "nope", &CommentPatch::content("x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn update_rejects_inverted_range() {
        let db = memory_db().await;
        let (parent, _, _) = seed_thread(&db).await;
        let patch = CommentPatch {
            start_position: Some(100),
            ..CommentPatch::default()
        };
        let err = db
            .update_comment(&Principal::member("alice"), &parent.id, &patch)
            .await
            .unwrap_err();
        assert!(matches!(err, CommentError::Invalid(_)));
    }
}
