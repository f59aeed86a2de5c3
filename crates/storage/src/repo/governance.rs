use chrono::Utc;
use domain::{
    governance::{self, FailureReason, HardDeletePlan},
    policy::{self, Action},
    tree::CommentTree,
    AuditOutcome, Comment, CommentError, HardDeleteOutcome, Principal, ScriptId,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::audit::{append_audit_entry, NewAuditEntry};
use super::comments::fetch_comment;
use crate::{db_err, models::SqlTreeNode, Db};

/// Rows flipped to `deleted = true` by one soft delete call.
#[derive(Debug, Clone)]
pub struct SoftDeletedBatch {
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone)]
pub struct ErasedTree {
    pub script_id: ScriptId,
    pub root_comment_id: String,
    pub comment_ids: Vec<String>,
    pub outcome: HardDeleteOutcome,
}

/// Whole reply forest of the script that owns `comment_id`.
async fn load_script_tree(
    conn: &mut SqliteConnection,
    comment_id: &str,
) -> Result<Option<(ScriptId, CommentTree)>, CommentError> {
    let script: Option<String> = sqlx::query_scalar("SELECT script_id FROM comments WHERE id = ?")
        .bind(comment_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

    let Some(script) = script else {
        return Ok(None);
    };

    let nodes = sqlx::query_as::<_, SqlTreeNode>(
        "SELECT id, parent_comment_id, deleted FROM comments WHERE script_id = ?",
    )
    .bind(&script)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(Some((
        ScriptId::new_unchecked(script),
        CommentTree::from_nodes(nodes.into_iter().map(Into::into)),
    )))
}

async fn delete_rows(conn: &mut SqliteConnection, ids: &[String]) -> Result<u64, CommentError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM comments WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");

    let result = qb.build().execute(&mut *conn).await.map_err(db_err)?;
    Ok(result.rows_affected())
}

fn normalize_reason(reason: &str) -> String {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        "(no reason given)".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Requested roots plus every reply below them, roots first, without repeats.
async fn expand_subtrees(
    conn: &mut SqliteConnection,
    roots: &[String],
) -> Result<Vec<String>, CommentError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for root in roots {
        if seen.contains(root) {
            continue;
        }
        let Some((_, tree)) = load_script_tree(conn, root).await? else {
            debug!("Soft delete skipped missing comment {}", root);
            continue;
        };
        for id in tree.subtree_ids(root) {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}

impl Db {
    /// Marks every listed comment and all of its current replies deleted in
    /// one transaction. The subtree is read inside that transaction, so replies
    /// the caller has never seen are included. Ids that no longer exist are
    /// skipped; if none exist the call reports `NotFound`.
    pub async fn cascade_soft_delete(
        &self,
        principal: &Principal,
        comment_ids: &[String],
    ) -> Result<SoftDeletedBatch, CommentError> {
        self.soft_delete(principal, comment_ids, true).await
    }

    /// Marks a single comment deleted and leaves its replies alone.
    pub async fn soft_delete_comment(
        &self,
        principal: &Principal,
        comment_id: &str,
    ) -> Result<SoftDeletedBatch, CommentError> {
        self.soft_delete(principal, &[comment_id.to_string()], false).await
    }

    async fn soft_delete(
        &self,
        principal: &Principal,
        comment_ids: &[String],
        cascade: bool,
    ) -> Result<SoftDeletedBatch, CommentError> {
        if comment_ids.is_empty() {
            return Err(CommentError::Invalid("no comment ids given".into()));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let targets = if cascade {
            expand_subtrees(&mut tx, comment_ids).await?
        } else {
            comment_ids.to_vec()
        };

        let mut found = 0usize;
        let mut to_mark = Vec::new();
        for id in &targets {
            let Some(row) = fetch_comment(&mut tx, id).await? else {
                debug!("Soft delete skipped missing comment {}", id);
                continue;
            };
            found += 1;

            // 任何一条被拒绝，整个事务回滚
            policy::evaluate(
                principal,
                &Action::SoftDelete {
                    author_id: &row.user_id,
                },
            )
            .into_result()?;

            if !row.deleted {
                to_mark.push(Comment::from(row));
            }
        }

        if found == 0 {
            return Err(CommentError::NotFound(comment_ids.join(", ")));
        }

        let now = Utc::now().naive_utc();
        if !to_mark.is_empty() {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("UPDATE comments SET deleted = TRUE, updated_at = ");
            qb.push_bind(now);
            qb.push(" WHERE id IN (");
            let mut separated = qb.separated(", ");
            for c in &to_mark {
                separated.push_bind(c.id.clone());
            }
            separated.push_unseparated(")");

            let result = qb.build().execute(&mut *tx).await.map_err(db_err)?;
            if result.rows_affected() != to_mark.len() as u64 {
                return Err(CommentError::Internal(format!(
                    "soft delete touched {} rows, expected {}",
                    result.rows_affected(),
                    to_mark.len()
                )));
            }
        }

        tx.commit().await.map_err(db_err)?;

        for c in &mut to_mark {
            c.deleted = true;
            c.updated_at = Some(now);
        }
        info!(
            "Soft deleted {} comment(s) for {} (cascade: {})",
            to_mark.len(),
            principal.user_id,
            cascade
        );
        Ok(SoftDeletedBatch { comments: to_mark })
    }

    /// Governed, irreversible removal of `comment_id` and its whole reply tree.
    ///
    /// The guard checks, the deletion and the audit append share one
    /// transaction. A rejected attempt still commits its `failed` audit row.
    pub async fn hard_delete_comment_tree(
        &self,
        principal: &Principal,
        comment_id: &str,
        reason: &str,
    ) -> Result<ErasedTree, CommentError> {
        let reason = normalize_reason(reason);
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let loaded = load_script_tree(&mut tx, comment_id).await?;
        let plan = match &loaded {
            Some((_, tree)) => governance::plan_hard_delete(tree, comment_id, principal),
            None => {
                // 角色检查优先于存在性检查
                governance::plan_hard_delete(&CommentTree::default(), comment_id, principal)
            }
        };

        match plan {
            Err(failure) => {
                self.record_failure(&mut tx, principal, comment_id, &reason, &failure)
                    .await?;
                tx.commit().await.map_err(db_err)?;
                Err(failure.to_error(comment_id))
            }
            Ok(plan) => {
                let script_id = match loaded {
                    Some((script_id, _)) => script_id,
                    None => return Err(CommentError::NotFound(comment_id.to_string())),
                };
                let outcome = execute_plan(&mut tx, principal, &plan, &reason).await?;
                tx.commit().await.map_err(db_err)?;

                info!(
                    "Hard deleted comment tree {} ({} rows) by {}: {}",
                    comment_id, outcome.descendants_deleted, principal.user_id, reason
                );
                Ok(ErasedTree {
                    script_id,
                    root_comment_id: plan.root,
                    comment_ids: plan.ids,
                    outcome,
                })
            }
        }
    }

    /// Direct physical delete of a single comment, guarded against orphaning replies.
    pub async fn delete_comment(
        &self,
        principal: &Principal,
        comment_id: &str,
        reason: &str,
    ) -> Result<ErasedTree, CommentError> {
        let reason = normalize_reason(reason);
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let Some((script_id, tree)) = load_script_tree(&mut tx, comment_id).await? else {
            self.record_failure(&mut tx, principal, comment_id, &reason, &FailureReason::NotFound)
                .await?;
            tx.commit().await.map_err(db_err)?;
            return Err(CommentError::NotFound(comment_id.to_string()));
        };

        match governance::plan_physical_delete(&tree, comment_id, principal) {
            Err(failure) => {
                self.record_failure(&mut tx, principal, comment_id, &reason, &failure)
                    .await?;
                tx.commit().await.map_err(db_err)?;
                Err(failure.to_error(comment_id))
            }
            Ok(plan) => {
                let outcome = execute_plan(&mut tx, principal, &plan, &reason).await?;
                tx.commit().await.map_err(db_err)?;
                info!("Physically deleted comment {} by {}", comment_id, principal.user_id);
                Ok(ErasedTree {
                    script_id,
                    root_comment_id: plan.root,
                    comment_ids: plan.ids,
                    outcome,
                })
            }
        }
    }

    async fn record_failure(
        &self,
        conn: &mut SqliteConnection,
        principal: &Principal,
        comment_id: &str,
        reason: &str,
        failure: &FailureReason,
    ) -> Result<(), CommentError> {
        warn!(
            "Hard delete of {} by {} rejected: {}",
            comment_id, principal.user_id, failure
        );
        append_audit_entry(
            conn,
            NewAuditEntry {
                root_comment_id: comment_id,
                operator_id: &principal.user_id,
                descendant_count: 0,
                reason: failure.audit_reason(reason),
                outcome: AuditOutcome::Failed,
                failure_code: Some(failure.code()),
            },
        )
        .await?;
        Ok(())
    }
}

async fn execute_plan(
    conn: &mut SqliteConnection,
    principal: &Principal,
    plan: &HardDeletePlan,
    reason: &str,
) -> Result<HardDeleteOutcome, CommentError> {
    let removed = delete_rows(conn, &plan.ids).await?;
    if removed != plan.ids.len() as u64 {
        // 事务随 Err 丢弃而回滚
        return Err(CommentError::Internal(format!(
            "hard delete removed {} rows, planned {}",
            removed,
            plan.ids.len()
        )));
    }

    append_audit_entry(
        conn,
        NewAuditEntry {
            root_comment_id: &plan.root,
            operator_id: &principal.user_id,
            descendant_count: plan.descendant_count(),
            reason: reason.to_string(),
            outcome: AuditOutcome::Success,
            failure_code: None,
        },
    )
    .await?;

    Ok(HardDeleteOutcome {
        success: true,
        descendants_deleted: plan.descendant_count(),
    })
}
