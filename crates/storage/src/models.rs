use chrono::NaiveDateTime;
use domain::{AuditOutcome, Comment, CommentError, HardDeleteAuditLogEntry, ScriptId};
use sqlx::FromRow;

pub(crate) const COMMENT_COLUMNS: &str = "id, script_id, parent_comment_id, user_id, content, \
     start_position, end_position, deleted, created_at, updated_at";

#[derive(FromRow)]
pub struct SqlComment {
    pub id: String,
    pub script_id: String,
    pub parent_comment_id: Option<String>,
    pub user_id: String,
    pub content: String,
    pub start_position: u32,
    pub end_position: u32,
    pub deleted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<SqlComment> for Comment {
    fn from(sql: SqlComment) -> Self {
        Comment {
            id: sql.id,
            script_id: ScriptId::new_unchecked(sql.script_id),
            parent_comment_id: sql.parent_comment_id,
            user_id: sql.user_id,
            content: sql.content,
            start_position: sql.start_position,
            end_position: sql.end_position,
            deleted: sql.deleted,
            created_at: sql.created_at,
            updated_at: sql.updated_at,
        }
    }
}

// 只用于构建评论树
#[derive(FromRow)]
pub struct SqlTreeNode {
    pub id: String,
    pub parent_comment_id: Option<String>,
    pub deleted: bool,
}

impl From<SqlTreeNode> for domain::tree::TreeNode {
    fn from(sql: SqlTreeNode) -> Self {
        domain::tree::TreeNode {
            id: sql.id,
            parent_comment_id: sql.parent_comment_id,
            deleted: sql.deleted,
        }
    }
}

#[derive(FromRow)]
pub struct SqlAuditEntry {
    pub id: i64,
    pub root_comment_id: String,
    pub operator_id: String,
    pub descendant_count: u32,
    pub reason: String,
    pub outcome: String,
    pub failure_code: Option<String>,
    pub created_at: NaiveDateTime,
}

impl TryFrom<SqlAuditEntry> for HardDeleteAuditLogEntry {
    type Error = CommentError;

    fn try_from(sql: SqlAuditEntry) -> Result<Self, Self::Error> {
        let outcome = AuditOutcome::parse(&sql.outcome).ok_or_else(|| {
            CommentError::Internal(format!("unknown audit outcome '{}'", sql.outcome))
        })?;
        Ok(HardDeleteAuditLogEntry {
            id: sql.id,
            root_comment_id: sql.root_comment_id,
            operator_id: sql.operator_id,
            descendant_count: sql.descendant_count,
            reason: sql.reason,
            outcome,
            failure_code: sql.failure_code,
            created_at: sql.created_at,
        })
    }
}
