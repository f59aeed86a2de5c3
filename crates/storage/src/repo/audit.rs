use chrono::Utc;
use domain::{
    policy::{self, Action},
    AuditOutcome, CommentError, HardDeleteAuditLogEntry, Principal,
};
use sqlx::SqliteConnection;

use crate::{db_err, models::SqlAuditEntry, Db};

pub(crate) struct NewAuditEntry<'a> {
    pub root_comment_id: &'a str,
    pub operator_id: &'a str,
    pub descendant_count: u32,
    pub reason: String,
    pub outcome: AuditOutcome,
    pub failure_code: Option<&'static str>,
}

/// Runs on the caller's transaction so the entry commits together with the deletion.
pub(crate) async fn append_audit_entry(
    conn: &mut SqliteConnection,
    entry: NewAuditEntry<'_>,
) -> Result<i64, CommentError> {
    let result = sqlx::query(
        r#"
        INSERT INTO hard_delete_audit_log (
            root_comment_id, operator_id, descendant_count,
            reason, outcome, failure_code, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.root_comment_id)
    .bind(entry.operator_id)
    .bind(entry.descendant_count)
    .bind(&entry.reason)
    .bind(entry.outcome.as_str())
    .bind(entry.failure_code)
    .bind(Utc::now().naive_utc())
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(result.last_insert_rowid())
}

impl Db {
    pub async fn list_audit_log(
        &self,
        principal: &Principal,
        root_comment_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<HardDeleteAuditLogEntry>, CommentError> {
        policy::evaluate(principal, &Action::ReadAuditLog).into_result()?;

        let rows = sqlx::query_as::<_, SqlAuditEntry>(
            r#"
            SELECT id, root_comment_id, operator_id, descendant_count,
                   reason, outcome, failure_code, created_at
            FROM hard_delete_audit_log
            WHERE (?1 IS NULL OR root_comment_id = ?1)
            ORDER BY id ASC
            LIMIT ?2
            "#,
        )
        .bind(root_comment_id)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
