use axum::{
    extract::{Query, State},
    Json,
};
use domain::HardDeleteAuditLogEntry;
use serde::Deserialize;

use crate::http::{auth::Caller, error::ApiError};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Deserialize)]
pub struct AuditQuery {
    pub root_comment_id: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_audit_log(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<HardDeleteAuditLogEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let entries = state
        .db
        .list_audit_log(&principal, query.root_comment_id.as_deref(), limit)
        .await?;
    Ok(Json(entries))
}
