use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use domain::{
    Comment, CommentError, CommentPatch, HardDeleteOutcome, IngestEvent, NewComment, ScriptId,
    SoftDeleteOutcome,
};
use serde::Deserialize;

use crate::http::{auth::Caller, error::ApiError, handlers::rpc::publish_soft_deleted};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub parent_comment_id: Option<String>,
    pub content: String,
    pub start_position: u32,
    pub end_position: u32,
    /// Client-side temp id, makes retried creates idempotent.
    pub txn_id: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub reason: Option<String>,
}

pub(crate) fn parse_script_id(raw: String) -> Result<ScriptId, ApiError> {
    ScriptId::new(raw).map_err(|e| ApiError(CommentError::Invalid(e)))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(script_id): Path<String>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let script_id = parse_script_id(script_id)?;
    let comments = state.db.select_by_script(&script_id).await?;
    Ok(Json(comments))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(script_id): Path<String>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let script_id = parse_script_id(script_id)?;
    let draft = NewComment {
        script_id: script_id.clone(),
        parent_comment_id: payload.parent_comment_id,
        content: payload.content,
        start_position: payload.start_position,
        end_position: payload.end_position,
    };

    let comment = state
        .db
        .insert_comment(&principal, &draft, payload.txn_id.as_deref())
        .await?;

    state.publish(IngestEvent::CommentSaved {
        script_id,
        comment: comment.clone(),
    });
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn update_comment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(comment_id): Path<String>,
    Json(patch): Json<CommentPatch>,
) -> Result<Json<Comment>, ApiError> {
    let comment = state.db.update_comment(&principal, &comment_id, &patch).await?;
    state.publish(IngestEvent::CommentSaved {
        script_id: comment.script_id.clone(),
        comment: comment.clone(),
    });
    Ok(Json(comment))
}

/// Marks one comment deleted; its replies stay as they are.
pub async fn soft_delete_comment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(comment_id): Path<String>,
) -> Result<Json<SoftDeleteOutcome>, ApiError> {
    let batch = state.db.soft_delete_comment(&principal, &comment_id).await?;
    publish_soft_deleted(&state, &batch.comments);
    Ok(Json(SoftDeleteOutcome {
        marked: batch.comments.into_iter().map(|c| c.id).collect(),
    }))
}

/// Single-row physical delete; refused while the comment still has replies.
pub async fn delete_comment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(comment_id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<HardDeleteOutcome>, ApiError> {
    let reason = query.reason.unwrap_or_default();
    let erased = state
        .db
        .delete_comment(&principal, &comment_id, &reason)
        .await?;

    state.publish(IngestEvent::CommentTreeErased {
        script_id: erased.script_id,
        root_comment_id: erased.root_comment_id,
        comment_ids: erased.comment_ids,
    });
    Ok(Json(erased.outcome))
}
