use axum::{extract::State, Json};
use domain::{Comment, HardDeleteOutcome, IngestEvent, SoftDeleteOutcome};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::http::{auth::Caller, error::ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CascadeSoftDeleteRequest {
    pub comment_ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct HardDeleteRequest {
    pub comment_id: String,
    #[serde(default)]
    pub reason: String,
}

/// 一次调用可能跨多个剧本，按剧本分别推送
pub(crate) fn publish_soft_deleted(state: &AppState, comments: &[Comment]) {
    let mut by_script = BTreeMap::new();
    for c in comments {
        by_script
            .entry(c.script_id.clone())
            .or_insert_with(Vec::new)
            .push(c.id.clone());
    }
    for (script_id, comment_ids) in by_script {
        state.publish(IngestEvent::CommentsSoftDeleted {
            script_id,
            comment_ids,
        });
    }
}

pub async fn cascade_soft_delete(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Json(req): Json<CascadeSoftDeleteRequest>,
) -> Result<Json<SoftDeleteOutcome>, ApiError> {
    let batch = state
        .db
        .cascade_soft_delete(&principal, &req.comment_ids)
        .await?;

    publish_soft_deleted(&state, &batch.comments);

    Ok(Json(SoftDeleteOutcome {
        marked: batch.comments.into_iter().map(|c| c.id).collect(),
    }))
}

pub async fn hard_delete_comment_tree(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Json(req): Json<HardDeleteRequest>,
) -> Result<Json<HardDeleteOutcome>, ApiError> {
    let erased = state
        .db
        .hard_delete_comment_tree(&principal, &req.comment_id, &req.reason)
        .await?;

    state.publish(IngestEvent::CommentTreeErased {
        script_id: erased.script_id,
        root_comment_id: erased.root_comment_id,
        comment_ids: erased.comment_ids,
    });
    Ok(Json(erased.outcome))
}
