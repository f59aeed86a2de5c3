use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use domain::IngestEvent;
use futures::stream::Stream;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::http::{error::ApiError, handlers::comments::parse_script_id};
use crate::state::AppState;

fn to_sse_event(event: &IngestEvent) -> Result<Event, axum::Error> {
    let data = match event {
        IngestEvent::CommentSaved { comment, .. } => Event::default().json_data(comment),
        IngestEvent::CommentsSoftDeleted { comment_ids, .. } => {
            Event::default().json_data(serde_json::json!({ "ids": comment_ids }))
        }
        IngestEvent::CommentTreeErased {
            root_comment_id,
            comment_ids,
            ..
        } => Event::default().json_data(serde_json::json!({
            "root_comment_id": root_comment_id,
            "ids": comment_ids,
        })),
    };
    data.map(|e| e.event(event.event_name())).map_err(|e| {
        tracing::error!("SSE serialization error: {}", e);
        e
    })
}

pub async fn sse_handler(
    State(state): State<AppState>,
    Path(script_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let script_id = parse_script_id(script_id)?;
    let rx = state.tx_ingest.subscribe();
    tracing::info!("SSE Connected: script={}", script_id);

    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.script_id() == &script_id => Some(to_sse_event(&event)),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("SSE subscriber lagged: {}", e);
            None
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15))))
}
