use super::handlers::{admin, comments, rpc, sse};
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

const METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PATCH, Method::DELETE];

pub fn build_router(state: AppState, allowed_origins: &str) -> Router {
    let cors = if allowed_origins == "*" {
        CorsLayer::new()
            .allow_methods(METHODS)
            .allow_origin(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("CORS config is invalid or empty, falling back to allow ANY.");
            CorsLayer::new()
                .allow_methods(METHODS)
                .allow_origin(Any)
                .allow_headers(Any)
        } else {
            tracing::info!("CORS enabled for origins: {:?}", origins);
            CorsLayer::new()
                .allow_methods(METHODS)
                .allow_origin(origins)
                .allow_headers(Any)
        }
    };

    Router::new()
        .route(
            "/api/scripts/:script_id/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route("/api/scripts/:script_id/events", get(sse::sse_handler))
        .route(
            "/api/comments/:comment_id",
            patch(comments::update_comment).delete(comments::delete_comment),
        )
        .route(
            "/api/comments/:comment_id/soft_delete",
            post(comments::soft_delete_comment),
        )
        .route("/api/rpc/cascade_soft_delete", post(rpc::cascade_soft_delete))
        .route(
            "/api/rpc/hard_delete_comment_tree",
            post(rpc::hard_delete_comment_tree),
        )
        .route("/api/admin/audit", get(admin::list_audit_log))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use domain::{Comment, CommentError, HardDeleteAuditLogEntry, HardDeleteOutcome, IngestEvent};
    use serde_json::{json, Value};
    use storage::Db;
    use tower::ServiceExt;

    const TOKEN: &str = "test-admin-token";

    async fn app() -> (Router, AppState) {
        let db = Db::new("sqlite::memory:").await.unwrap();
        let state = AppState::new(db, TOKEN);
        (build_router(state.clone(), "*"), state)
    }

    fn request(
        method: Method,
        uri: &str,
        user: &str,
        admin: bool,
        body: Option<Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("X-User-Id", user);
        if admin {
            builder = builder.header("Authorization", format!("Bearer {}", TOKEN));
        }
        match body {
            Some(v) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create(app: &Router, user: &str, parent: Option<&str>, txn: &str) -> Comment {
        let body = json!({
            "parent_comment_id": parent,
            "content": "line 12 is too long",
            "start_position": 3,
            "end_position": 9,
            "txn_id": txn,
        });
        let (status, value) = call(
            app,
            request(Method::POST, "/api/scripts/ep1/comments", user, false, Some(body)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn create_is_idempotent_per_txn_id() {
        let (app, state) = app().await;
        let mut events = state.tx_ingest.subscribe();

        let first = create(&app, "alice", None, "temp-1").await;
        let again = create(&app, "alice", None, "temp-1").await;
        assert_eq!(first.id, again.id);

        let (status, value) = call(
            &app,
            request(Method::GET, "/api/scripts/ep1/comments", "", false, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value.as_array().unwrap().len(), 1);

        match events.recv().await.unwrap() {
            IngestEvent::CommentSaved { comment, .. } => assert_eq!(comment.id, first.id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn anonymous_create_is_forbidden() {
        let (app, _) = app().await;
        let body = json!({ "content": "hi", "start_position": 0, "end_position": 1 });
        let (status, value) = call(
            &app,
            request(Method::POST, "/api/scripts/ep1/comments", "", false, Some(body)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(value["kind"], "permission-denied");
    }

    #[tokio::test]
    async fn invalid_script_id_is_bad_request() {
        let (app, _) = app().await;
        let (status, value) = call(
            &app,
            request(Method::GET, "/api/scripts/bad%20id/comments", "", false, None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["kind"], "invalid");
    }

    #[tokio::test]
    async fn edit_by_someone_else_is_forbidden() {
        let (app, _) = app().await;
        let c = create(&app, "alice", None, "t1").await;
        let uri = format!("/api/comments/{}", c.id);

        let (status, _) = call(
            &app,
            request(Method::PATCH, &uri, "bob", false, Some(json!({ "content": "mine now" }))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, value) = call(
            &app,
            request(Method::PATCH, &uri, "alice", false, Some(json!({ "content": "fixed" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["content"], "fixed");
    }

    #[tokio::test]
    async fn hard_delete_flow_maps_error_kinds() {
        let (app, _) = app().await;
        let parent = create(&app, "alice", None, "t1").await;
        let reply = create(&app, "bob", Some(&parent.id), "t2").await;
        let hard = json!({ "comment_id": parent.id, "reason": "spam" });

        let hard_uri = "/api/rpc/hard_delete_comment_tree";

        // 非管理员
        let (status, value) = call(
            &app,
            request(Method::POST, hard_uri, "alice", false, Some(hard.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let err: CommentError = serde_json::from_value(value).unwrap();
        assert!(matches!(err, CommentError::AuthorizationDenied(_)));

        // 管理员，但还有活跃评论
        let (status, value) = call(
            &app,
            request(Method::POST, hard_uri, "mod", true, Some(hard.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(value["kind"], "precondition-failed");

        // 直接删除有活跃回复的父评论
        let uri = format!("/api/comments/{}", parent.id);
        let (status, value) = call(&app, request(Method::DELETE, &uri, "mod", true, None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(value["kind"], "integrity-violation");

        let soft = json!({ "comment_ids": [parent.id, reply.id] });
        let (status, _) = call(
            &app,
            request(Method::POST, "/api/rpc/cascade_soft_delete", "mod", true, Some(soft)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, value) = call(
            &app,
            request(Method::POST, hard_uri, "mod", true, Some(hard)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let outcome: HardDeleteOutcome = serde_json::from_value(value).unwrap();
        assert_eq!(
            outcome,
            HardDeleteOutcome {
                success: true,
                descendants_deleted: 2
            }
        );

        let audit_uri = format!("/api/admin/audit?root_comment_id={}", parent.id);
        let (status, value) = call(&app, request(Method::GET, &audit_uri, "mod", true, None)).await;
        assert_eq!(status, StatusCode::OK);
        let entries: Vec<HardDeleteAuditLogEntry> = serde_json::from_value(value).unwrap();
        // 两次 RPC 失败 + 一次直接删除失败 + 一次成功
        assert_eq!(entries.len(), 4);
        assert_eq!(entries.last().unwrap().descendant_count, 2);
    }

    #[tokio::test]
    async fn audit_log_requires_admin_token() {
        let (app, _) = app().await;
        let uri = "/api/admin/audit";
        let (status, _) = call(&app, request(Method::GET, uri, "alice", false, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let req = Request::builder()
            .uri("/api/admin/audit")
            .header("Authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        let (status, value) = call(&app, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(value["message"], "invalid admin token");

        let (status, value) = call(&app, request(Method::GET, uri, "", true, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(value.as_array().unwrap().is_empty());
    }
}
