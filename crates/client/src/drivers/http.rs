use async_trait::async_trait;
use domain::{
    Comment, CommentError, CommentPatch, HardDeleteOutcome, NewComment, ScriptId,
    SoftDeleteOutcome,
};
use reqwest::{Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::traits::{CommentBackend, RemoteProcedure};

pub const USER_HEADER: &str = "X-User-Id";

#[derive(Serialize)]
struct CreateCommentRequest<'a> {
    parent_comment_id: Option<&'a str>,
    content: &'a str,
    start_position: u32,
    end_position: u32,
    txn_id: &'a str,
}

/// Talks to the scriptnotes HTTP API.
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
    admin_token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            admin_token: None,
        })
    }

    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let rb = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(USER_HEADER, &self.user_id);
        match &self.admin_token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    async fn send<T: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<T, CommentError> {
        let resp = rb.send().await.map_err(transport_error)?;
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| CommentError::Internal(format!("bad response body: {}", e)));
        }

        let body = resp.bytes().await.map_err(transport_error)?;
        debug!("Request failed with {}: {}", status, String::from_utf8_lossy(&body));
        match serde_json::from_slice::<CommentError>(&body) {
            Ok(e) => Err(e),
            Err(_) if status.is_server_error() => Err(CommentError::NetworkTransient(format!(
                "server returned {}",
                status
            ))),
            Err(_) => Err(CommentError::Internal(format!(
                "unexpected response {}",
                status
            ))),
        }
    }
}

fn transport_error(e: reqwest::Error) -> CommentError {
    if e.is_decode() || e.is_builder() {
        CommentError::Internal(e.to_string())
    } else {
        CommentError::NetworkTransient(e.to_string())
    }
}

#[async_trait]
impl CommentBackend for HttpBackend {
    fn current_user(&self) -> &str {
        &self.user_id
    }

    async fn insert(&self, draft: &NewComment, txn_id: &str) -> Result<Comment, CommentError> {
        let body = CreateCommentRequest {
            parent_comment_id: draft.parent_comment_id.as_deref(),
            content: &draft.content,
            start_position: draft.start_position,
            end_position: draft.end_position,
            txn_id,
        };
        let path = format!("/api/scripts/{}/comments", draft.script_id);
        self.send(self.request(Method::POST, &path).json(&body)).await
    }

    async fn update(&self, id: &str, patch: &CommentPatch) -> Result<Comment, CommentError> {
        let path = format!("/api/comments/{}", id);
        self.send(self.request(Method::PATCH, &path).json(patch)).await
    }

    async fn select_by_script(&self, script_id: &ScriptId) -> Result<Vec<Comment>, CommentError> {
        let path = format!("/api/scripts/{}/comments", script_id);
        self.send(self.request(Method::GET, &path)).await
    }

    async fn cascade_soft_delete(
        &self,
        comment_ids: &[String],
    ) -> Result<SoftDeleteOutcome, CommentError> {
        let call = RemoteProcedure::CascadeSoftDelete {
            comment_ids: comment_ids.to_vec(),
        };
        let path = format!("/api/rpc/{}", call.name());
        self.send(self.request(Method::POST, &path).json(&call)).await
    }

    async fn soft_delete_comment(
        &self,
        comment_id: &str,
    ) -> Result<SoftDeleteOutcome, CommentError> {
        let path = format!("/api/comments/{}/soft_delete", comment_id);
        self.send(self.request(Method::POST, &path)).await
    }

    async fn hard_delete_comment_tree(
        &self,
        comment_id: &str,
        reason: &str,
    ) -> Result<HardDeleteOutcome, CommentError> {
        let call = RemoteProcedure::HardDeleteCommentTree {
            comment_id: comment_id.to_string(),
            reason: reason.to_string(),
        };
        let path = format!("/api/rpc/{}", call.name());
        self.send(self.request(Method::POST, &path).json(&call)).await
    }
}
