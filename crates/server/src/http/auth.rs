use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use client::USER_HEADER;
use domain::{CommentError, Principal};

use super::error::ApiError;
use crate::state::AppState;

/// 会话由上游网关负责；这里只信任用户头和管理员令牌
pub struct Caller(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));

        match bearer {
            None => Ok(Caller(Principal::member(user_id))),
            Some(token) if token == state.admin_token => {
                let operator = if user_id.is_empty() { "admin".to_string() } else { user_id };
                Ok(Caller(Principal::admin(operator)))
            }
            Some(_) => Err(ApiError(CommentError::AuthorizationDenied(
                "invalid admin token".into(),
            ))),
        }
    }
}
