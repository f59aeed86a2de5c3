use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::CommentError;

/// Typed store error rendered as `{ "kind": ..., "message": ... }`.
#[derive(Debug)]
pub struct ApiError(pub CommentError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CommentError::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            CommentError::IntegrityViolation(_) | CommentError::DuplicateTempId(_) => {
                StatusCode::CONFLICT
            }
            CommentError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            CommentError::NotFound(_) => StatusCode::NOT_FOUND,
            CommentError::Invalid(_) => StatusCode::BAD_REQUEST,
            CommentError::NetworkTransient(_) => StatusCode::SERVICE_UNAVAILABLE,
            CommentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CommentError> for ApiError {
    fn from(e: CommentError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }
        (status, Json(self.0)).into_response()
    }
}
