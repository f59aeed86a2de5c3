use serde::{Deserialize, Serialize};

/// Machine-checkable error kind shared by the store, the server and the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "kebab-case")]
pub enum CommentError {
    #[error("network error: {0}")]
    NetworkTransient(String),

    #[error("permission denied: {0}")]
    #[serde(rename = "permission-denied")]
    AuthorizationDenied(String),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("temp id already tracked: {0}")]
    DuplicateTempId(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CommentError {
    pub fn kind(&self) -> &'static str {
        match self {
            CommentError::NetworkTransient(_) => "network-transient",
            CommentError::AuthorizationDenied(_) => "permission-denied",
            CommentError::IntegrityViolation(_) => "integrity-violation",
            CommentError::PreconditionFailed(_) => "precondition-failed",
            CommentError::NotFound(_) => "not-found",
            CommentError::Invalid(_) => "invalid",
            CommentError::DuplicateTempId(_) => "duplicate-temp-id",
            CommentError::Internal(_) => "internal",
        }
    }

    /// Only transient failures go back through the backoff loop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommentError::NetworkTransient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CommentError::NotFound(_))
    }

    /// Message meant for the person looking at the toast.
    pub fn user_message(&self) -> String {
        match self {
            CommentError::NetworkTransient(_) => "Connection problem, retrying...".to_string(),
            CommentError::AuthorizationDenied(m) => {
                format!("You are not allowed to do that: {}", m)
            }
            CommentError::IntegrityViolation(m) => format!("Blocked to protect replies: {}", m),
            CommentError::PreconditionFailed(m) => format!("Cannot proceed: {}", m),
            CommentError::NotFound(_) => "That comment no longer exists.".to_string(),
            CommentError::Invalid(m) => m.clone(),
            CommentError::DuplicateTempId(_) | CommentError::Internal(_) => {
                "Something went wrong, please try again.".to_string()
            }
        }
    }
}
