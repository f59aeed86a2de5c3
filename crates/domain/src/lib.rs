mod error;
mod events;
pub mod governance;
mod models;
pub mod policy;
pub mod position;
pub mod tree;

pub use error::CommentError;
pub use events::IngestEvent;
pub use models::{
    validate_content, validate_range, AuditOutcome, Comment, CommentPatch, CommentRef,
    HardDeleteAuditLogEntry, HardDeleteOutcome, NewComment, OptimisticComment, ScriptId,
    SoftDeleteOutcome, MAX_CONTENT_LEN,
};
pub use policy::{Principal, Role};
