use domain::CommentError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOp {
    Create,
    Reply,
    Edit,
    SoftDelete,
    HardDelete,
    Refresh,
}

/// 发往 UI 的同步结果通知
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SyncNotice {
    Succeeded {
        op: SyncOp,
        target: String,
    },
    Retrying {
        op: SyncOp,
        target: String,
        attempt: u32,
        delay_ms: u64,
        error: CommentError,
    },
    Failed {
        op: SyncOp,
        target: String,
        error: CommentError,
        message: String,
    },
    /// 确认到达时 pending 条目已被丢弃
    StaleConfirmation { temp_id: String, real_id: String },
}

impl SyncNotice {
    pub fn failed(op: SyncOp, target: impl Into<String>, error: CommentError) -> Self {
        let message = error.user_message();
        SyncNotice::Failed {
            op,
            target: target.into(),
            error,
            message,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncNotice::Failed { .. })
    }
}
