mod drivers;
mod governor;
mod notice;
mod store;
mod sync;
mod traits;

pub use drivers::http::{HttpBackend, USER_HEADER};
pub use drivers::local::LocalBackend;
pub use notice::{SyncNotice, SyncOp};
pub use store::{CommentView, OptimisticStore, StoreSnapshot};
pub use sync::{RetryPolicy, SyncClient};
pub use traits::{CommentBackend, RemoteProcedure};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 把同步通知写进日志，直到取消或通道关闭
pub async fn log_notices(
    mut rx: broadcast::Receiver<SyncNotice>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            msg = rx.recv() => match msg {
                Ok(SyncNotice::Failed { op, target, message, .. }) => {
                    error!("{:?} {} failed: {}", op, target, message);
                }
                Ok(SyncNotice::Retrying { op, target, attempt, delay_ms, .. }) => {
                    warn!("{:?} {} retry #{} in {}ms", op, target, attempt, delay_ms);
                }
                Ok(notice) => info!("{:?}", notice),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Notice log lagged, skipped {} notices", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
