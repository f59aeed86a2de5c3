//! Client side of the deletion pathway.
//!
//! The local preflight is advisory only: the store re-checks every guard inside
//! its own transaction and is the one that writes the audit entry.

use domain::{
    governance::{plan_hard_delete, FailureReason, HardDeletePlan, LifecycleState},
    CommentError, HardDeleteOutcome, Principal,
};
use tracing::{info, warn};

use crate::notice::{SyncNotice, SyncOp};
use crate::sync::SyncClient;
use crate::traits::CommentBackend;

impl<B: CommentBackend> SyncClient<B> {
    pub fn lifecycle_of(&self, comment_id: &str) -> Option<LifecycleState> {
        self.store
            .confirmed(comment_id)
            .map(|c| LifecycleState::of(c.deleted))
    }

    /// Runs the same plan the store will run, against the local view.
    pub fn preflight_hard_delete(
        &self,
        comment_id: &str,
        principal: &Principal,
    ) -> Result<HardDeletePlan, FailureReason> {
        plan_hard_delete(&self.store.snapshot().tree(), comment_id, principal)
    }

    /// Erases a fully soft-deleted tree. Always goes to the store, so that a
    /// refused attempt is audited there too.
    pub async fn hard_delete(
        &self,
        comment_id: &str,
        reason: &str,
    ) -> Result<HardDeleteOutcome, CommentError> {
        let local_ids = self.store.snapshot().tree().subtree_ids(comment_id);

        let result = self
            .with_delete_retry(SyncOp::HardDelete, comment_id, || {
                self.backend.hard_delete_comment_tree(comment_id, reason)
            })
            .await;

        match result {
            Ok(outcome) => {
                let outcome = outcome.unwrap_or(HardDeleteOutcome {
                    success: true,
                    descendants_deleted: 0,
                });
                self.forget(comment_id, &local_ids);
                info!(
                    "Hard-deleted {} ({} rows)",
                    comment_id, outcome.descendants_deleted
                );
                self.notify(SyncNotice::Succeeded {
                    op: SyncOp::HardDelete,
                    target: comment_id.to_string(),
                });
                Ok(outcome)
            }
            Err(e) => {
                warn!("Hard delete of {} refused: {}", comment_id, e);
                self.notify(SyncNotice::failed(SyncOp::HardDelete, comment_id, e.clone()));
                Err(e)
            }
        }
    }

    /// Soft-deletes the whole thread, then erases it.
    pub async fn erase_thread(
        &self,
        comment_id: &str,
        reason: &str,
    ) -> Result<HardDeleteOutcome, CommentError> {
        self.soft_delete(comment_id, true).await?;
        self.hard_delete(comment_id, reason).await
    }

    fn forget(&self, root: &str, local_ids: &[String]) {
        let mut ids = local_ids.to_vec();
        if ids.is_empty() {
            ids.push(root.to_string());
        }
        self.store.remove_confirmed(&ids);
        let mut tracker = self.tracker.lock();
        for id in &ids {
            tracker.untrack(id);
        }
    }
}
