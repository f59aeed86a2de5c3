use chrono::Utc;
use domain::{
    position::{Anchor, DocumentMutation, PositionTracker},
    validate_content, Comment, CommentError, CommentPatch, CommentRef, NewComment,
    OptimisticComment, ScriptId, SoftDeleteOutcome,
};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::notice::{SyncNotice, SyncOp};
use crate::store::OptimisticStore;
use crate::traits::CommentBackend;

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total tries including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 200,
            max_delay_ms: 5000,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-indexed), without jitter.
    pub fn backoff(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// 加最多 10% 的随机抖动，避免多个客户端同时重试
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let base = self.backoff(attempt);
        let jitter = if base >= 10 {
            rand::thread_rng().gen_range(0..=base / 10)
        } else {
            0
        };
        base + jitter
    }
}

/// Drives the optimistic store against a backend.
pub struct SyncClient<B: CommentBackend> {
    pub(crate) backend: Arc<B>,
    pub(crate) store: OptimisticStore,
    pub(crate) tracker: Arc<Mutex<PositionTracker>>,
    pub(crate) retry: RetryPolicy,
    notices: broadcast::Sender<SyncNotice>,
    cancel: CancellationToken,
}

impl<B: CommentBackend> Clone for SyncClient<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            store: self.store.clone(),
            tracker: self.tracker.clone(),
            retry: self.retry.clone(),
            notices: self.notices.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<B: CommentBackend> SyncClient<B> {
    pub fn new(backend: B, retry: RetryPolicy) -> Self {
        let (notices, _) = broadcast::channel(100);
        Self {
            backend: Arc::new(backend),
            store: OptimisticStore::new(),
            tracker: Arc::new(Mutex::new(PositionTracker::new())),
            retry,
            notices,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &OptimisticStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    pub(crate) fn notify(&self, notice: SyncNotice) {
        // 没有订阅者时忽略
        let _ = self.notices.send(notice);
    }

    pub fn on_document_mutation(&self, mutation: DocumentMutation) -> bool {
        self.tracker.lock().on_document_mutation(mutation)
    }

    /// Accepts a real id, or a temp id whether or not it has been confirmed.
    pub fn get_range(&self, comment_id: &str) -> Option<Anchor> {
        let tracker = self.tracker.lock();
        if let Some(anchor) = tracker.get_range(comment_id) {
            return Some(anchor);
        }
        match self.store.lookup(comment_id) {
            Some(CommentRef::Confirmed { id }) => tracker.get_range(&id),
            _ => None,
        }
    }

    /// Pulls the server listing for one script and re-anchors new comments.
    pub async fn refresh(&self, script_id: &ScriptId) -> Result<Vec<Comment>, CommentError> {
        let comments = match self
            .with_retry(SyncOp::Refresh, script_id.as_str(), || {
                self.backend.select_by_script(script_id)
            })
            .await
        {
            Ok(c) => c,
            Err(e) => {
                error!("Refresh of {} failed: {}", script_id, e);
                self.notify(SyncNotice::failed(SyncOp::Refresh, script_id.as_str(), e.clone()));
                return Err(e);
            }
        };

        let gone = self.store.replace_confirmed(script_id, comments.clone());
        {
            let mut tracker = self.tracker.lock();
            for id in &gone {
                tracker.untrack(id);
            }
            for c in &comments {
                if tracker.get_range(&c.id).is_none() {
                    tracker.track(c.id.clone(), c.start_position, c.end_position)?;
                }
            }
        }
        debug!("Refreshed {}: {} comments, {} gone", script_id, comments.len(), gone.len());
        Ok(comments)
    }

    pub async fn create_comment(&self, draft: NewComment) -> Result<Comment, CommentError> {
        self.submit(SyncOp::Create, draft).await
    }

    pub async fn reply(
        &self,
        parent_id: &str,
        mut draft: NewComment,
    ) -> Result<Comment, CommentError> {
        let parent = match self.store.lookup(parent_id) {
            Some(CommentRef::Confirmed { id }) => id,
            Some(CommentRef::Pending { temp_id }) => {
                let e = CommentError::PreconditionFailed(format!(
                    "comment {} is still being saved",
                    temp_id
                ));
                self.notify(SyncNotice::failed(SyncOp::Reply, parent_id, e.clone()));
                return Err(e);
            }
            None => parent_id.to_string(),
        };
        draft.parent_comment_id = Some(parent.clone());

        let result = self.submit(SyncOp::Reply, draft).await;
        if result.is_ok() && self.store.replying_to().as_deref() == Some(parent.as_str()) {
            self.store.set_replying_to(None);
        }
        result
    }

    async fn submit(&self, op: SyncOp, draft: NewComment) -> Result<Comment, CommentError> {
        if let Err(e) = draft.validate() {
            self.notify(SyncNotice::failed(op, draft.script_id.as_str(), e.clone()));
            return Err(e);
        }

        let temp_id = self.store.next_temp_id();
        let pending = OptimisticComment::pending(
            temp_id.as_str(),
            self.backend.current_user(),
            &draft,
            Utc::now().naive_utc(),
        );
        self.store.track_optimistic_comment(&temp_id, pending)?;
        self.tracker
            .lock()
            .track(temp_id.clone(), draft.start_position, draft.end_position)?;
        self.store.set_submitting_status(&temp_id, true);

        let result = self
            .with_retry(op, &temp_id, || self.backend.insert(&draft, &temp_id))
            .await;

        match result {
            Ok(comment) => {
                if self.store.confirm_optimistic_comment(&temp_id, comment.clone()) {
                    self.tracker.lock().rekey(&temp_id, comment.id.clone());
                    info!("Comment {} confirmed as {}", temp_id, comment.id);
                    self.notify(SyncNotice::Succeeded {
                        op,
                        target: comment.id.clone(),
                    });
                } else {
                    debug!("Pending {} was discarded before confirmation", temp_id);
                    self.notify(SyncNotice::StaleConfirmation {
                        temp_id: temp_id.clone(),
                        real_id: comment.id.clone(),
                    });
                }
                Ok(comment)
            }
            Err(e) => {
                self.store.remove_optimistic_comment(&temp_id);
                self.tracker.lock().untrack(&temp_id);
                error!("Giving up on {}: {}", temp_id, e);
                self.notify(SyncNotice::failed(op, temp_id, e.clone()));
                Err(e)
            }
        }
    }

    /// Cancels a pending comment locally; a late confirmation is then ignored.
    pub fn discard_pending(&self, temp_id: &str) -> bool {
        let removed = self.store.remove_optimistic_comment(temp_id).is_some();
        if removed {
            self.tracker.lock().untrack(temp_id);
            debug!("Discarded pending {}", temp_id);
        }
        removed
    }

    /// Drops the optimistic entry once the confirmed row has taken over.
    pub fn dismiss_confirmed(&self, temp_id: &str) -> bool {
        match self.store.lookup(temp_id) {
            Some(CommentRef::Confirmed { id }) if id != temp_id => {
                self.store.remove_optimistic_comment(temp_id).is_some()
            }
            _ => false,
        }
    }

    pub async fn edit_comment(&self, id: &str, content: &str) -> Result<Comment, CommentError> {
        let target = match self.store.lookup(id) {
            Some(CommentRef::Confirmed { id }) => id,
            Some(CommentRef::Pending { temp_id }) => {
                let e = CommentError::PreconditionFailed(format!(
                    "comment {} is still being saved",
                    temp_id
                ));
                self.notify(SyncNotice::failed(SyncOp::Edit, id, e.clone()));
                return Err(e);
            }
            None => {
                let e = CommentError::NotFound(id.to_string());
                self.notify(SyncNotice::failed(SyncOp::Edit, id, e.clone()));
                return Err(e);
            }
        };
        if let Err(e) = validate_content(content) {
            self.notify(SyncNotice::failed(SyncOp::Edit, target.as_str(), e.clone()));
            return Err(e);
        }

        let previous = self.store.apply_local_edit(&target, content).unwrap_or_default();
        let patch = CommentPatch::content(content);

        match self
            .with_retry(SyncOp::Edit, &target, || self.backend.update(&target, &patch))
            .await
        {
            Ok(comment) => {
                if !self.store.reconcile_edit(comment.clone(), content) {
                    debug!("Newer local edit on {} kept over server echo", target);
                }
                if self.store.editing_comment().as_deref() == Some(target.as_str()) {
                    self.store.set_editing_comment(None);
                }
                self.notify(SyncNotice::Succeeded {
                    op: SyncOp::Edit,
                    target,
                });
                Ok(comment)
            }
            Err(e) => {
                if !self.store.rollback_edit(&target, content, &previous) {
                    debug!("Skipped rollback on {}: content changed since", target);
                }
                error!("Edit of {} failed: {}", target, e);
                self.notify(SyncNotice::failed(SyncOp::Edit, target, e.clone()));
                Err(e)
            }
        }
    }

    /// Marks the comment (and with `cascade` its whole subtree) deleted locally,
    /// then asks the store to do the same in one transaction. A cascade is
    /// expanded again by the store, so replies this session has not loaded yet
    /// are deleted too; every id the store reports is then flagged locally.
    pub async fn soft_delete(
        &self,
        id: &str,
        cascade: bool,
    ) -> Result<SoftDeleteOutcome, CommentError> {
        let ids = if cascade {
            self.store.snapshot().tree().subtree_ids(id)
        } else {
            Vec::new()
        };
        let ids = if ids.is_empty() { vec![id.to_string()] } else { ids };

        let previous = self.store.mark_deleted(&ids, true);
        let roots = [id.to_string()];
        let result = self
            .with_delete_retry(SyncOp::SoftDelete, id, || {
                if cascade {
                    self.backend.cascade_soft_delete(&roots)
                } else {
                    self.backend.soft_delete_comment(id)
                }
            })
            .await;
        match result {
            Ok(outcome) => {
                let outcome = outcome.unwrap_or_default();
                self.store.mark_deleted(&outcome.marked, true);
                info!("Soft-deleted {} ({} newly marked)", id, outcome.marked.len());
                self.notify(SyncNotice::Succeeded {
                    op: SyncOp::SoftDelete,
                    target: id.to_string(),
                });
                Ok(outcome)
            }
            Err(e) => {
                self.store.restore_deleted(&previous);
                error!("Soft delete of {} failed: {}", id, e);
                self.notify(SyncNotice::failed(SyncOp::SoftDelete, id, e.clone()));
                Err(e)
            }
        }
    }

    pub(crate) async fn with_retry<T, F, Fut>(
        &self,
        op: SyncOp,
        target: &str,
        call: F,
    ) -> Result<T, CommentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CommentError>>,
    {
        self.run_with_retry(op, target, call)
            .await
            .map_err(|(e, _)| e)
    }

    /// `Ok(None)` when a retried delete finds the row already gone: an
    /// earlier attempt landed even though its response was lost.
    pub(crate) async fn with_delete_retry<T, F, Fut>(
        &self,
        op: SyncOp,
        target: &str,
        call: F,
    ) -> Result<Option<T>, CommentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CommentError>>,
    {
        match self.run_with_retry(op, target, call).await {
            Ok(v) => Ok(Some(v)),
            Err((e, attempts)) if e.is_not_found() && attempts > 1 => {
                debug!("{:?} {} already applied by an earlier attempt", op, target);
                Ok(None)
            }
            Err((e, _)) => Err(e),
        }
    }

    async fn run_with_retry<T, F, Fut>(
        &self,
        op: SyncOp,
        target: &str,
        mut call: F,
    ) -> Result<T, (CommentError, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CommentError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match call().await {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            if !err.is_retryable() || attempt >= self.retry.max_attempts {
                return Err((err, attempt));
            }

            let delay_ms = self.retry.delay_for_attempt(attempt);
            warn!(
                "{:?} {} failed (attempt {}/{}): {}; retrying in {}ms",
                op, target, attempt, self.retry.max_attempts, err, delay_ms
            );
            self.notify(SyncNotice::Retrying {
                op,
                target: target.to_string(),
                attempt,
                delay_ms,
                error: err.clone(),
            });

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err((
                        CommentError::NetworkTransient(format!("sync cancelled: {}", err)),
                        attempt,
                    ));
                }
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::drivers::local::LocalBackend;
    use async_trait::async_trait;
    use domain::{HardDeleteOutcome, Principal};
    use std::sync::atomic::{AtomicU32, Ordering};
    use storage::Db;

    pub(crate) fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    pub(crate) fn draft(content: &str) -> NewComment {
        NewComment {
            script_id: ScriptId::new_unchecked("s1".into()),
            parent_comment_id: None,
            content: content.into(),
            start_position: 10,
            end_position: 20,
        }
    }

    pub(crate) async fn local(principal: Principal) -> LocalBackend {
        let db = Db::new("sqlite::memory:").await.unwrap();
        LocalBackend::new(db, principal)
    }

    /// Fails the first `fail_first` calls of every kind with a transient error.
    pub(crate) struct Flaky {
        pub inner: LocalBackend,
        pub fail_first: u32,
        pub calls: AtomicU32,
        pub error: CommentError,
    }

    impl Flaky {
        pub fn new(inner: LocalBackend, fail_first: u32) -> Self {
            Self {
                inner,
                fail_first,
                calls: AtomicU32::new(0),
                error: CommentError::NetworkTransient("connection reset".into()),
            }
        }

        fn trip(&self) -> Result<(), CommentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CommentBackend for Flaky {
        fn current_user(&self) -> &str {
            self.inner.current_user()
        }

        async fn insert(&self, draft: &NewComment, txn_id: &str) -> Result<Comment, CommentError> {
            self.trip()?;
            self.inner.insert(draft, txn_id).await
        }

        async fn update(&self, id: &str, patch: &CommentPatch) -> Result<Comment, CommentError> {
            self.trip()?;
            self.inner.update(id, patch).await
        }

        async fn select_by_script(
            &self,
            script_id: &ScriptId,
        ) -> Result<Vec<Comment>, CommentError> {
            self.trip()?;
            self.inner.select_by_script(script_id).await
        }

        async fn cascade_soft_delete(
            &self,
            comment_ids: &[String],
        ) -> Result<SoftDeleteOutcome, CommentError> {
            self.trip()?;
            self.inner.cascade_soft_delete(comment_ids).await
        }

        async fn soft_delete_comment(
            &self,
            comment_id: &str,
        ) -> Result<SoftDeleteOutcome, CommentError> {
            self.trip()?;
            self.inner.soft_delete_comment(comment_id).await
        }

        async fn hard_delete_comment_tree(
            &self,
            comment_id: &str,
            reason: &str,
        ) -> Result<HardDeleteOutcome, CommentError> {
            self.trip()?;
            self.inner.hard_delete_comment_tree(comment_id, reason).await
        }
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let p = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1000,
        };
        assert_eq!(p.backoff(0), 0);
        assert_eq!(p.backoff(1), 100);
        assert_eq!(p.backoff(2), 200);
        assert_eq!(p.backoff(3), 400);
        assert_eq!(p.backoff(5), 1000);
        assert_eq!(p.backoff(80), 1000);

        let d = p.delay_for_attempt(2);
        assert!((200..=220).contains(&d));
    }

    #[tokio::test]
    async fn create_confirms_and_rekeys_anchor() {
        let client = SyncClient::new(local(Principal::member("alice")).await, fast_retry());
        let mut notices = client.subscribe();

        let comment = client.create_comment(draft("first")).await.unwrap();
        let snap = client.store().snapshot();
        assert_eq!(snap.optimistic.len(), 1);
        let (temp_id, entry) = snap.optimistic.iter().next().unwrap();
        assert_eq!(entry.real_id.as_deref(), Some(comment.id.as_str()));
        assert!(!snap.submitting[temp_id]);
        assert!(snap.confirmed.contains_key(&comment.id));

        assert_eq!(
            client.get_range(&comment.id),
            Some(Anchor::Range { start: 10, end: 20 })
        );
        assert_eq!(client.get_range(temp_id), client.get_range(&comment.id));

        assert!(client.dismiss_confirmed(temp_id));
        assert!(client.store().snapshot().optimistic.is_empty());

        match notices.recv().await.unwrap() {
            SyncNotice::Succeeded { op, target } => {
                assert_eq!(op, SyncOp::Create);
                assert_eq!(target, comment.id);
            }
            other => panic!("unexpected notice {:?}", other),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_without_duplicates() {
        let backend = Flaky::new(local(Principal::member("alice")).await, 2);
        let client = SyncClient::new(backend, fast_retry());

        let comment = client.create_comment(draft("retry me")).await.unwrap();
        assert_eq!(client.backend().calls.load(Ordering::SeqCst), 3);

        let rows = client
            .backend()
            .inner
            .select_by_script(&comment.script_id)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_remove_the_pending_entry() {
        let backend = Flaky::new(local(Principal::member("alice")).await, 10);
        let client = SyncClient::new(backend, fast_retry());
        let mut notices = client.subscribe();

        let err = client.create_comment(draft("doomed")).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(client.backend().calls.load(Ordering::SeqCst), 3);

        let snap = client.store().snapshot();
        assert!(snap.optimistic.is_empty());
        assert!(snap.submitting.is_empty());

        let mut failed = false;
        while let Ok(n) = notices.try_recv() {
            failed |= n.is_failure();
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn authorization_failures_are_not_retried() {
        let mut backend = Flaky::new(local(Principal::member("alice")).await, 1);
        backend.error = CommentError::AuthorizationDenied("nope".into());
        let client = SyncClient::new(backend, fast_retry());

        let err = client.create_comment(draft("x")).await.unwrap_err();
        assert!(matches!(err, CommentError::AuthorizationDenied(_)));
        assert_eq!(client.backend().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_backoff() {
        let backend = Flaky::new(local(Principal::member("alice")).await, 10);
        let cancel = CancellationToken::new();
        let retry = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 60_000,
            max_delay_ms: 60_000,
        };
        let client = SyncClient::new(backend, retry).with_cancel_token(cancel.clone());
        cancel.cancel();

        let err = client.create_comment(draft("x")).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert_eq!(client.backend().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_edit_rolls_back() {
        let backend = Flaky::new(local(Principal::member("alice")).await, 0);
        let client = SyncClient::new(backend, fast_retry());
        let comment = client.create_comment(draft("original")).await.unwrap();

        // 之后的调用全部失败
        client.backend().calls.store(0, Ordering::SeqCst);
        let failing = SyncClient {
            backend: Arc::new(Flaky::new(client.backend().inner.clone(), 10)),
            store: client.store.clone(),
            tracker: client.tracker.clone(),
            retry: fast_retry(),
            notices: client.notices.clone(),
            cancel: CancellationToken::new(),
        };

        failing.edit_comment(&comment.id, "changed").await.unwrap_err();
        assert_eq!(client.store().confirmed(&comment.id).unwrap().content, "original");

        let updated = client.edit_comment(&comment.id, "changed").await.unwrap();
        assert_eq!(updated.content, "changed");
        assert_eq!(client.store().confirmed(&comment.id).unwrap().content, "changed");
    }

    #[tokio::test]
    async fn edit_of_unknown_comment_is_not_found() {
        let client = SyncClient::new(local(Principal::member("alice")).await, fast_retry());
        let err = client.edit_comment("ghost", "x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn cascade_soft_delete_marks_subtree() {
        let client = SyncClient::new(local(Principal::member("alice")).await, fast_retry());
        let parent = client.create_comment(draft("parent")).await.unwrap();
        let reply = client.reply(&parent.id, draft("reply")).await.unwrap();
        assert_eq!(reply.parent_comment_id.as_deref(), Some(parent.id.as_str()));

        let outcome = client.soft_delete(&parent.id, true).await.unwrap();
        assert_eq!(outcome.marked.len(), 2);
        assert!(client.store().confirmed(&parent.id).unwrap().deleted);
        assert!(client.store().confirmed(&reply.id).unwrap().deleted);
    }

    #[tokio::test]
    async fn cascade_reaches_replies_from_another_session() {
        let db = Db::new("sqlite::memory:").await.unwrap();
        let moderator = SyncClient::new(
            LocalBackend::new(db.clone(), Principal::admin("moderator")),
            fast_retry(),
        );
        let bob = SyncClient::new(
            LocalBackend::new(db.clone(), Principal::member("bob")),
            fast_retry(),
        );

        let parent = moderator.create_comment(draft("parent")).await.unwrap();
        bob.refresh(&parent.script_id).await.unwrap();
        let reply = bob.reply(&parent.id, draft("late reply")).await.unwrap();

        // moderator never refreshed, so its local tree has no reply
        assert!(moderator.store().lookup(&reply.id).is_none());
        let outcome = moderator.soft_delete(&parent.id, true).await.unwrap();
        assert!(outcome.marked.contains(&reply.id));

        let stored = db.get_comment(&reply.id).await.unwrap().unwrap();
        assert!(stored.deleted);
        assert!(bob.store().confirmed(&reply.id).is_some_and(|c| !c.deleted));
    }

    #[tokio::test]
    async fn single_soft_delete_keeps_replies_live() {
        let client = SyncClient::new(local(Principal::admin("root")).await, fast_retry());
        let parent = client.create_comment(draft("parent")).await.unwrap();
        let reply = client.reply(&parent.id, draft("reply")).await.unwrap();

        let outcome = client.soft_delete(&parent.id, false).await.unwrap();
        assert_eq!(outcome.marked, vec![parent.id.clone()]);
        assert!(client.store().confirmed(&parent.id).unwrap().deleted);
        assert!(!client.store().confirmed(&reply.id).unwrap().deleted);
    }

    #[tokio::test]
    async fn refused_soft_delete_restores_flags() {
        let db = Db::new("sqlite::memory:").await.unwrap();
        let alice = SyncClient::new(
            LocalBackend::new(db.clone(), Principal::member("alice")),
            fast_retry(),
        );
        let bob = SyncClient::new(LocalBackend::new(db, Principal::member("bob")), fast_retry());

        let parent = alice.create_comment(draft("parent")).await.unwrap();
        bob.refresh(&parent.script_id).await.unwrap();

        let err = bob.soft_delete(&parent.id, false).await.unwrap_err();
        assert!(matches!(err, CommentError::AuthorizationDenied(_)));
        assert!(!bob.store().confirmed(&parent.id).unwrap().deleted);
    }

    #[tokio::test]
    async fn discarded_pending_suppresses_late_confirmation() {
        let client = SyncClient::new(local(Principal::member("alice")).await, fast_retry());
        let temp = client.store().next_temp_id();
        let pending = OptimisticComment::pending(
            temp.as_str(),
            "alice",
            &draft("x"),
            Utc::now().naive_utc(),
        );
        client.store().track_optimistic_comment(&temp, pending).unwrap();
        assert!(client.discard_pending(&temp));

        let late = client.backend().insert(&draft("x"), &temp).await.unwrap();
        assert!(!client.store().confirm_optimistic_comment(&temp, late));
        let snap = client.store().snapshot();
        assert!(snap.optimistic.is_empty());
        assert!(snap.confirmed.is_empty());
    }

    #[tokio::test]
    async fn refresh_tracks_new_comments_and_drops_gone_ones() {
        let db = Db::new("sqlite::memory:").await.unwrap();
        let alice = SyncClient::new(
            LocalBackend::new(db.clone(), Principal::member("alice")),
            fast_retry(),
        );
        let bob = SyncClient::new(LocalBackend::new(db, Principal::member("bob")), fast_retry());

        let c = alice.create_comment(draft("hello")).await.unwrap();
        let listed = bob.refresh(&c.script_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(bob.get_range(&c.id), Some(Anchor::Range { start: 10, end: 20 }));

        bob.on_document_mutation(DocumentMutation {
            seq: 1,
            offset: 0,
            delta: 5,
        });
        assert_eq!(bob.get_range(&c.id), Some(Anchor::Range { start: 15, end: 25 }));

        // 再次刷新不会覆盖已移动的锚点
        bob.refresh(&c.script_id).await.unwrap();
        assert_eq!(bob.get_range(&c.id), Some(Anchor::Range { start: 15, end: 25 }));
    }
}
