//! Per-session optimistic comment state.
//!
//! Every operation takes the lock once and leaves the state fully applied, so
//! a reader calling [`OptimisticStore::snapshot`] never sees half an update.

use chrono::NaiveDateTime;
use domain::{tree::CommentTree, Comment, CommentError, CommentRef, OptimisticComment, ScriptId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub optimistic: HashMap<String, OptimisticComment>,
    pub submitting: HashMap<String, bool>,
    pub replying_to: Option<String>,
    pub editing_comment: Option<String>,
    pub confirmed: HashMap<String, Comment>,
}

/// Row ready for rendering: either a confirmed comment or a pending one.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentView {
    pub reference: CommentRef,
    pub parent_comment_id: Option<String>,
    pub user_id: String,
    pub content: String,
    pub start_position: u32,
    pub end_position: u32,
    pub deleted: bool,
    pub submitting: bool,
    pub created_at: NaiveDateTime,
}

impl StoreSnapshot {
    pub fn tree(&self) -> CommentTree {
        CommentTree::from_comments(self.confirmed.values())
    }

    /// Confirmed comments of `script_id` plus optimistic entries the server
    /// has not handed back yet, oldest first.
    pub fn visible_comments(&self, script_id: &ScriptId) -> Vec<CommentView> {
        let mut out: Vec<CommentView> = self
            .confirmed
            .values()
            .filter(|c| &c.script_id == script_id)
            .map(|c| CommentView {
                reference: CommentRef::Confirmed { id: c.id.clone() },
                parent_comment_id: c.parent_comment_id.clone(),
                user_id: c.user_id.clone(),
                content: c.content.clone(),
                start_position: c.start_position,
                end_position: c.end_position,
                deleted: c.deleted,
                submitting: false,
                created_at: c.created_at,
            })
            .collect();

        for oc in self.optimistic.values() {
            if &oc.script_id != script_id {
                continue;
            }
            if let Some(real) = &oc.real_id {
                if self.confirmed.contains_key(real) {
                    continue;
                }
            }
            out.push(CommentView {
                reference: oc.reference(),
                parent_comment_id: oc.parent_comment_id.clone(),
                user_id: oc.user_id.clone(),
                content: oc.content.clone(),
                start_position: oc.start_position,
                end_position: oc.end_position,
                deleted: oc.deleted,
                submitting: self.submitting.get(&oc.temp_id).copied().unwrap_or(false),
                created_at: oc.created_at,
            });
        }

        out.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.reference.key().cmp(b.reference.key()))
        });
        out
    }
}

#[derive(Default)]
struct StoreState {
    data: StoreSnapshot,
    temp_counter: u64,
}

#[derive(Clone)]
pub struct OptimisticStore {
    inner: Arc<Mutex<StoreState>>,
    session: String,
}

impl Default for OptimisticStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimisticStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreState::default())),
            session: format!("{:08x}", rand::random::<u32>()),
        }
    }

    /// Unique within this session.
    pub fn next_temp_id(&self) -> String {
        let mut state = self.inner.lock();
        state.temp_counter += 1;
        format!("temp-{}-{}", self.session, state.temp_counter)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.inner.lock().data.clone()
    }

    pub fn track_optimistic_comment(
        &self,
        temp_id: &str,
        mut payload: OptimisticComment,
    ) -> Result<(), CommentError> {
        let mut state = self.inner.lock();
        if state.data.optimistic.contains_key(temp_id) {
            return Err(CommentError::DuplicateTempId(temp_id.to_string()));
        }
        payload.temp_id = temp_id.to_string();
        state.data.optimistic.insert(temp_id.to_string(), payload);
        state.data.submitting.insert(temp_id.to_string(), false);
        debug!("Tracking optimistic comment {}", temp_id);
        Ok(())
    }

    /// Late or duplicate confirmations for an untracked id are ignored.
    pub fn resolve_optimistic_comment(&self, temp_id: &str, real_id: &str) -> bool {
        let mut state = self.inner.lock();
        match state.data.optimistic.get_mut(temp_id) {
            Some(entry) => {
                entry.real_id = Some(real_id.to_string());
                true
            }
            None => {
                debug!("Ignoring confirmation for untracked {}", temp_id);
                false
            }
        }
    }

    /// Resolves the entry and records the server row in one step.
    pub fn confirm_optimistic_comment(&self, temp_id: &str, comment: Comment) -> bool {
        let mut state = self.inner.lock();
        let Some(entry) = state.data.optimistic.get_mut(temp_id) else {
            debug!("Suppressing stale confirmation {} -> {}", temp_id, comment.id);
            return false;
        };
        entry.real_id = Some(comment.id.clone());
        state.data.submitting.insert(temp_id.to_string(), false);
        state.data.confirmed.insert(comment.id.clone(), comment);
        true
    }

    pub fn remove_optimistic_comment(&self, temp_id: &str) -> Option<OptimisticComment> {
        let mut state = self.inner.lock();
        state.data.submitting.remove(temp_id);
        state.data.optimistic.remove(temp_id)
    }

    /// No-op for untracked ids so both maps always share a key set.
    pub fn set_submitting_status(&self, temp_id: &str, submitting: bool) -> bool {
        let mut state = self.inner.lock();
        if !state.data.optimistic.contains_key(temp_id) {
            return false;
        }
        state.data.submitting.insert(temp_id.to_string(), submitting);
        true
    }

    pub fn is_submitting(&self, temp_id: &str) -> bool {
        self.inner
            .lock()
            .data
            .submitting
            .get(temp_id)
            .copied()
            .unwrap_or(false)
    }

    pub fn set_replying_to(&self, id: Option<String>) {
        self.inner.lock().data.replying_to = id;
    }

    pub fn replying_to(&self) -> Option<String> {
        self.inner.lock().data.replying_to.clone()
    }

    pub fn set_editing_comment(&self, id: Option<String>) {
        self.inner.lock().data.editing_comment = id;
    }

    pub fn editing_comment(&self) -> Option<String> {
        self.inner.lock().data.editing_comment.clone()
    }

    pub fn confirmed(&self, id: &str) -> Option<Comment> {
        self.inner.lock().data.confirmed.get(id).cloned()
    }

    /// Maps a real or temp id to what the server knows it as.
    pub fn lookup(&self, id: &str) -> Option<CommentRef> {
        let state = self.inner.lock();
        if state.data.confirmed.contains_key(id) {
            return Some(CommentRef::Confirmed { id: id.to_string() });
        }
        state.data.optimistic.get(id).map(|oc| oc.reference())
    }

    /// Stores the server's answer to an edit unless a newer local edit has
    /// already replaced `applied`; in that case only the metadata is taken.
    pub fn reconcile_edit(&self, comment: Comment, applied: &str) -> bool {
        let mut state = self.inner.lock();
        let confirmed = &mut state.data.confirmed;
        if let Some(current) = confirmed.get_mut(&comment.id) {
            if current.content != applied {
                let content = std::mem::take(&mut current.content);
                *current = Comment { content, ..comment };
                return false;
            }
        }
        confirmed.insert(comment.id.clone(), comment);
        true
    }

    pub fn upsert_confirmed(&self, comment: Comment) {
        self.inner
            .lock()
            .data
            .confirmed
            .insert(comment.id.clone(), comment);
    }

    /// Replaces the confirmed view of one script with a fresh server listing.
    /// Returns ids that disappeared server-side.
    pub fn replace_confirmed(&self, script_id: &ScriptId, comments: Vec<Comment>) -> Vec<String> {
        let mut state = self.inner.lock();
        let fresh: HashSet<&str> = comments.iter().map(|c| c.id.as_str()).collect();
        let gone: Vec<String> = state
            .data
            .confirmed
            .values()
            .filter(|c| &c.script_id == script_id && !fresh.contains(c.id.as_str()))
            .map(|c| c.id.clone())
            .collect();
        for id in &gone {
            state.data.confirmed.remove(id);
        }
        for c in comments {
            state.data.confirmed.insert(c.id.clone(), c);
        }
        gone
    }

    /// Drops confirmed rows after a hard delete, plus any optimistic entry
    /// and focus field that still points at them.
    pub fn remove_confirmed(&self, ids: &[String]) {
        let mut state = self.inner.lock();
        let data = &mut state.data;
        for id in ids {
            data.confirmed.remove(id);
        }
        let stale: Vec<String> = data
            .optimistic
            .values()
            .filter(|oc| oc.real_id.as_ref().is_some_and(|r| ids.contains(r)))
            .map(|oc| oc.temp_id.clone())
            .collect();
        for temp in stale {
            data.optimistic.remove(&temp);
            data.submitting.remove(&temp);
        }
        if data.replying_to.as_ref().is_some_and(|r| ids.contains(r)) {
            data.replying_to = None;
        }
        if data.editing_comment.as_ref().is_some_and(|r| ids.contains(r)) {
            data.editing_comment = None;
        }
    }

    /// Applies `content` to the comment known as `id` (real or temp id).
    /// Returns the previous content, or `None` if nothing matched.
    pub fn apply_local_edit(&self, id: &str, content: &str) -> Option<String> {
        let mut state = self.inner.lock();
        let data = &mut state.data;
        let mut previous = None;

        if let Some(c) = data.confirmed.get_mut(id) {
            previous = Some(std::mem::replace(&mut c.content, content.to_string()));
        }
        for oc in data.optimistic.values_mut() {
            if oc.temp_id == id || oc.real_id.as_deref() == Some(id) {
                let old = std::mem::replace(&mut oc.content, content.to_string());
                previous.get_or_insert(old);
            }
        }
        previous
    }

    /// Restores `previous` only where the content is still what this edit
    /// applied, so a newer edit is left alone.
    pub fn rollback_edit(&self, id: &str, applied: &str, previous: &str) -> bool {
        let mut state = self.inner.lock();
        let data = &mut state.data;
        let mut restored = false;

        if let Some(c) = data.confirmed.get_mut(id) {
            if c.content == applied {
                c.content = previous.to_string();
                restored = true;
            }
        }
        for oc in data.optimistic.values_mut() {
            if (oc.temp_id == id || oc.real_id.as_deref() == Some(id)) && oc.content == applied {
                oc.content = previous.to_string();
                restored = true;
            }
        }
        restored
    }

    /// Sets the soft-delete flag on confirmed rows, returning their previous flags.
    pub fn mark_deleted(&self, ids: &[String], deleted: bool) -> Vec<(String, bool)> {
        let mut state = self.inner.lock();
        let data = &mut state.data;
        let mut previous = Vec::new();
        for id in ids {
            if let Some(c) = data.confirmed.get_mut(id) {
                previous.push((id.clone(), c.deleted));
                c.deleted = deleted;
            }
        }
        for oc in data.optimistic.values_mut() {
            if oc.real_id.as_ref().is_some_and(|r| ids.contains(r)) {
                oc.deleted = deleted;
            }
        }
        previous
    }

    pub fn restore_deleted(&self, previous: &[(String, bool)]) {
        let mut state = self.inner.lock();
        let data = &mut state.data;
        for (id, flag) in previous {
            if let Some(c) = data.confirmed.get_mut(id) {
                c.deleted = *flag;
            }
            for oc in data.optimistic.values_mut() {
                if oc.real_id.as_deref() == Some(id.as_str()) {
                    oc.deleted = *flag;
                }
            }
        }
    }
}
