//! Live text anchors for comments.
//!
//! The editor reports every document mutation with a sequence number; anchors
//! are remapped through it. Offsets are in the editor's character units.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::CommentError;
use crate::models::validate_range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Anchor {
    Range { start: u32, end: u32 },
    /// Whole anchored span was deleted; kept as a point so the comment stays visible.
    Orphaned { at: u32 },
}

impl Anchor {
    pub fn start(&self) -> u32 {
        match *self {
            Anchor::Range { start, .. } => start,
            Anchor::Orphaned { at } => at,
        }
    }

    pub fn is_orphaned(&self) -> bool {
        matches!(self, Anchor::Orphaned { .. })
    }
}

/// `delta > 0` inserts `delta` chars at `offset`; `delta < 0` deletes `-delta` chars from `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMutation {
    pub seq: u64,
    pub offset: u32,
    pub delta: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    anchors: HashMap<String, Anchor>,
    last_seq: Option<u64>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(
        &mut self,
        comment_id: impl Into<String>,
        start: u32,
        end: u32,
    ) -> Result<(), CommentError> {
        validate_range(start, end)?;
        self.anchors
            .insert(comment_id.into(), Anchor::Range { start, end });
        Ok(())
    }

    pub fn untrack(&mut self, comment_id: &str) -> Option<Anchor> {
        self.anchors.remove(comment_id)
    }

    /// Moves an anchor from a temp id to the id the store assigned.
    pub fn rekey(&mut self, from: &str, to: impl Into<String>) -> bool {
        match self.anchors.remove(from) {
            Some(anchor) => {
                self.anchors.insert(to.into(), anchor);
                true
            }
            None => false,
        }
    }

    pub fn get_range(&self, comment_id: &str) -> Option<Anchor> {
        self.anchors.get(comment_id).copied()
    }

    pub fn last_applied_seq(&self) -> Option<u64> {
        self.last_seq
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Anchors sorted by start offset, ties broken by id.
    pub fn ordered(&self) -> Vec<(&str, Anchor)> {
        let mut out: Vec<(&str, Anchor)> = self
            .anchors
            .iter()
            .map(|(id, a)| (id.as_str(), *a))
            .collect();
        out.sort_by(|a, b| a.1.start().cmp(&b.1.start()).then_with(|| a.0.cmp(b.0)));
        out
    }

    /// Returns false when the mutation was already applied (replay).
    pub fn on_document_mutation(&mut self, mutation: DocumentMutation) -> bool {
        if let Some(last) = self.last_seq {
            if mutation.seq <= last {
                debug!("Skipping replayed document mutation seq={}", mutation.seq);
                return false;
            }
        }
        self.last_seq = Some(mutation.seq);

        if mutation.delta == 0 {
            return true;
        }

        for anchor in self.anchors.values_mut() {
            *anchor = remap(*anchor, mutation.offset, mutation.delta);
        }
        true
    }

    pub fn replay(&mut self, log: &[DocumentMutation]) -> usize {
        log.iter()
            .filter(|m| self.on_document_mutation(**m))
            .count()
    }
}

fn remap(anchor: Anchor, offset: u32, delta: i64) -> Anchor {
    let p = u64::from(offset);
    if delta > 0 {
        let n = delta as u64;
        match anchor {
            Anchor::Range { start, end } => {
                let (s, e) = (u64::from(start), u64::from(end));
                if p <= s {
                    Anchor::Range {
                        start: clamp(s + n),
                        end: clamp(e + n),
                    }
                } else if p >= e {
                    anchor
                } else {
                    Anchor::Range {
                        start,
                        end: clamp(e + n),
                    }
                }
            }
            Anchor::Orphaned { at } => {
                let a = u64::from(at);
                Anchor::Orphaned {
                    at: if p <= a { clamp(a + n) } else { at },
                }
            }
        }
    } else {
        let n = delta.unsigned_abs();
        let cut_end = p + n;
        let map = |x: u64| -> u32 {
            if x <= p {
                clamp(x)
            } else if x >= cut_end {
                clamp(x - n)
            } else {
                clamp(p)
            }
        };

        match anchor {
            Anchor::Range { start, end } => {
                let (s, e) = (u64::from(start), u64::from(end));
                if cut_end <= s {
                    Anchor::Range {
                        start: map(s),
                        end: map(e),
                    }
                } else if p >= e {
                    anchor
                } else if p <= s && cut_end >= e {
                    Anchor::Orphaned { at: clamp(p) }
                } else {
                    Anchor::Range {
                        start: map(s),
                        end: map(e),
                    }
                }
            }
            Anchor::Orphaned { at } => Anchor::Orphaned {
                at: map(u64::from(at)),
            },
        }
    }
}

fn clamp(x: u64) -> u32 {
    u32::try_from(x).unwrap_or(u32::MAX)
}
