//! Optimistic client state merged with remote updates.
//!
//! A client keeps two layers:
//!
//! - `confirmed`: shapes exactly as the server last reported them.
//! - `pending`: local operations sent to the server but not yet acknowledged.
//!
//! What the user sees is [`SyncDoc::view`], the confirmed layer with every
//! pending operation replayed on top in send order. Local edits therefore
//! appear instantly and survive remote broadcasts that arrive before the ack.
//! An ack moves the server's authoritative result into `confirmed`; a
//! rejection simply drops the pending op, which rolls the edit back in the
//! next view.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use serde::{Deserialize, Serialize};

use crate::doc::{DocStore, ObjectId, PartialShape, Shape, apply_partial_to};

/// A local edit awaiting the server's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LocalOp {
    Create(Shape),
    Update { id: ObjectId, partial: PartialShape },
    Delete { id: ObjectId },
}

impl LocalOp {
    #[must_use]
    pub fn target(&self) -> ObjectId {
        match self {
            Self::Create(shape) => shape.id,
            Self::Update { id, .. } | Self::Delete { id } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOp {
    /// Id of the request frame that carried the op; echoed as `parent_id`.
    pub request_id: ObjectId,
    pub op: LocalOp,
}

#[derive(Debug, Clone, Default)]
pub struct SyncDoc {
    confirmed: DocStore,
    pending: Vec<PendingOp>,
}

impl SyncDoc {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace confirmed state with a join snapshot. Pending ops are dropped:
    /// their requests belonged to the previous session.
    pub fn load_snapshot(&mut self, shapes: Vec<Shape>) {
        self.confirmed.load_snapshot(shapes);
        self.pending.clear();
    }

    pub fn apply_local(&mut self, request_id: ObjectId, op: LocalOp) {
        self.pending.push(PendingOp { request_id, op });
    }

    /// Server accepted `request_id`. `result` is the authoritative shape it
    /// returned, or `None` for a delete.
    pub fn ack(&mut self, request_id: ObjectId, result: Option<Shape>) -> bool {
        let Some(pos) = self.pending.iter().position(|p| p.request_id == request_id) else {
            return false;
        };
        let pending = self.pending.remove(pos);
        match result {
            Some(shape) => self.merge_confirmed(shape),
            None => {
                self.confirmed.remove(&pending.op.target());
            }
        }
        true
    }

    /// Server refused `request_id` (lock held, stale version...). The edit
    /// vanishes from the view.
    pub fn reject(&mut self, request_id: ObjectId) -> Option<PendingOp> {
        let pos = self.pending.iter().position(|p| p.request_id == request_id)?;
        Some(self.pending.remove(pos))
    }

    /// A peer created or changed a shape. Older versions than what we hold
    /// are ignored.
    pub fn apply_remote_upsert(&mut self, shape: Shape) {
        self.merge_confirmed(shape);
    }

    /// A peer's sparse update. Applied only if `version` is newer than ours.
    pub fn apply_remote_update(&mut self, id: ObjectId, partial: &PartialShape) -> bool {
        let Some(current) = self.confirmed.get(&id) else {
            return false;
        };
        if partial.version.is_some_and(|v| v < current.version) {
            return false;
        }
        self.confirmed.apply_partial(&id, partial)
    }

    /// A peer deleted a shape. Our pending edits to it can never succeed.
    pub fn apply_remote_delete(&mut self, id: ObjectId) {
        self.confirmed.remove(&id);
        self.pending.retain(|p| p.op.target() != id);
    }

    fn merge_confirmed(&mut self, shape: Shape) {
        let newer = self
            .confirmed
            .get(&shape.id)
            .is_none_or(|current| shape.version >= current.version);
        if newer {
            self.confirmed.insert(shape);
        }
    }

    /// Confirmed state with pending ops replayed on top.
    #[must_use]
    pub fn view(&self) -> DocStore {
        let mut view = self.confirmed.clone();
        for pending in &self.pending {
            match &pending.op {
                LocalOp::Create(shape) => view.insert(shape.clone()),
                LocalOp::Update { id, partial } => {
                    view.apply_partial(id, partial);
                }
                LocalOp::Delete { id } => {
                    view.remove(id);
                }
            }
        }
        view
    }

    /// Visible state of a single shape.
    #[must_use]
    pub fn view_of(&self, id: ObjectId) -> Option<Shape> {
        let mut shape = self.confirmed.get(&id).cloned();
        for pending in self.pending.iter().filter(|p| p.op.target() == id) {
            match &pending.op {
                LocalOp::Create(created) => shape = Some(created.clone()),
                LocalOp::Update { partial, .. } => {
                    if let Some(s) = shape.as_mut() {
                        apply_partial_to(s, partial);
                    }
                }
                LocalOp::Delete { .. } => shape = None,
            }
        }
        shape
    }

    #[must_use]
    pub fn confirmed(&self) -> &DocStore {
        &self.confirmed
    }

    #[must_use]
    pub fn pending(&self) -> &[PendingOp] {
        &self.pending
    }

    #[must_use]
    pub fn has_pending(&self, id: ObjectId) -> bool {
        self.pending.iter().any(|p| p.op.target() == id)
    }
}
