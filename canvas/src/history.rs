//! Per-user undo/redo over a document that other users edit concurrently.
//!
//! Each accepted write records a [`Change`] pair (state before, state after).
//! Undo replays the `before` side and redo the `after` side, but only when
//! every shape an entry touches is still exactly as this user left it: same
//! version, or still absent for deletions. If anyone else wrote one of those
//! shapes in the meantime the entry is discarded with
//! [`HistoryError::Conflict`] rather than clobbering their work, and the next
//! undo moves on to the entry below it.
//!
//! Restored shapes get a version strictly above anything observed so far, so
//! an undo looks like any other forward write to the rest of the board. The
//! restored state is the same state an older entry recorded under its old
//! version, so both stacks are rewritten to expect the new one.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_HISTORY_LIMIT;
use crate::doc::{DocStore, ObjectId, Shape};

/// One shape's transition. `before: None` is a create, `after: None` a delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub before: Option<Shape>,
    pub after: Option<Shape>,
}

impl Change {
    #[must_use]
    pub fn object_id(&self) -> Option<ObjectId> {
        self.after
            .as_ref()
            .or(self.before.as_ref())
            .map(|s| s.id)
    }
}

/// A user action, possibly touching several shapes (e.g. a group move).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub changes: Vec<Change>,
}

impl Entry {
    #[must_use]
    pub fn new(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    #[must_use]
    pub fn single(before: Option<Shape>, after: Option<Shape>) -> Self {
        Self { changes: vec![Change { before, after }] }
    }

    /// Every shape the entry touches.
    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.changes.iter().filter_map(Change::object_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("nothing to {0}")]
    Empty(&'static str),
    #[error("shape {0} was changed by another user")]
    Conflict(ObjectId),
}

#[derive(Debug, Clone)]
pub struct History {
    undo: Vec<Entry>,
    redo: Vec<Entry>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { undo: Vec::new(), redo: Vec::new(), limit: limit.max(1) }
    }

    /// Push a fresh user action. Clears the redo stack; the oldest entry is
    /// dropped past the limit. Empty entries are ignored.
    pub fn record(&mut self, entry: Entry) {
        if entry.changes.is_empty() {
            return;
        }
        self.undo.push(entry);
        self.redo.clear();
        if self.undo.len() > self.limit {
            let excess = self.undo.len() - self.limit;
            self.undo.drain(..excess);
        }
    }

    /// Pop the newest undo entry and compute the changes that revert it.
    /// The caller applies the returned changes to the live document.
    ///
    /// # Errors
    ///
    /// `Empty` when there is nothing to undo; `Conflict` when another writer
    /// touched a target shape (the entry is discarded).
    pub fn undo(&mut self, doc: &DocStore) -> Result<Vec<Change>, HistoryError> {
        let entry = self.undo.pop().ok_or(HistoryError::Empty("undo"))?;
        let (applied, renamed) = revert(&entry, doc)?;
        self.realias(&renamed);
        self.redo.push(Entry::new(applied.clone()));
        Ok(applied)
    }

    /// Pop the newest redo entry and compute the changes that re-apply it.
    ///
    /// # Errors
    ///
    /// Same contract as [`History::undo`].
    pub fn redo(&mut self, doc: &DocStore) -> Result<Vec<Change>, HistoryError> {
        let entry = self.redo.pop().ok_or(HistoryError::Empty("redo"))?;
        let (applied, renamed) = revert(&entry, doc)?;
        self.realias(&renamed);
        self.undo.push(Entry::new(applied.clone()));
        Ok(applied)
    }

    /// Entry the next [`History::undo`] would revert.
    #[must_use]
    pub fn next_undo(&self) -> Option<&Entry> {
        self.undo.last()
    }

    #[must_use]
    pub fn next_redo(&self) -> Option<&Entry> {
        self.redo.last()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Point every recorded `(id, old)` state at its restored version.
    fn realias(&mut self, renamed: &[Renamed]) {
        if renamed.is_empty() {
            return;
        }
        let shapes = self
            .undo
            .iter_mut()
            .chain(self.redo.iter_mut())
            .flat_map(|entry| entry.changes.iter_mut())
            .flat_map(|change| change.before.iter_mut().chain(change.after.iter_mut()));
        for shape in shapes {
            if let Some(r) = renamed.iter().find(|r| r.id == shape.id && r.from == shape.version) {
                shape.version = r.to;
            }
        }
    }
}

/// A recorded shape state that now lives under a new version.
#[derive(Debug, Clone, Copy)]
struct Renamed {
    id: ObjectId,
    from: i64,
    to: i64,
}

fn still_matches(expected: Option<&Shape>, current: Option<&Shape>) -> bool {
    match (expected, current) {
        (None, None) => true,
        (Some(e), Some(c)) => e.version == c.version,
        _ => false,
    }
}

/// Turn an entry's `after -> before` into changes against the current doc,
/// along with the version renames the restored shapes introduce.
fn revert(entry: &Entry, doc: &DocStore) -> Result<(Vec<Change>, Vec<Renamed>), HistoryError> {
    for change in &entry.changes {
        let Some(id) = change.object_id() else {
            continue;
        };
        if !still_matches(change.after.as_ref(), doc.get(&id)) {
            return Err(HistoryError::Conflict(id));
        }
    }

    let mut out = Vec::with_capacity(entry.changes.len());
    let mut renamed = Vec::new();
    for change in entry.changes.iter().rev() {
        let Some(id) = change.object_id() else {
            continue;
        };
        let current = doc.get(&id).cloned();
        let target = change.before.clone().map(|mut shape| {
            let seen = current.as_ref().map_or(shape.version, |c| c.version.max(shape.version));
            let seen = change.after.as_ref().map_or(seen, |a| seen.max(a.version));
            let restored = seen.saturating_add(1);
            renamed.push(Renamed { id, from: shape.version, to: restored });
            shape.version = restored;
            shape
        });
        out.push(Change { before: current, after: target });
    }
    Ok((out, renamed))
}

/// Apply computed changes to a document.
pub fn apply(doc: &mut DocStore, changes: &[Change]) {
    for change in changes {
        match (&change.after, change.object_id()) {
            (Some(shape), _) => doc.insert(shape.clone()),
            (None, Some(id)) => {
                doc.remove(&id);
            }
            (None, None) => {}
        }
    }
}
