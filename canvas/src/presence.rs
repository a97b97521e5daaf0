//! Live cursors.
//!
//! Presence is ephemeral: it is never persisted and is rebuilt from scratch
//! whenever a board is reloaded. A cursor that has not moved for longer than
//! the staleness window is swept so abandoned tabs fade out.

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::doc::ObjectId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub client_id: ObjectId,
    pub user_id: ObjectId,
    pub name: String,
    pub color: String,
    /// World-space position.
    pub x: f64,
    pub y: f64,
    pub updated_at_ms: i64,
}

/// Cursors of one board keyed by connection.
#[derive(Debug, Clone, Default)]
pub struct PresenceMap {
    cursors: HashMap<ObjectId, Cursor>,
}

impl PresenceMap {
    #[must_use]
    pub fn new() -> Self {
        Self { cursors: HashMap::new() }
    }

    /// Insert or move a cursor. Out-of-order updates (older timestamp than the
    /// stored one) are ignored; returns whether the cursor was applied.
    pub fn upsert(&mut self, cursor: Cursor) -> bool {
        if let Some(existing) = self.cursors.get(&cursor.client_id) {
            if cursor.updated_at_ms < existing.updated_at_ms {
                return false;
            }
        }
        self.cursors.insert(cursor.client_id, cursor);
        true
    }

    pub fn clear(&mut self, client_id: ObjectId) -> Option<Cursor> {
        self.cursors.remove(&client_id)
    }

    /// Drop cursors idle for at least `max_age_ms`; returns their client ids.
    pub fn sweep_stale(&mut self, now_ms: i64, max_age_ms: i64) -> Vec<ObjectId> {
        let stale: Vec<ObjectId> = self
            .cursors
            .values()
            .filter(|c| now_ms.saturating_sub(c.updated_at_ms) >= max_age_ms)
            .map(|c| c.client_id)
            .collect();
        for id in &stale {
            self.cursors.remove(id);
        }
        stale
    }

    #[must_use]
    pub fn get(&self, client_id: &ObjectId) -> Option<&Cursor> {
        self.cursors.get(client_id)
    }

    #[must_use]
    pub fn list(&self) -> Vec<Cursor> {
        self.cursors.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}
