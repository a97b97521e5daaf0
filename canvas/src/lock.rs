//! Per-shape exclusive locks.
//!
//! A lock names the connection that currently has interactive control of a
//! shape (dragging, resizing, editing text). Locks expire after a TTL unless
//! renewed, so a crashed client cannot hold a shape forever, and every lock a
//! connection holds is dropped when it disconnects.
//!
//! Ownership is per connection (`client_id`), not per user: the same user in
//! two tabs cannot drag one shape from both at once.

#[cfg(test)]
#[path = "lock_test.rs"]
mod lock_test;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::doc::ObjectId;

/// Who is asking for a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub client_id: ObjectId,
    pub user_id: ObjectId,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub object_id: ObjectId,
    pub client_id: ObjectId,
    pub user_id: ObjectId,
    pub user_name: String,
    pub acquired_at_ms: i64,
    pub expires_at_ms: i64,
}

impl Lock {
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }

    #[must_use]
    pub fn held_by(&self, client_id: ObjectId) -> bool {
        self.client_id == client_id
    }
}

/// First live lock that blocked an acquisition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("shape {} is locked by {}", .lock.object_id, .lock.user_name)]
pub struct LockConflict {
    pub lock: Lock,
}

/// Locks of one board keyed by shape id.
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    locks: HashMap<ObjectId, Lock>,
}

impl LockTable {
    #[must_use]
    pub fn new() -> Self {
        Self { locks: HashMap::new() }
    }

    /// Lock every id for `holder`, or none of them.
    ///
    /// Re-acquiring a lock the holder already owns refreshes its expiry.
    /// Expired locks owned by someone else are taken over.
    ///
    /// # Errors
    ///
    /// Returns the first live foreign lock found.
    pub fn try_acquire(
        &mut self,
        ids: &[ObjectId],
        holder: &LockHolder,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<Vec<Lock>, LockConflict> {
        for id in ids {
            if let Some(existing) = self.locks.get(id) {
                if !existing.held_by(holder.client_id) && !existing.is_expired(now_ms) {
                    return Err(LockConflict { lock: existing.clone() });
                }
            }
        }

        let mut granted = Vec::with_capacity(ids.len());
        for id in ids {
            let acquired_at_ms = match self.locks.get(id) {
                Some(existing) if existing.held_by(holder.client_id) && !existing.is_expired(now_ms) => {
                    existing.acquired_at_ms
                }
                _ => now_ms,
            };
            let lock = Lock {
                object_id: *id,
                client_id: holder.client_id,
                user_id: holder.user_id,
                user_name: holder.user_name.clone(),
                acquired_at_ms,
                expires_at_ms: now_ms.saturating_add(ttl_ms),
            };
            self.locks.insert(*id, lock.clone());
            granted.push(lock);
        }
        Ok(granted)
    }

    /// Extend the holder's live locks on `ids`. Returns the renewed locks;
    /// ids not held by the client are skipped.
    pub fn renew(&mut self, ids: &[ObjectId], client_id: ObjectId, now_ms: i64, ttl_ms: i64) -> Vec<Lock> {
        ids.iter()
            .filter_map(|id| {
                let lock = self.locks.get_mut(id)?;
                if !lock.held_by(client_id) || lock.is_expired(now_ms) {
                    return None;
                }
                lock.expires_at_ms = now_ms.saturating_add(ttl_ms);
                Some(lock.clone())
            })
            .collect()
    }

    /// Release the client's locks on `ids`. Only the holder can release.
    pub fn release(&mut self, ids: &[ObjectId], client_id: ObjectId) -> Vec<ObjectId> {
        let mut released = Vec::new();
        for id in ids {
            if self.locks.get(id).is_some_and(|lock| lock.held_by(client_id)) {
                self.locks.remove(id);
                released.push(*id);
            }
        }
        released
    }

    /// Drop every lock held by a connection (disconnect cleanup).
    pub fn release_client(&mut self, client_id: ObjectId) -> Vec<ObjectId> {
        let ids: Vec<ObjectId> = self
            .locks
            .values()
            .filter(|lock| lock.held_by(client_id))
            .map(|lock| lock.object_id)
            .collect();
        for id in &ids {
            self.locks.remove(id);
        }
        ids
    }

    /// Drop locks on shapes that no longer exist.
    pub fn forget(&mut self, object_id: ObjectId) -> Option<Lock> {
        self.locks.remove(&object_id)
    }

    /// Remove and return every expired lock.
    pub fn sweep_expired(&mut self, now_ms: i64) -> Vec<Lock> {
        let expired: Vec<Lock> = self
            .locks
            .values()
            .filter(|lock| lock.is_expired(now_ms))
            .cloned()
            .collect();
        for lock in &expired {
            self.locks.remove(&lock.object_id);
        }
        expired
    }

    /// A client may write a shape when it is unlocked, the lock expired, or
    /// the client holds it.
    ///
    /// # Errors
    ///
    /// Returns the blocking lock otherwise.
    pub fn check_writable(&self, object_id: ObjectId, client_id: ObjectId, now_ms: i64) -> Result<(), LockConflict> {
        match self.locks.get(&object_id) {
            Some(lock) if !lock.held_by(client_id) && !lock.is_expired(now_ms) => {
                Err(LockConflict { lock: lock.clone() })
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn get(&self, object_id: &ObjectId) -> Option<&Lock> {
        self.locks.get(object_id)
    }

    /// Live locks, for join snapshots.
    #[must_use]
    pub fn snapshot(&self, now_ms: i64) -> Vec<Lock> {
        self.locks
            .values()
            .filter(|lock| !lock.is_expired(now_ms))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
