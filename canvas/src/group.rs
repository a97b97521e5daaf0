//! Grouping: shapes sharing a `group_id` move, lock, and select together.
//!
//! Groups are flat. Grouping shapes that already belong to groups absorbs
//! every member of those groups into the new one.

#[cfg(test)]
#[path = "group_test.rs"]
mod group_test;

use std::collections::HashSet;

use uuid::Uuid;

use crate::doc::{DocStore, ObjectId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupError {
    #[error("grouping needs at least two shapes, got {0}")]
    TooFew(usize),
    #[error("shape not found: {0}")]
    NotFound(ObjectId),
    #[error("group not found: {0}")]
    GroupNotFound(ObjectId),
}

/// Close a selection over groups: any selected member pulls in its whole
/// group. Unknown ids are dropped. Output is in draw order, deduplicated.
#[must_use]
pub fn expand_to_groups(doc: &DocStore, ids: &[ObjectId]) -> Vec<ObjectId> {
    let mut wanted: HashSet<ObjectId> = HashSet::new();
    let mut groups: HashSet<ObjectId> = HashSet::new();
    for id in ids {
        let Some(shape) = doc.get(id) else {
            continue;
        };
        wanted.insert(shape.id);
        if let Some(group_id) = shape.group_id {
            groups.insert(group_id);
        }
    }
    doc.sorted()
        .into_iter()
        .filter(|s| wanted.contains(&s.id) || s.group_id.is_some_and(|g| groups.contains(&g)))
        .map(|s| s.id)
        .collect()
}

/// Plan a new group over `ids`. Returns the fresh group id and every shape
/// that must be assigned to it (after expanding existing groups).
///
/// # Errors
///
/// `NotFound` for an unknown id, `TooFew` if fewer than two shapes would end
/// up in the group.
pub fn group(doc: &DocStore, ids: &[ObjectId]) -> Result<(ObjectId, Vec<ObjectId>), GroupError> {
    if let Some(missing) = ids.iter().find(|id| !doc.contains(id)) {
        return Err(GroupError::NotFound(*missing));
    }
    let members = expand_to_groups(doc, ids);
    if members.len() < 2 {
        return Err(GroupError::TooFew(members.len()));
    }
    Ok((Uuid::new_v4(), members))
}

/// Members whose `group_id` must be cleared to dissolve `group_id`.
///
/// # Errors
///
/// `GroupNotFound` if no shape carries the group.
pub fn ungroup(doc: &DocStore, group_id: ObjectId) -> Result<Vec<ObjectId>, GroupError> {
    let members = doc.ids_in_group(group_id);
    if members.is_empty() {
        return Err(GroupError::GroupNotFound(group_id));
    }
    Ok(members)
}
