//! Z-index reordering.
//!
//! Every operation returns only the shapes whose `z_index` changes, so the
//! caller can bump versions and broadcast a minimal set. Z values are never
//! renumbered globally: front/back place the selection above the current
//! maximum or below the current minimum, and forward/backward swap z values
//! with the nearest non-selected neighbour. When the z range runs out at
//! either end of `i64` the whole stack is renumbered densely from zero.

#[cfg(test)]
#[path = "order_test.rs"]
mod order_test;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::doc::{DocStore, ObjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReorderOp {
    BringToFront,
    SendToBack,
    BringForward,
    SendBackward,
}

/// Compute new z-indices for `ids` under `op`. Unknown ids are ignored.
#[must_use]
pub fn reorder(doc: &DocStore, ids: &[ObjectId], op: ReorderOp) -> Vec<(ObjectId, i64)> {
    let selected: HashSet<ObjectId> = ids.iter().copied().filter(|id| doc.contains(id)).collect();
    if selected.is_empty() {
        return Vec::new();
    }
    let order: Vec<(ObjectId, i64)> = doc.sorted().into_iter().map(|s| (s.id, s.z_index)).collect();

    match op {
        ReorderOp::BringToFront => to_extreme(&order, &selected, true),
        ReorderOp::SendToBack => to_extreme(&order, &selected, false),
        ReorderOp::BringForward => step(&order, &selected, true),
        ReorderOp::SendBackward => step(&order, &selected, false),
    }
}

fn to_extreme(order: &[(ObjectId, i64)], selected: &HashSet<ObjectId>, front: bool) -> Vec<(ObjectId, i64)> {
    let others: Vec<i64> = order
        .iter()
        .filter(|(id, _)| !selected.contains(id))
        .map(|(_, z)| *z)
        .collect();
    let picked: Vec<(ObjectId, i64)> = order
        .iter()
        .filter(|(id, _)| selected.contains(id))
        .copied()
        .collect();

    // Already at the extreme, in a contiguous run: nothing to do.
    let already = match (front, others.iter().max(), others.iter().min()) {
        (_, None, _) | (_, _, None) => true,
        (true, Some(max), _) => picked.iter().all(|(_, z)| z > max),
        (false, _, Some(min)) => picked.iter().all(|(_, z)| z < min),
    };
    if already {
        return Vec::new();
    }

    let count = i64::try_from(picked.len()).unwrap_or(i64::MAX);
    let base = if front {
        others.iter().max().copied().unwrap_or(0).checked_add(1)
    } else {
        others.iter().min().copied().unwrap_or(0).checked_sub(count)
    };
    let last = base.and_then(|b| b.checked_add(count - 1));
    let (Some(base), Some(_)) = (base, last) else {
        let rest = order.iter().filter(|(id, _)| !selected.contains(id)).map(|(id, _)| *id);
        let moved = picked.iter().map(|(id, _)| *id);
        let ids: Vec<ObjectId> = if front { rest.chain(moved).collect() } else { moved.chain(rest).collect() };
        return renumber(order, &ids);
    };
    picked
        .iter()
        .zip(0_i64..)
        .map(|((id, _), offset)| (*id, base + offset))
        .collect()
}

/// Assign z `0..n` to `ids` (bottom to top), reporting only real changes.
fn renumber(order: &[(ObjectId, i64)], ids: &[ObjectId]) -> Vec<(ObjectId, i64)> {
    ids.iter()
        .zip(0_i64..)
        .filter(|(id, z)| order.iter().any(|(oid, oz)| oid == *id && oz != z))
        .map(|(id, z)| (*id, z))
        .collect()
}

fn step(order: &[(ObjectId, i64)], selected: &HashSet<ObjectId>, forward: bool) -> Vec<(ObjectId, i64)> {
    let mut z: Vec<(ObjectId, i64)> = order.to_vec();
    let mut ids: Vec<ObjectId> = order.iter().map(|(id, _)| *id).collect();
    let len = ids.len();

    // Walk from the far end so a block of selected shapes moves as a unit.
    let indices: Vec<usize> = if forward { (0..len).rev().collect() } else { (0..len).collect() };
    for i in indices {
        if !selected.contains(&ids[i]) {
            continue;
        }
        let neighbour = if forward { i + 1 } else { i.wrapping_sub(1) };
        if neighbour >= len || selected.contains(&ids[neighbour]) {
            continue;
        }
        ids.swap(i, neighbour);
    }

    // Reassign the original z slots to the new order; equal z values get
    // nudged so the new order is strict.
    let mut slots: Vec<i64> = z.iter().map(|(_, v)| *v).collect();
    for i in 1..slots.len() {
        if slots[i] <= slots[i - 1] {
            let Some(next) = slots[i - 1].checked_add(1) else {
                return renumber(order, &ids);
            };
            slots[i] = next;
        }
    }
    let mut changed = Vec::new();
    for (i, id) in ids.iter().enumerate() {
        let Some(entry) = z.iter_mut().find(|(eid, _)| eid == id) else {
            continue;
        };
        if entry.1 != slots[i] {
            entry.1 = slots[i];
            changed.push((*id, slots[i]));
        }
    }
    changed
}
