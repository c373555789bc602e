//! Dense ranking of sibling groups.
//!
//! Every sibling group (the lists of a trip, the locations of a list) keeps
//! its `display_order` values as the contiguous sequence `0..n`. The functions
//! here are pure: they take a sibling sequence and hand back the renumbered
//! sequence, leaving persistence to the stores.

use std::fmt;
use thiserror::Error;

pub trait Ordered {
    type Key: PartialEq + fmt::Debug;

    fn key(&self) -> &Self::Key;
    fn display_order(&self) -> u32;
    fn set_display_order(&mut self, order: u32);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingError {
    #[error("item {0} is not part of the sibling group")]
    UnknownItem(String),

    #[error("permutation has {got} ids, sibling group has {expected}")]
    PermutationLength { expected: usize, got: usize },
}

/// Stable sort by rank. Equal ranks keep their array order, lowest index first.
pub fn sort_by_rank<T: Ordered>(items: &mut [T]) {
    items.sort_by_key(T::display_order);
}

/// Rewrite ranks to match sequence order. Returns the indices whose rank changed.
pub fn rerank<T: Ordered>(items: &mut [T]) -> Vec<usize> {
    let mut changed = Vec::new();
    for (index, item) in items.iter_mut().enumerate() {
        let order = index as u32;
        if item.display_order() != order {
            item.set_display_order(order);
            changed.push(index);
        }
    }
    changed
}

/// Move one element and re-rank the whole group.
///
/// The element is located by key; when `from` disagrees with its actual
/// position (a stale drag event), the actual position wins. `to` is clamped.
pub fn reconcile<T: Ordered>(
    mut siblings: Vec<T>,
    moved: &T::Key,
    from: usize,
    to: usize,
) -> Result<Vec<T>, OrderingError> {
    let actual = if siblings.get(from).is_some_and(|item| item.key() == moved) {
        from
    } else {
        siblings
            .iter()
            .position(|item| item.key() == moved)
            .ok_or_else(|| OrderingError::UnknownItem(format!("{moved:?}")))?
    };

    let item = siblings.remove(actual);
    let target = to.min(siblings.len());
    siblings.insert(target, item);
    rerank(&mut siblings);
    Ok(siblings)
}

/// Close the gap left by removed siblings, keeping their relative order.
pub fn renumber_after_removal<T: Ordered>(mut siblings: Vec<T>) -> Vec<T> {
    sort_by_rank(&mut siblings);
    rerank(&mut siblings);
    siblings
}

/// Rank for an element appended to the group.
pub fn next_order<'a, T: Ordered + 'a>(siblings: impl IntoIterator<Item = &'a T>) -> u32 {
    siblings
        .into_iter()
        .map(T::display_order)
        .max()
        .map_or(0, |max| max + 1)
}

/// Reorder the group to follow `ordered_keys` exactly (a drop that commits a
/// whole permutation at once).
pub fn apply_permutation<T: Ordered>(
    mut siblings: Vec<T>,
    ordered_keys: &[T::Key],
) -> Result<Vec<T>, OrderingError> {
    if ordered_keys.len() != siblings.len() {
        return Err(OrderingError::PermutationLength {
            expected: siblings.len(),
            got: ordered_keys.len(),
        });
    }

    let mut arranged = Vec::with_capacity(siblings.len());
    for key in ordered_keys {
        let index = siblings
            .iter()
            .position(|item| item.key() == key)
            .ok_or_else(|| OrderingError::UnknownItem(format!("{key:?}")))?;
        arranged.push(siblings.swap_remove(index));
    }
    rerank(&mut arranged);
    Ok(arranged)
}

pub fn is_dense(orders: impl IntoIterator<Item = u32>) -> bool {
    let mut orders: Vec<u32> = orders.into_iter().collect();
    orders.sort_unstable();
    orders.iter().enumerate().all(|(index, order)| *order == index as u32)
}
