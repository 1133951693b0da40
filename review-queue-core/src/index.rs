//! Removal-target numbering.
//!
//! Indices are rewritten wholesale only after an addition. Removal leaves
//! the survivors alone so that buttons already rendered for other entries
//! keep pointing at the same entry.

use crate::state::QueueState;

/// Number active entries `0..N` in display order. Tombstones and
/// separators never receive an index.
pub fn reassign_all(state: &mut QueueState) {
    for (position, entry) in state.entries_mut().enumerate() {
        entry.index = position as u32;
    }
}

/// True when active entries carry exactly `0..N` in display order.
pub fn is_contiguous(state: &QueueState) -> bool {
    state
        .entries()
        .enumerate()
        .all(|(position, entry)| entry.index as usize == position)
}
