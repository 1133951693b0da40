//! Queue transitions.
//!
//! Every transition is a pure function from a decoded [`QueueState`] to a new
//! one. Fetching the pinned message and writing the re-encoded blocks back is
//! the caller's job.

use tracing::{debug, info};

use crate::error::QueueError;
use crate::extract::find_links;
use crate::index::reassign_all;
use crate::retention::RetentionPolicy;
use crate::state::{QueueEntry, QueueItem, QueueState};

/// Reply to a show request when nothing is pending.
pub const NO_PENDING_TEXT: &str = "There are no pending PRs.";

/// Result of reconciling a reaction against the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The reaction is not a completion reaction.
    Ignored,
    /// No queued link appears in the reacted-to message.
    NoMatch,
    /// Entries with these indices were removed.
    Removed {
        state: QueueState,
        indices: Vec<u32>,
    },
}

/// Result of a request to re-surface the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowOutcome {
    /// Absent or empty queue; reply with [`NO_PENDING_TEXT`] and touch nothing.
    NothingPending,
    /// Re-post and re-pin this state.
    Surface(QueueState),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueEngine {
    policy: RetentionPolicy,
}

impl QueueEngine {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Append one cluster per entry and renumber. Returns `None` when there
    /// is nothing to add, in which case the existing state stands.
    pub fn add(&self, state: Option<&QueueState>, entries: Vec<QueueEntry>) -> Option<QueueState> {
        if entries.is_empty() {
            return None;
        }

        let mut next = state.cloned().unwrap_or_else(QueueState::scaffold);
        for entry in entries {
            next.items.push(QueueItem::Entry(entry));
            next.items.push(QueueItem::Separator);
        }
        reassign_all(&mut next);

        debug!("Queue now holds {} entries", next.active_count());
        Some(next)
    }

    /// Remove the active entry carrying `index`. Survivors keep their indices.
    pub fn remove_by_index(&self, state: &QueueState, index: u32) -> Result<QueueState, QueueError> {
        let position = state
            .position_of(index)
            .ok_or(QueueError::NotFound { index })?;

        let mut next = state.clone();
        self.remove_at(&mut next, position);
        Ok(next)
    }

    /// Remove the entry at `position` in `state.items`. Items before
    /// `position` do not move.
    fn remove_at(&self, state: &mut QueueState, position: usize) {
        // The separator closing the entry's cluster goes with it.
        if matches!(state.items.get(position + 1), Some(QueueItem::Separator)) {
            state.items.remove(position + 1);
        }
        if self.policy.keeps_tombstones() {
            state.items[position] = QueueItem::Tombstone;
        } else {
            state.items.remove(position);
        }
    }

    /// Remove every entry whose link appears in `reacted_text`, provided
    /// `reaction` is one of `completion_reactions`.
    ///
    /// All targets are resolved before the first removal so that one
    /// removal cannot change which entries the others refer to.
    pub fn reconcile_reaction(
        &self,
        state: &QueueState,
        reaction: &str,
        reacted_text: &str,
        completion_reactions: &[String],
    ) -> ReconcileOutcome {
        if !completion_reactions.iter().any(|name| name == reaction) {
            return ReconcileOutcome::Ignored;
        }

        let links = find_links(reacted_text);
        let targets: Vec<(usize, u32)> = state
            .items
            .iter()
            .enumerate()
            .filter_map(|(position, item)| Some((position, item.as_entry()?)))
            .filter(|(_, entry)| links.contains(&entry.link_url))
            .map(|(position, entry)| (position, entry.index))
            .collect();
        if targets.is_empty() {
            return ReconcileOutcome::NoMatch;
        }

        // Last first, so earlier positions stay valid.
        let mut next = state.clone();
        for &(position, _) in targets.iter().rev() {
            self.remove_at(&mut next, position);
        }
        let removed: Vec<u32> = targets.into_iter().map(|(_, index)| index).collect();

        info!(
            "Reaction :{}: completed {} queue entries",
            reaction,
            removed.len()
        );
        ReconcileOutcome::Removed {
            state: next,
            indices: removed,
        }
    }

    /// Decide whether there is anything to re-surface.
    pub fn show(&self, state: Option<&QueueState>) -> ShowOutcome {
        match state {
            Some(state) if state.active_count() > 0 => ShowOutcome::Surface(state.clone()),
            _ => ShowOutcome::NothingPending,
        }
    }

    pub fn clear_tombstones(&self, state: &QueueState) -> QueueState {
        let mut next = state.clone();
        next.items.retain(|item| !matches!(item, QueueItem::Tombstone));
        next
    }

    pub fn strip_decoration(&self, state: &QueueState) -> QueueState {
        let mut next = state.clone();
        next.items.retain(|item| !matches!(item, QueueItem::Separator));
        next
    }

    /// Apply the load-time sweep of the retention policy.
    pub fn sanitize_on_load(&self, state: QueueState) -> QueueState {
        if self.policy.clears_on_load() {
            self.clear_tombstones(&state)
        } else {
            state
        }
    }
}
