//! Queue state types.
//!
//! A `QueueState` is the decoded form of the pinned queue message. The body
//! is a single ordered list of items so that tombstones and separators keep
//! their display position relative to the active entries around them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Repo label used when a link matches nothing in the allow-list.
pub const UNKNOWN_REPO: &str = "unknown";

/// Identity of the chat message backing a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueHandle {
    pub channel_id: String,
    pub message_ts: String,
}

impl QueueHandle {
    pub fn new(channel_id: impl Into<String>, message_ts: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_ts: message_ts.into(),
        }
    }
}

impl fmt::Display for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.channel_id, self.message_ts)
    }
}

/// One submitted pull request awaiting review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub submitter_id: String,
    pub repo_label: String,
    pub link_url: String,
    /// Leading text of the submitting message, already quoted for display.
    pub excerpt: String,
    pub source_permalink: Option<String>,
    pub submitter_avatar_url: Option<String>,
    /// Event timestamp of the submitting message (e.g. "1712345678.000100").
    pub submitted_at: String,
    /// Removal target; only the index assigner writes this.
    pub index: u32,
}

/// A unit of the queue body, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Entry(QueueEntry),
    /// Placeholder left where a completed entry used to be.
    Tombstone,
    /// Purely cosmetic divider.
    Separator,
}

impl QueueItem {
    pub fn as_entry(&self) -> Option<&QueueEntry> {
        match self {
            QueueItem::Entry(entry) => Some(entry),
            _ => None,
        }
    }
}

/// Coarse lifecycle phase of a channel's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    /// No pinned queue message exists yet.
    Absent,
    /// The queue has this many active entries.
    Active(usize),
    /// A queue message exists but nothing is pending.
    Empty,
}

impl QueuePhase {
    pub fn of(state: Option<&QueueState>) -> Self {
        match state.map(QueueState::active_count) {
            None => QueuePhase::Absent,
            Some(0) => QueuePhase::Empty,
            Some(n) => QueuePhase::Active(n),
        }
    }
}

/// Decoded contents of a queue message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueState {
    pub handle: Option<QueueHandle>,
    pub items: Vec<QueueItem>,
}

impl QueueState {
    /// The header scaffold of a brand new queue: no entries, one separator
    /// under the header.
    pub fn scaffold() -> Self {
        Self {
            handle: None,
            items: vec![QueueItem::Separator],
        }
    }

    pub fn with_handle(mut self, handle: QueueHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.items.iter().filter_map(QueueItem::as_entry)
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut QueueEntry> {
        self.items.iter_mut().filter_map(|item| match item {
            QueueItem::Entry(entry) => Some(entry),
            _ => None,
        })
    }

    pub fn active_count(&self) -> usize {
        self.entries().count()
    }

    pub fn tombstone_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, QueueItem::Tombstone))
            .count()
    }

    /// Position in `items` of the active entry carrying `index`.
    pub fn position_of(&self, index: u32) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.as_entry().is_some_and(|entry| entry.index == index))
    }

    pub fn header_text(&self) -> String {
        header_text(self.active_count())
    }
}

/// "There is 1 pending PR." / "There are N pending PRs."
pub fn header_text(count: usize) -> String {
    if count == 1 {
        "There is 1 pending PR.".to_string()
    } else {
        format!("There are {} pending PRs.", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: u32) -> QueueEntry {
        QueueEntry {
            submitter_id: "U1".to_string(),
            repo_label: UNKNOWN_REPO.to_string(),
            link_url: format!("https://github.com/org/repo/pull/{}", index),
            excerpt: String::new(),
            source_permalink: None,
            submitter_avatar_url: None,
            submitted_at: "1700000000.000100".to_string(),
            index,
        }
    }

    #[test]
    fn test_header_text_phrasing() {
        assert_eq!(header_text(0), "There are 0 pending PRs.");
        assert_eq!(header_text(1), "There is 1 pending PR.");
        assert_eq!(header_text(7), "There are 7 pending PRs.");
    }

    #[test]
    fn test_counts_skip_tombstones_and_separators() {
        let state = QueueState {
            handle: None,
            items: vec![
                QueueItem::Separator,
                QueueItem::Entry(entry(0)),
                QueueItem::Tombstone,
                QueueItem::Entry(entry(2)),
                QueueItem::Separator,
            ],
        };
        assert_eq!(state.active_count(), 2);
        assert_eq!(state.tombstone_count(), 1);
        assert_eq!(state.header_text(), "There are 2 pending PRs.");
        assert_eq!(state.position_of(2), Some(3));
        assert_eq!(state.position_of(1), None);
    }

    #[test]
    fn test_phase() {
        assert_eq!(QueuePhase::of(None), QueuePhase::Absent);
        assert_eq!(QueuePhase::of(Some(&QueueState::scaffold())), QueuePhase::Empty);

        let mut state = QueueState::scaffold();
        state.items.push(QueueItem::Entry(entry(0)));
        assert_eq!(QueuePhase::of(Some(&state)), QueuePhase::Active(1));
    }
}
