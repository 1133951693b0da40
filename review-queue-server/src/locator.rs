//! Finds and decodes the channel's pinned queue message.

use review_queue_core::{decode, QueueEngine, QueueHandle, QueueState};
use tracing::{debug, info};

use crate::slack::{SlackApi, SlackError};

/// The queue as currently pinned in a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PinnedQueue {
    pub handle: QueueHandle,
    pub permalink: Option<String>,
    pub state: QueueState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Apply the retention policy's load-time cleanup.
    Sanitized,
    /// Decode exactly what is pinned.
    Raw,
}

/// The first pin created by the bot is the queue; there is assumed to be at
/// most one.
pub async fn load_queue(
    slack: &dyn SlackApi,
    engine: &QueueEngine,
    channel: &str,
    bot_user_id: &str,
    mode: LoadMode,
) -> Result<Option<PinnedQueue>, SlackError> {
    let pins = slack.list_pins(channel).await?;

    let Some(message) = pins
        .into_iter()
        .filter(|item| item.created_by.as_deref() == Some(bot_user_id))
        .find_map(|item| item.message)
    else {
        debug!("No queue pinned in {}", channel);
        return Ok(None);
    };

    let handle = QueueHandle::new(channel, message.ts.clone());
    let mut state = decode(&message.blocks).with_handle(handle.clone());
    if mode == LoadMode::Sanitized {
        let before = state.tombstone_count();
        state = engine.sanitize_on_load(state);
        if state.tombstone_count() != before {
            info!(
                "Dropped {} completed entries from queue {}",
                before - state.tombstone_count(),
                handle
            );
        }
    }

    Ok(Some(PinnedQueue {
        handle,
        permalink: message.permalink,
        state,
    }))
}
