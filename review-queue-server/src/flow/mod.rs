//! Event handlers.
//!
//! Every handler follows the same cycle under the channel lock: load the
//! pinned queue, apply one engine transition, write the result back once.

mod action;
mod admin;
mod message;
mod publish;
mod reaction;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{handle_remove_action, RemoveAction};
pub use admin::handle_command;
pub use message::{confirmation_text, handle_message, IncomingMessage};
pub use publish::TOO_LARGE_WARNING;
pub use reaction::{handle_reaction, IncomingReaction};

use anyhow::{Context, Result};
use review_queue_core::{Extractor, QueueEngine, QueueHandle};
use std::sync::Arc;

use crate::channel_locks::ChannelLocks;
use crate::locator::{load_queue, LoadMode, PinnedQueue};
use crate::recording::CorrelationId;
use crate::reminder::ReminderChannels;
use crate::slack::SlackApi;

#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Reply in the submitter's thread after their links are queued.
    pub confirm_additions: bool,
    /// Reaction names (without colons) that mark a PR as reviewed.
    pub completion_reactions: Vec<String>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            confirm_additions: true,
            completion_reactions: vec![
                "white_check_mark".to_string(),
                "heavy_check_mark".to_string(),
            ],
        }
    }
}

/// Everything a handler needs, shared between the HTTP routes and the
/// reminder task. Clones share locks and subscriptions.
#[derive(Clone)]
pub struct QueueContext {
    pub slack: Arc<dyn SlackApi>,
    pub bot_user_id: String,
    pub extractor: Extractor,
    pub engine: QueueEngine,
    pub settings: QueueSettings,
    pub locks: ChannelLocks,
    pub reminders: ReminderChannels,
}

impl QueueContext {
    pub fn new(
        slack: Arc<dyn SlackApi>,
        bot_user_id: impl Into<String>,
        extractor: Extractor,
        engine: QueueEngine,
        settings: QueueSettings,
    ) -> Self {
        Self {
            slack,
            bot_user_id: bot_user_id.into(),
            extractor,
            engine,
            settings,
            locks: ChannelLocks::new(),
            reminders: ReminderChannels::default(),
        }
    }

    /// A view of this context whose Slack calls are tagged with the
    /// delivery's correlation id.
    pub fn for_delivery(&self, correlation_id: &CorrelationId) -> Self {
        Self {
            slack: self.slack.clone().with_correlation_id(&correlation_id.0),
            ..self.clone()
        }
    }

    pub(crate) async fn load(&self, channel: &str, mode: LoadMode) -> Result<Option<PinnedQueue>> {
        load_queue(
            self.slack.as_ref(),
            &self.engine,
            channel,
            &self.bot_user_id,
            mode,
        )
        .await
        .with_context(|| format!("Failed to load the pinned queue in {}", channel))
    }
}

/// What a handler did, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The event did not concern the queue.
    Ignored,
    /// The pinned queue message was edited in place.
    Updated(QueueHandle),
    /// A queue message was posted and pinned.
    Created(QueueHandle),
    /// The new layout was too large; a warning was posted and the pinned
    /// queue left as it was.
    Rejected,
    /// No active entry carries this index.
    NotFound(u32),
    /// A plain text reply was posted; the queue was not touched.
    Replied,
}
