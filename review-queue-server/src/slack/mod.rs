//! The slice of the Slack Web API the queue depends on.
//!
//! Everything above this module talks to [`SlackApi`], so the flows run the
//! same against [`SlackClient`] in production and [`InMemorySlack`] in tests.

mod client;
mod memory;

pub use client::{create_slack_client, SlackClient, DEFAULT_API_BASE};
pub use memory::{InMemorySlack, SlackCall, StoredMessage};

use async_trait::async_trait;
use review_queue_core::Block;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Slack error codes meaning the message payload itself was refused.
const BLOCK_REJECTIONS: &[&str] = &["invalid_blocks", "too_many_blocks", "msg_too_long"];

#[derive(Debug, Error)]
pub enum SlackError {
    /// Slack answered with `ok: false`.
    #[error("slack {method} failed: {error}")]
    Api { method: String, error: String },

    #[error("slack {method} returned HTTP {status}")]
    Status { method: String, status: u16 },

    #[error("slack {method} request failed: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest_middleware::Error,
    },

    #[error("slack {method} returned an unreadable response: {message}")]
    Decode { method: String, message: String },
}

impl SlackError {
    pub fn api(method: &str, error: &str) -> Self {
        SlackError::Api {
            method: method.to_string(),
            error: error.to_string(),
        }
    }

    /// The platform refused the blocks (too many, too long, malformed).
    pub fn is_block_rejection(&self) -> bool {
        matches!(self, SlackError::Api { error, .. } if BLOCK_REJECTIONS.contains(&error.as_str()))
    }
}

/// One entry of `pins.list`.
#[derive(Debug, Clone, Deserialize)]
pub struct PinnedItem {
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub message: Option<PinnedMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PinnedMessage {
    pub ts: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub blocks: Vec<serde_json::Value>,
    #[serde(default)]
    pub permalink: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// A `chat.postMessage` request.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub channel: String,
    /// Notification fallback when `blocks` is set.
    pub text: String,
    pub blocks: Option<Vec<Block>>,
    pub thread_ts: Option<String>,
}

impl OutgoingMessage {
    pub fn text(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            blocks: None,
            thread_ts: None,
        }
    }

    pub fn with_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.blocks = Some(blocks);
        self
    }

    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn permalink(&self, channel: &str, message_ts: &str) -> Result<String, SlackError>;

    /// The user's 48px avatar, if their profile has one.
    async fn user_avatar(&self, user_id: &str) -> Result<Option<String>, SlackError>;

    async fn list_pins(&self, channel: &str) -> Result<Vec<PinnedItem>, SlackError>;

    async fn add_pin(&self, channel: &str, message_ts: &str) -> Result<(), SlackError>;

    async fn remove_pin(&self, channel: &str, message_ts: &str) -> Result<(), SlackError>;

    async fn post_message(&self, message: OutgoingMessage) -> Result<PostedMessage, SlackError>;

    async fn update_message(
        &self,
        channel: &str,
        message_ts: &str,
        text: &str,
        blocks: &[Block],
    ) -> Result<(), SlackError>;

    /// Text of the message at exactly `message_ts`, if it still exists.
    async fn message_text(
        &self,
        channel: &str,
        message_ts: &str,
    ) -> Result<Option<String>, SlackError>;

    /// A handle whose calls carry `correlation_id`, so recorded Web API
    /// traffic can be matched to the delivery that caused it.
    fn with_correlation_id(self: Arc<Self>, correlation_id: &str) -> Arc<dyn SlackApi>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_rejection_codes() {
        assert!(SlackError::api("chat.update", "invalid_blocks").is_block_rejection());
        assert!(SlackError::api("chat.update", "msg_too_long").is_block_rejection());
        assert!(!SlackError::api("chat.update", "channel_not_found").is_block_rejection());
        assert!(!SlackError::Status {
            method: "chat.update".to_string(),
            status: 429
        }
        .is_block_rejection());
    }

    #[test]
    fn test_pins_list_item_parses() {
        let raw = serde_json::json!({
            "type": "message",
            "created": 1700000000,
            "created_by": "UBOT",
            "channel": "C1",
            "message": {
                "type": "message",
                "ts": "1700000000.000100",
                "text": "There is 1 pending PR.",
                "blocks": [{"type": "divider", "block_id": "x"}],
                "permalink": "https://team.slack.com/archives/C1/p1700000000000100"
            }
        });
        let item: PinnedItem = serde_json::from_value(raw).unwrap();
        assert_eq!(item.created_by.as_deref(), Some("UBOT"));
        let message = item.message.unwrap();
        assert_eq!(message.ts, "1700000000.000100");
        assert_eq!(message.blocks.len(), 1);
    }
}
