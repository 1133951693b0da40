use async_trait::async_trait;
use review_queue_core::Block;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{OutgoingMessage, PinnedItem, PinnedMessage, PostedMessage, SlackApi, SlackError};

/// A call made against [`InMemorySlack`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlackCall {
    Permalink { channel: String, ts: String },
    UserAvatar { user: String },
    ListPins { channel: String },
    AddPin { channel: String, ts: String },
    RemovePin { channel: String, ts: String },
    PostMessage {
        channel: String,
        text: String,
        thread_ts: Option<String>,
        with_blocks: bool,
    },
    UpdateMessage { channel: String, ts: String },
    MessageText { channel: String, ts: String },
}

impl SlackCall {
    pub fn channel(&self) -> Option<&str> {
        match self {
            SlackCall::UserAvatar { .. } => None,
            SlackCall::Permalink { channel, .. }
            | SlackCall::ListPins { channel }
            | SlackCall::AddPin { channel, .. }
            | SlackCall::RemovePin { channel, .. }
            | SlackCall::PostMessage { channel, .. }
            | SlackCall::UpdateMessage { channel, .. }
            | SlackCall::MessageText { channel, .. } => Some(channel),
        }
    }
}

/// A message held by [`InMemorySlack`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub ts: String,
    pub author: String,
    pub text: String,
    pub blocks: Vec<Value>,
    pub thread_ts: Option<String>,
}

#[derive(Default)]
struct Workspace {
    messages: BTreeMap<(String, String), StoredMessage>,
    /// Per channel, newest pin first, as `(ts, created_by)`.
    pins: HashMap<String, Vec<(String, String)>>,
    avatars: HashMap<String, String>,
    next_ts: u64,
    calls: Vec<SlackCall>,
    block_rejection: Option<String>,
    failing: HashSet<String>,
    failing_channels: HashSet<String>,
}

/// Slack workspace kept in memory. Messages posted through it are authored
/// by the bot user it was created with.
pub struct InMemorySlack {
    bot_user_id: String,
    workspace: Mutex<Workspace>,
}

impl InMemorySlack {
    pub fn new(bot_user_id: impl Into<String>) -> Self {
        Self {
            bot_user_id: bot_user_id.into(),
            workspace: Mutex::new(Workspace::default()),
        }
    }

    pub fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    fn workspace(&self) -> MutexGuard<'_, Workspace> {
        self.workspace.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn seed_message(&self, channel: &str, ts: &str, author: &str, text: &str) {
        self.workspace().messages.insert(
            (channel.to_string(), ts.to_string()),
            StoredMessage {
                ts: ts.to_string(),
                author: author.to_string(),
                text: text.to_string(),
                blocks: Vec::new(),
                thread_ts: None,
            },
        );
    }

    /// Store a message with raw blocks and pin it as `pinned_by`.
    pub fn seed_pinned(&self, channel: &str, ts: &str, pinned_by: &str, blocks: Vec<Value>) {
        let mut workspace = self.workspace();
        workspace.messages.insert(
            (channel.to_string(), ts.to_string()),
            StoredMessage {
                ts: ts.to_string(),
                author: pinned_by.to_string(),
                text: String::new(),
                blocks,
                thread_ts: None,
            },
        );
        workspace
            .pins
            .entry(channel.to_string())
            .or_default()
            .insert(0, (ts.to_string(), pinned_by.to_string()));
    }

    pub fn set_avatar(&self, user: &str, url: &str) {
        self.workspace()
            .avatars
            .insert(user.to_string(), url.to_string());
    }

    /// Refuse every later post or update that carries blocks with `error`.
    pub fn reject_blocks(&self, error: &str) {
        self.workspace().block_rejection = Some(error.to_string());
    }

    /// Make every later call to `method` (e.g. `chat.getPermalink`) fail.
    pub fn fail(&self, method: &str) {
        self.workspace().failing.insert(method.to_string());
    }

    /// Make every later call touching `channel` fail.
    pub fn fail_in(&self, channel: &str) {
        self.workspace().failing_channels.insert(channel.to_string());
    }

    pub fn calls(&self) -> Vec<SlackCall> {
        self.workspace().calls.clone()
    }

    /// Timestamps of pinned messages, newest first.
    pub fn pins(&self, channel: &str) -> Vec<String> {
        self.workspace()
            .pins
            .get(channel)
            .map(|pins| pins.iter().map(|(ts, _)| ts.clone()).collect())
            .unwrap_or_default()
    }

    pub fn message(&self, channel: &str, ts: &str) -> Option<StoredMessage> {
        self.workspace()
            .messages
            .get(&(channel.to_string(), ts.to_string()))
            .cloned()
    }

    /// Messages the bot posted in `channel`, oldest first.
    pub fn bot_messages(&self, channel: &str) -> Vec<StoredMessage> {
        self.workspace()
            .messages
            .iter()
            .filter(|((c, _), m)| c == channel && m.author == self.bot_user_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn begin(&self, method: &str, call: SlackCall) -> Result<MutexGuard<'_, Workspace>, SlackError> {
        let mut workspace = self.workspace();
        let channel_fails = call
            .channel()
            .is_some_and(|channel| workspace.failing_channels.contains(channel));
        workspace.calls.push(call);
        if channel_fails || workspace.failing.contains(method) {
            return Err(SlackError::api(method, "fatal_error"));
        }
        Ok(workspace)
    }
}

fn permalink_for(channel: &str, ts: &str) -> String {
    format!(
        "https://example.slack.com/archives/{}/p{}",
        channel,
        ts.replace('.', "")
    )
}

fn blocks_value(blocks: &[Block]) -> Vec<Value> {
    blocks
        .iter()
        .filter_map(|block| serde_json::to_value(block).ok())
        .collect()
}

#[async_trait]
impl SlackApi for InMemorySlack {
    async fn permalink(&self, channel: &str, message_ts: &str) -> Result<String, SlackError> {
        let workspace = self.begin(
            "chat.getPermalink",
            SlackCall::Permalink {
                channel: channel.to_string(),
                ts: message_ts.to_string(),
            },
        )?;
        if !workspace
            .messages
            .contains_key(&(channel.to_string(), message_ts.to_string()))
        {
            return Err(SlackError::api("chat.getPermalink", "message_not_found"));
        }
        Ok(permalink_for(channel, message_ts))
    }

    async fn user_avatar(&self, user_id: &str) -> Result<Option<String>, SlackError> {
        let workspace = self.begin(
            "users.profile.get",
            SlackCall::UserAvatar {
                user: user_id.to_string(),
            },
        )?;
        Ok(workspace.avatars.get(user_id).cloned())
    }

    async fn list_pins(&self, channel: &str) -> Result<Vec<PinnedItem>, SlackError> {
        let workspace = self.begin(
            "pins.list",
            SlackCall::ListPins {
                channel: channel.to_string(),
            },
        )?;
        let pins = workspace.pins.get(channel).cloned().unwrap_or_default();
        Ok(pins
            .into_iter()
            .map(|(ts, created_by)| {
                let message = workspace
                    .messages
                    .get(&(channel.to_string(), ts.clone()))
                    .map(|m| PinnedMessage {
                        ts: m.ts.clone(),
                        text: m.text.clone(),
                        blocks: m.blocks.clone(),
                        permalink: Some(permalink_for(channel, &ts)),
                    });
                PinnedItem {
                    created_by: Some(created_by),
                    message,
                }
            })
            .collect())
    }

    async fn add_pin(&self, channel: &str, message_ts: &str) -> Result<(), SlackError> {
        let mut workspace = self.begin(
            "pins.add",
            SlackCall::AddPin {
                channel: channel.to_string(),
                ts: message_ts.to_string(),
            },
        )?;
        if !workspace
            .messages
            .contains_key(&(channel.to_string(), message_ts.to_string()))
        {
            return Err(SlackError::api("pins.add", "message_not_found"));
        }
        let bot = self.bot_user_id.clone();
        let pins = workspace.pins.entry(channel.to_string()).or_default();
        if pins.iter().any(|(ts, _)| ts == message_ts) {
            return Err(SlackError::api("pins.add", "already_pinned"));
        }
        pins.insert(0, (message_ts.to_string(), bot));
        Ok(())
    }

    async fn remove_pin(&self, channel: &str, message_ts: &str) -> Result<(), SlackError> {
        let mut workspace = self.begin(
            "pins.remove",
            SlackCall::RemovePin {
                channel: channel.to_string(),
                ts: message_ts.to_string(),
            },
        )?;
        let pins = workspace.pins.entry(channel.to_string()).or_default();
        let before = pins.len();
        pins.retain(|(ts, _)| ts != message_ts);
        if pins.len() == before {
            return Err(SlackError::api("pins.remove", "no_pin"));
        }
        Ok(())
    }

    async fn post_message(&self, message: OutgoingMessage) -> Result<PostedMessage, SlackError> {
        let mut workspace = self.begin(
            "chat.postMessage",
            SlackCall::PostMessage {
                channel: message.channel.clone(),
                text: message.text.clone(),
                thread_ts: message.thread_ts.clone(),
                with_blocks: message.blocks.is_some(),
            },
        )?;
        if message.blocks.is_some() {
            if let Some(error) = &workspace.block_rejection {
                return Err(SlackError::api("chat.postMessage", error));
            }
        }

        workspace.next_ts += 1;
        let ts = format!("1800000000.{:06}", workspace.next_ts);
        workspace.messages.insert(
            (message.channel.clone(), ts.clone()),
            StoredMessage {
                ts: ts.clone(),
                author: self.bot_user_id.clone(),
                text: message.text,
                blocks: message.blocks.as_deref().map(blocks_value).unwrap_or_default(),
                thread_ts: message.thread_ts,
            },
        );
        Ok(PostedMessage {
            channel: message.channel,
            ts,
        })
    }

    async fn update_message(
        &self,
        channel: &str,
        message_ts: &str,
        text: &str,
        blocks: &[Block],
    ) -> Result<(), SlackError> {
        let mut workspace = self.begin(
            "chat.update",
            SlackCall::UpdateMessage {
                channel: channel.to_string(),
                ts: message_ts.to_string(),
            },
        )?;
        if let Some(error) = &workspace.block_rejection {
            return Err(SlackError::api("chat.update", error));
        }
        let bot = self.bot_user_id.clone();
        let stored = workspace
            .messages
            .get_mut(&(channel.to_string(), message_ts.to_string()))
            .ok_or_else(|| SlackError::api("chat.update", "message_not_found"))?;
        if stored.author != bot {
            return Err(SlackError::api("chat.update", "cant_update_message"));
        }
        stored.text = text.to_string();
        stored.blocks = blocks_value(blocks);
        Ok(())
    }

    async fn message_text(
        &self,
        channel: &str,
        message_ts: &str,
    ) -> Result<Option<String>, SlackError> {
        let workspace = self.begin(
            "conversations.history",
            SlackCall::MessageText {
                channel: channel.to_string(),
                ts: message_ts.to_string(),
            },
        )?;
        Ok(workspace
            .messages
            .get(&(channel.to_string(), message_ts.to_string()))
            .map(|m| m.text.clone()))
    }

    fn with_correlation_id(self: Arc<Self>, _correlation_id: &str) -> Arc<dyn SlackApi> {
        self
    }
}
