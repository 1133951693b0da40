use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use review_queue_core::Block;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{OutgoingMessage, PinnedItem, PostedMessage, SlackApi, SlackError};
use crate::recording::{RecordingLogger, RecordingMiddleware, CORRELATION_ID_HEADER};

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bot-token client for the Slack Web API.
#[derive(Clone)]
pub struct SlackClient {
    client: ClientWithMiddleware,
    api_base: String,
    bot_token: String,
    correlation_id: Option<String>,
}

#[derive(Deserialize)]
struct PermalinkResponse {
    permalink: String,
}

#[derive(Deserialize)]
struct ProfileResponse {
    profile: Profile,
}

#[derive(Deserialize)]
struct Profile {
    #[serde(default)]
    image_48: Option<String>,
}

#[derive(Deserialize)]
struct PinsResponse {
    #[serde(default)]
    items: Vec<PinnedItem>,
}

#[derive(Deserialize)]
struct PostResponse {
    channel: String,
    ts: String,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

#[derive(Deserialize)]
struct HistoryMessage {
    ts: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AuthTestResponse {
    user_id: String,
}

#[derive(Deserialize)]
struct Empty {}

impl SlackClient {
    pub fn new(api_base: impl Into<String>, bot_token: impl Into<String>) -> Result<Self> {
        Self::new_with_recording(api_base, bot_token, None)
    }

    pub fn new_with_recording(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        recording_logger: Option<RecordingLogger>,
    ) -> Result<Self> {
        Ok(Self {
            client: create_slack_client(recording_logger)?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            correlation_id: None,
        })
    }

    /// The user id the bot token belongs to.
    pub async fn auth_test(&self) -> Result<String, SlackError> {
        let response: AuthTestResponse = self.post("auth.test", json!({})).await?;
        Ok(response.user_id)
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, SlackError> {
        debug!("Calling slack {}", method);
        let mut request_builder = self
            .client
            .get(self.url(method))
            .bearer_auth(&self.bot_token)
            .query(params);
        if let Some(cid) = &self.correlation_id {
            request_builder = request_builder.header(CORRELATION_ID_HEADER, cid);
        }
        let response = request_builder
            .send()
            .await
            .map_err(|source| SlackError::Transport {
                method: method.to_string(),
                source,
            })?;
        read_response(method, response).await
    }

    async fn post<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, SlackError> {
        debug!("Calling slack {}", method);
        let mut request_builder = self
            .client
            .post(self.url(method))
            .bearer_auth(&self.bot_token)
            .header("Content-Type", "application/json; charset=utf-8")
            .body(body.to_string());
        if let Some(cid) = &self.correlation_id {
            request_builder = request_builder.header(CORRELATION_ID_HEADER, cid);
        }
        let response = request_builder
            .send()
            .await
            .map_err(|source| SlackError::Transport {
                method: method.to_string(),
                source,
            })?;
        read_response(method, response).await
    }
}

async fn read_response<T: DeserializeOwned>(
    method: &str,
    response: reqwest::Response,
) -> Result<T, SlackError> {
    let status = response.status();
    if !status.is_success() {
        warn!("slack {} returned HTTP {}", method, status);
        return Err(SlackError::Status {
            method: method.to_string(),
            status: status.as_u16(),
        });
    }

    let value: Value = response.json().await.map_err(|e| SlackError::Decode {
        method: method.to_string(),
        message: e.to_string(),
    })?;
    parse_envelope(method, value)
}

/// Every Web API response carries `ok`; failures name the cause in `error`.
fn parse_envelope<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, SlackError> {
    if value.get("ok").and_then(Value::as_bool) != Some(true) {
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        return Err(SlackError::api(method, error));
    }

    serde_json::from_value(value).map_err(|e| SlackError::Decode {
        method: method.to_string(),
        message: e.to_string(),
    })
}

fn blocks_json(blocks: &[Block]) -> Result<Value, SlackError> {
    serde_json::to_value(blocks).map_err(|e| SlackError::Decode {
        method: "blocks".to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl SlackApi for SlackClient {
    async fn permalink(&self, channel: &str, message_ts: &str) -> Result<String, SlackError> {
        let response: PermalinkResponse = self
            .get(
                "chat.getPermalink",
                &[("channel", channel), ("message_ts", message_ts)],
            )
            .await?;
        Ok(response.permalink)
    }

    async fn user_avatar(&self, user_id: &str) -> Result<Option<String>, SlackError> {
        let response: ProfileResponse = self
            .get("users.profile.get", &[("user", user_id)])
            .await?;
        Ok(response.profile.image_48.filter(|url| !url.is_empty()))
    }

    async fn list_pins(&self, channel: &str) -> Result<Vec<PinnedItem>, SlackError> {
        let response: PinsResponse = self.get("pins.list", &[("channel", channel)]).await?;
        Ok(response.items)
    }

    async fn add_pin(&self, channel: &str, message_ts: &str) -> Result<(), SlackError> {
        let _: Empty = self
            .post("pins.add", json!({"channel": channel, "timestamp": message_ts}))
            .await?;
        Ok(())
    }

    async fn remove_pin(&self, channel: &str, message_ts: &str) -> Result<(), SlackError> {
        let _: Empty = self
            .post(
                "pins.remove",
                json!({"channel": channel, "timestamp": message_ts}),
            )
            .await?;
        Ok(())
    }

    async fn post_message(&self, message: OutgoingMessage) -> Result<PostedMessage, SlackError> {
        let mut body = json!({
            "channel": message.channel,
            "text": message.text,
            "unfurl_links": false,
        });
        if let Some(blocks) = &message.blocks {
            body["blocks"] = blocks_json(blocks)?;
        }
        if let Some(thread_ts) = &message.thread_ts {
            body["thread_ts"] = Value::String(thread_ts.clone());
        }

        let response: PostResponse = self.post("chat.postMessage", body).await?;
        Ok(PostedMessage {
            channel: response.channel,
            ts: response.ts,
        })
    }

    async fn update_message(
        &self,
        channel: &str,
        message_ts: &str,
        text: &str,
        blocks: &[Block],
    ) -> Result<(), SlackError> {
        let body = json!({
            "channel": channel,
            "ts": message_ts,
            "text": text,
            "blocks": blocks_json(blocks)?,
        });
        let _: Empty = self.post("chat.update", body).await?;
        Ok(())
    }

    async fn message_text(
        &self,
        channel: &str,
        message_ts: &str,
    ) -> Result<Option<String>, SlackError> {
        let response: HistoryResponse = self
            .get(
                "conversations.history",
                &[
                    ("channel", channel),
                    ("latest", message_ts),
                    ("oldest", message_ts),
                    ("inclusive", "true"),
                    ("limit", "1"),
                ],
            )
            .await?;
        Ok(response
            .messages
            .into_iter()
            .find(|message| message.ts == message_ts)
            .map(|message| message.text))
    }

    fn with_correlation_id(self: Arc<Self>, correlation_id: &str) -> Arc<dyn SlackApi> {
        Arc::new(SlackClient {
            correlation_id: Some(correlation_id.to_string()),
            ..(*self).clone()
        })
    }
}

pub fn create_slack_client(recording_logger: Option<RecordingLogger>) -> Result<ClientWithMiddleware> {
    let client = Client::builder()
        .user_agent(concat!("review-queue/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")?;

    let mut builder = ClientBuilder::new(client);
    if let Some(logger) = recording_logger {
        builder = builder.with(RecordingMiddleware::new(logger));
    }

    Ok(builder.build())
}
