//! Slack-facing HTTP routes.
//!
//! Every route sits behind request-signature verification. Handlers
//! acknowledge immediately and run the queue flow on a background task.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::post,
    Extension, Form, Router,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::command::{parse_command, usage, ParseResult, COMMAND_NAME};
use crate::flow::{
    handle_command, handle_message, handle_reaction, handle_remove_action, FlowOutcome,
    IncomingMessage, IncomingReaction, RemoveAction,
};
use crate::recording::{CorrelationId, Direction, EventType, RecordedEvent, Sanitizer};
use crate::AppState;
use review_queue_core::codec::REMOVE_ACTION_ID;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const RETRY_HEADER: &str = "x-slack-retry-num";

/// Requests older than this are treated as replays.
const MAX_REQUEST_AGE_SECS: i64 = 60 * 5;

type HmacSha256 = Hmac<Sha256>;

/// Check a `v0=` signature over `v0:{timestamp}:{body}`.
pub fn verify_slack_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now_secs: i64,
) -> bool {
    let Ok(sent_at) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now_secs - sent_at).abs() > MAX_REQUEST_AGE_SECS {
        return false;
    }

    let Some(signature_hex) = signature.strip_prefix("v0=") else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_request_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let correlation_id = CorrelationId(Uuid::new_v4().to_string());

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
    };
    let signature = header(SIGNATURE_HEADER).ok_or(StatusCode::UNAUTHORIZED)?;
    let timestamp = header(TIMESTAMP_HEADER).ok_or(StatusCode::UNAUTHORIZED)?;

    let now = chrono::Utc::now().timestamp();
    if !verify_slack_signature(&state.signing_secret, &timestamp, &bytes, &signature, now) {
        error!("Invalid Slack request signature on {}", parts.uri.path());
        return Err(StatusCode::UNAUTHORIZED);
    }

    if let Some(ref logger) = state.recording_logger {
        let (event_type, body) = match parts.uri.path() {
            "/slack/commands" => (
                EventType::SlashCommandReceived,
                serde_json::to_value(Sanitizer::sanitize_form(&form_fields(&bytes)))
                    .unwrap_or(serde_json::Value::Null),
            ),
            "/slack/actions" => (
                EventType::SlackActionReceived,
                form_fields(&bytes)
                    .get("payload")
                    .and_then(|payload| serde_json::from_str(payload).ok())
                    .map(|payload| Sanitizer::sanitize_json(&payload))
                    .unwrap_or(serde_json::Value::Null),
            ),
            _ => (
                EventType::SlackEventReceived,
                serde_json::from_slice::<serde_json::Value>(&bytes)
                    .map(|payload| Sanitizer::sanitize_json(&payload))
                    .unwrap_or(serde_json::Value::Null),
            ),
        };
        logger.record(RecordedEvent::now(
            &correlation_id.0,
            event_type,
            Direction::Request,
            parts.uri.path(),
            json!({
                "headers": Sanitizer::sanitize_headers(&headers_to_hashmap(&parts.headers)),
                "body": body,
            }),
        ));
    }

    let mut new_request = Request::from_parts(parts, axum::body::Body::from(bytes));
    new_request.extensions_mut().insert(correlation_id);

    Ok(next.run(new_request).await)
}

fn headers_to_hashmap(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect()
}

fn form_fields(bytes: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(bytes).into_owned().collect()
}

/// Run a flow in the background, logging its outcome.
fn spawn_flow<F>(kind: &'static str, correlation_id: &CorrelationId, flow: F)
where
    F: Future<Output = Result<FlowOutcome>> + Send + 'static,
{
    let cid = correlation_id.0.clone();
    tokio::spawn(async move {
        match flow.await {
            Ok(outcome) => debug!("[{}] {} handled: {:?}", cid, kind, outcome),
            Err(e) => error!("[{}] Failed to handle {}: {:#}", cid, kind, e),
        }
    });
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Envelope {
    UrlVerification { challenge: String },
    EventCallback { event: serde_json::Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SlackEvent {
    Message(MessageEvent),
    ReactionAdded(ReactionEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageEvent {
    channel: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: String,
    ts: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReactionEvent {
    user: String,
    reaction: String,
    item: ReactedItem,
}

#[derive(Debug, Deserialize)]
struct ReactedItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug)]
enum Dispatch {
    Message(IncomingMessage),
    Reaction(IncomingReaction),
}

/// Only plain human messages and reactions on messages reach the queue.
fn dispatch(event: SlackEvent) -> Option<Dispatch> {
    match event {
        SlackEvent::Message(message) => {
            if message.subtype.is_some() || message.bot_id.is_some() {
                return None;
            }
            Some(Dispatch::Message(IncomingMessage {
                channel: message.channel,
                user: message.user?,
                text: message.text,
                ts: message.ts,
            }))
        }
        SlackEvent::ReactionAdded(reaction) => {
            if reaction.item.kind != "message" {
                return None;
            }
            Some(Dispatch::Reaction(IncomingReaction {
                channel: reaction.item.channel?,
                message_ts: reaction.item.ts?,
                reaction: reaction.reaction,
                user: reaction.user,
            }))
        }
        SlackEvent::Other => None,
    }
}

async fn events_handler(
    State(state): State<Arc<AppState>>,
    Extension(correlation_id): Extension<CorrelationId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, StatusCode> {
    let envelope: Envelope = serde_json::from_slice(&body).map_err(|e| {
        warn!("Unreadable event payload: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let event = match envelope {
        Envelope::UrlVerification { challenge } => {
            info!("Answering Slack URL verification");
            return Ok(Json(json!({ "challenge": challenge })).into_response());
        }
        Envelope::EventCallback { event } => event,
        Envelope::Other => return Ok(StatusCode::OK.into_response()),
    };

    // Handled on first delivery; the acknowledgement is what was lost.
    if let Some(retry) = headers.get(RETRY_HEADER).and_then(|h| h.to_str().ok()) {
        info!("Ignoring Slack retry #{}", retry);
        return Ok(StatusCode::OK.into_response());
    }

    let dispatched = match serde_json::from_value::<SlackEvent>(event) {
        Ok(event) => dispatch(event),
        Err(e) => {
            debug!("Skipping event with unexpected shape: {}", e);
            None
        }
    };

    let queue = state.queue.for_delivery(&correlation_id);
    match dispatched {
        Some(Dispatch::Message(message)) => spawn_flow("message", &correlation_id, async move {
            handle_message(&queue, &message).await
        }),
        Some(Dispatch::Reaction(reaction)) => spawn_flow("reaction", &correlation_id, async move {
            handle_reaction(&queue, &reaction).await
        }),
        None => debug!("Ignoring event"),
    }

    Ok(StatusCode::OK.into_response())
}

#[derive(Debug, Deserialize)]
struct ActionForm {
    payload: String,
}

#[derive(Debug, Deserialize)]
struct InteractionPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    user: Option<IdRef>,
    #[serde(default)]
    channel: Option<IdRef>,
    #[serde(default)]
    container: Option<Container>,
    #[serde(default)]
    actions: Vec<ActionItem>,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Container {
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    message_ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActionItem {
    action_id: String,
    #[serde(default)]
    value: Option<String>,
}

fn remove_actions(payload: InteractionPayload) -> Vec<RemoveAction> {
    if payload.kind != "block_actions" {
        return Vec::new();
    }
    let container = payload.container.unwrap_or(Container {
        channel_id: None,
        message_ts: None,
    });
    let Some(channel) = payload
        .channel
        .map(|c| c.id)
        .or(container.channel_id)
    else {
        return Vec::new();
    };
    let user = payload.user.map(|u| u.id).unwrap_or_default();

    payload
        .actions
        .into_iter()
        .filter(|action| action.action_id == REMOVE_ACTION_ID)
        .filter_map(|action| action.value)
        .map(|value| RemoveAction {
            channel: channel.clone(),
            message_ts: container.message_ts.clone(),
            value,
            user: user.clone(),
        })
        .collect()
}

async fn actions_handler(
    State(state): State<Arc<AppState>>,
    Extension(correlation_id): Extension<CorrelationId>,
    Form(form): Form<ActionForm>,
) -> Result<StatusCode, StatusCode> {
    let payload: InteractionPayload = serde_json::from_str(&form.payload).map_err(|e| {
        warn!("Unreadable interaction payload: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    for action in remove_actions(payload) {
        let queue = state.queue.for_delivery(&correlation_id);
        spawn_flow("remove action", &correlation_id, async move {
            handle_remove_action(&queue, &action).await
        });
    }

    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct SlashCommand {
    command: String,
    #[serde(default)]
    text: String,
    channel_id: String,
    #[serde(default)]
    user_id: String,
}

async fn commands_handler(
    State(state): State<Arc<AppState>>,
    Extension(correlation_id): Extension<CorrelationId>,
    Form(command): Form<SlashCommand>,
) -> Response {
    if command.command != COMMAND_NAME {
        warn!("Unexpected slash command {}", command.command);
    }

    match parse_command(&command.text) {
        ParseResult::Command(parsed) => {
            info!("{} ran {} {}", command.user_id, command.command, parsed);
            let queue = state.queue.for_delivery(&correlation_id);
            let channel = command.channel_id;
            spawn_flow("slash command", &correlation_id, async move {
                handle_command(&queue, &channel, parsed).await
            });
            StatusCode::OK.into_response()
        }
        ParseResult::Unrecognized(word) => {
            info!("Unrecognized {} subcommand: {}", command.command, word);
            Json(json!({
                "response_type": "ephemeral",
                "text": usage(),
            }))
            .into_response()
        }
    }
}

pub fn slack_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/slack/events", post(events_handler))
        .route("/slack/actions", post(actions_handler))
        .route("/slack/commands", post(commands_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_request_signature,
        ))
}
