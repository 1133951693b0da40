//! Optional JSONL capture of inbound Slack deliveries and outbound Web API
//! calls, for replaying production traffic against the queue logic.

mod logger;
mod middleware;
mod sanitizer;

pub use logger::RecordingLogger;
pub use middleware::RecordingMiddleware;
pub use sanitizer::Sanitizer;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header carrying the correlation id on outbound Slack calls.
pub const CORRELATION_ID_HEADER: &str = "x-review-queue-correlation-id";

/// Ties an inbound delivery to the Web API calls made while handling it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SlackEventReceived,
    SlackActionReceived,
    SlashCommandReceived,
    SlackApiCall,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Request,
    Response,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub timestamp: String,
    pub correlation_id: String,
    pub event_type: EventType,
    pub direction: Direction,
    pub operation: String,
    pub data: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RecordedEvent {
    pub fn now(
        correlation_id: &str,
        event_type: EventType,
        direction: Direction,
        operation: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: correlation_id.to_string(),
            event_type,
            direction,
            operation: operation.into(),
            data,
            metadata: HashMap::new(),
        }
    }
}
