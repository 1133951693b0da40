use super::sanitizer::Sanitizer;
use super::{
    CorrelationId, Direction, EventType, RecordedEvent, RecordingLogger, CORRELATION_ID_HEADER,
};
use axum::http;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use std::collections::HashMap;
use uuid::Uuid;

/// Bodies above this size are summarised rather than recorded.
const MAX_RECORDED_BODY: usize = 10_000;

/// reqwest-middleware layer that records every Slack Web API call.
pub struct RecordingMiddleware {
    logger: RecordingLogger,
}

impl RecordingMiddleware {
    pub fn new(logger: RecordingLogger) -> Self {
        Self { logger }
    }
}

#[async_trait::async_trait]
impl Middleware for RecordingMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| extensions.get::<CorrelationId>().map(|id| id.0.clone()))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if !req.headers().contains_key(CORRELATION_ID_HEADER) {
            if let Ok(value) = correlation_id.parse() {
                req.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
        }

        let method = api_method(req.url());
        self.logger.record(RecordedEvent::now(
            &correlation_id,
            EventType::SlackApiCall,
            Direction::Request,
            method.clone(),
            request_data(&req),
        ));

        let response = next.run(req, extensions).await;

        let data = match &response {
            Ok(resp) => serde_json::json!({
                "status_code": resp.status().as_u16(),
                "headers": Sanitizer::sanitize_headers(&header_map(resp.headers())),
                "body_size": resp.content_length().unwrap_or(0),
            }),
            Err(err) => serde_json::json!({
                "error": err.to_string(),
            }),
        };
        let operation = match &response {
            Ok(resp) => format!("{} response_{}", method, resp.status().as_u16()),
            Err(_) => format!("{} error", method),
        };
        self.logger.record(RecordedEvent::now(
            &correlation_id,
            EventType::SlackApiCall,
            Direction::Response,
            operation,
            data,
        ));

        response
    }
}

fn request_data(request: &Request) -> serde_json::Value {
    let body = match request.body().map(|body| body.as_bytes()) {
        None => serde_json::Value::Null,
        Some(None) => serde_json::Value::String("[STREAM_BODY]".to_string()),
        Some(Some(bytes)) if bytes.len() > MAX_RECORDED_BODY => {
            serde_json::Value::String(format!("[LARGE_BODY_{}b]", bytes.len()))
        }
        Some(Some(bytes)) => match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(json) => Sanitizer::sanitize_json(&json),
            Err(_) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        },
    };

    serde_json::json!({
        "method": request.method().to_string(),
        "url": request.url().to_string(),
        "headers": Sanitizer::sanitize_headers(&header_map(request.headers())),
        "body": body,
    })
}

fn header_map(headers: &http::HeaderMap) -> HashMap<String, String> {
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

/// `chat.postMessage` from `https://slack.com/api/chat.postMessage`.
fn api_method(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_method_from_url() {
        let url = reqwest::Url::parse("https://slack.com/api/pins.list?channel=C1").unwrap();
        assert_eq!(api_method(&url), "pins.list");

        let url = reqwest::Url::parse("http://127.0.0.1:9/").unwrap();
        assert_eq!(api_method(&url), "unknown");
    }
}
