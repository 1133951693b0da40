use serde_json::Value;
use std::collections::HashMap;

/// Strips credentials from recorded traffic.
pub struct Sanitizer;

const REDACTED: &str = "[REDACTED]";

impl Sanitizer {
    pub fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(key, value)| {
                let value = match key.to_lowercase().as_str() {
                    "authorization" | "cookie" | "x-slack-signature" => REDACTED.to_string(),
                    _ => value.clone(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    pub fn sanitize_json(value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, val)| {
                        let val = match key.as_str() {
                            "token" | "response_url" | "trigger_id" | "secret" => {
                                Value::String(REDACTED.to_string())
                            }
                            _ => Self::sanitize_json(val),
                        };
                        (key.clone(), val)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(Self::sanitize_json).collect()),
            _ => value.clone(),
        }
    }

    /// Form-encoded bodies (slash commands) with the verification token removed.
    pub fn sanitize_form(fields: &HashMap<String, String>) -> HashMap<String, String> {
        fields
            .iter()
            .map(|(key, value)| {
                let value = match key.as_str() {
                    "token" | "response_url" | "trigger_id" => REDACTED.to_string(),
                    _ => value.clone(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}
