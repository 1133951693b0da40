use anyhow::{anyhow, Context, Result};
use chrono::Weekday;
use review_queue_core::RetentionPolicy;
use std::env;

use crate::slack::DEFAULT_API_BASE;

pub const DEFAULT_COMPLETION_REACTIONS: &str = "white_check_mark,heavy_check_mark";
pub const DEFAULT_REMINDER_DAYS: &str = "mon,tue,wed,thu,fri";

#[derive(Clone)]
pub struct Config {
    pub slack_bot_token: String,
    pub slack_signing_secret: String,
    /// When unset the bot's user id is discovered with `auth.test`.
    pub slack_bot_user_id: Option<String>,
    pub slack_api_base: String,
    pub port: u16,
    /// Ordered; the first identifier contained in a link names its repo.
    pub org_repos: Vec<String>,
    pub tombstone_policy: RetentionPolicy,
    pub confirm_additions: bool,
    pub completion_reactions: Vec<String>,
    pub reminder_days: Vec<Weekday>,
    pub reminder_hour: u32,
    pub reminder_utc_offset_hours: i32,
    pub recording_enabled: bool,
    pub recording_log_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let slack_bot_token = var("SLACK_BOT_TOKEN")
            .context("SLACK_BOT_TOKEN environment variable is required")?;

        let slack_signing_secret = var("SLACK_SIGNING_SECRET")
            .context("SLACK_SIGNING_SECRET environment variable is required")?;

        let slack_bot_user_id = var("SLACK_BOT_USER_ID").map(|id| id.trim().to_string());

        let slack_api_base = var("SLACK_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let port = var("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let org_repos = parse_list(&var("ORG_REPOS").unwrap_or_default());

        let tombstone_policy = match var("TOMBSTONE_POLICY") {
            Some(value) => value
                .parse::<RetentionPolicy>()
                .map_err(|e| anyhow!(e))
                .context("TOMBSTONE_POLICY must be discard, until-next-load or permanent")?,
            None => RetentionPolicy::default(),
        };

        let confirm_additions = match var("CONFIRM_ADDITIONS") {
            Some(value) => parse_bool(&value).context("CONFIRM_ADDITIONS must be true or false")?,
            None => true,
        };

        let completion_reactions = parse_list(
            &var("COMPLETION_REACTIONS").unwrap_or_else(|| DEFAULT_COMPLETION_REACTIONS.to_string()),
        )
        .into_iter()
        .map(|name| name.trim_matches(':').to_string())
        .collect();

        let reminder_days =
            parse_weekdays(&var("REMINDER_DAYS").unwrap_or_else(|| DEFAULT_REMINDER_DAYS.to_string()))?;

        let reminder_hour = var("REMINDER_HOUR")
            .unwrap_or_else(|| "9".to_string())
            .parse::<u32>()
            .ok()
            .filter(|hour| *hour < 24)
            .context("REMINDER_HOUR must be an hour between 0 and 23")?;

        let reminder_utc_offset_hours = var("REMINDER_UTC_OFFSET_HOURS")
            .unwrap_or_else(|| "0".to_string())
            .parse::<i32>()
            .ok()
            .filter(|offset| (-23..=23).contains(offset))
            .context("REMINDER_UTC_OFFSET_HOURS must be between -23 and 23")?;

        let recording_enabled = var("RECORDING_ENABLED")
            .and_then(|value| parse_bool(&value).ok())
            .unwrap_or(false);

        let recording_log_path =
            var("RECORDING_LOG_PATH").unwrap_or_else(|| "recordings.jsonl".to_string());

        Ok(Config {
            slack_bot_token,
            slack_signing_secret,
            slack_bot_user_id,
            slack_api_base,
            port,
            org_repos,
            tombstone_policy,
            confirm_additions,
            completion_reactions,
            reminder_days,
            reminder_hour,
            reminder_utc_offset_hours,
            recording_enabled,
            recording_log_path,
        })
    }
}

/// Comma-separated values, trimmed, empties dropped, order kept.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_weekdays(value: &str) -> Result<Vec<Weekday>> {
    let mut days = Vec::new();
    for name in parse_list(value) {
        let day = name
            .parse::<Weekday>()
            .map_err(|_| anyhow!("Unrecognized weekday in REMINDER_DAYS: {}", name))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("not a boolean: {}", other)),
    }
}
