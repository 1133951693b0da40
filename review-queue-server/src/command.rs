//! `/prs` slash-command parsing.

use std::fmt;

/// Name the command is registered under in the Slack app.
pub const COMMAND_NAME: &str = "/prs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCommand {
    /// Re-post and re-pin the queue at the bottom of the channel.
    Show,
    Subscribe,
    Unsubscribe,
    /// Drop completed placeholders from the queue.
    ClearTombstones,
    /// Drop the dividers between entries.
    StripDecoration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    Command(QueueCommand),
    Unrecognized(String),
}

impl fmt::Display for QueueCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueCommand::Show => "show",
            QueueCommand::Subscribe => "subscribe",
            QueueCommand::Unsubscribe => "unsubscribe",
            QueueCommand::ClearTombstones => "clear",
            QueueCommand::StripDecoration => "strip",
        };
        f.write_str(name)
    }
}

/// Parse the text after the command name. Only the first word counts.
pub fn parse_command(text: &str) -> ParseResult {
    let word = text.split_whitespace().next().unwrap_or("").to_lowercase();
    let command = match word.as_str() {
        "" | "show" | "list" => QueueCommand::Show,
        "subscribe" | "remind" => QueueCommand::Subscribe,
        "unsubscribe" | "stop" => QueueCommand::Unsubscribe,
        "clear" | "clear-completed" => QueueCommand::ClearTombstones,
        "strip" | "strip-dividers" => QueueCommand::StripDecoration,
        _ => return ParseResult::Unrecognized(word),
    };
    ParseResult::Command(command)
}

pub fn usage() -> String {
    format!(
        "Usage: `{name} [show|subscribe|unsubscribe|clear|strip]`\n\
         • `show`: re-post the pending PR queue at the bottom of the channel\n\
         • `subscribe` / `unsubscribe`: toggle the weekday morning reminder\n\
         • `clear`: remove completed entries from the queue\n\
         • `strip`: remove the dividers between entries",
        name = COMMAND_NAME
    )
}
