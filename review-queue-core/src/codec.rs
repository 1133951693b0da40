//! Mapping between [`QueueState`] and the blocks of the pinned message.
//!
//! Layout (payload version 1):
//!
//! ```text
//! header   "There are N pending PRs."
//! divider
//! section  "<@U>'s repo pull request:\n<link>\n> excerpt <permalink|...→>"
//!          + "Complete" button, value = JSON entry payload
//! context  [avatar image], "submitted <date>"
//! divider
//! section  ":white_check_mark: Completed"      (tombstone)
//! ...
//! ```
//!
//! Every entry field travels in the button value, so decoding never depends
//! on the rendered text. Messages written before the payload existed carry a
//! bare integer as the button value; those are decoded from the rendered
//! text, where the link sits on the second line.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::blocks::{Accessory, Block, Button, ContextElement, Text};
use crate::error::QueueError;
use crate::state::{QueueEntry, QueueItem, QueueState};

/// Action id of the "Complete" button.
pub const REMOVE_ACTION_ID: &str = "remove_from_queue";

/// Sentinel text of a tombstone.
pub const COMPLETED_TEXT: &str = ":white_check_mark: Completed";

/// Slack rejects messages with more blocks than this.
pub const MAX_BLOCKS: usize = 50;

pub const PAYLOAD_VERSION: u32 = 1;

/// Slack's limit on a button `value`.
pub const MAX_BUTTON_VALUE_LEN: usize = 2000;

const COMPLETE_BUTTON_TEXT: &str = "Complete";
const PERMALINK_LABEL: &str = "...→";
// Label as written by the legacy renderer after a lossy re-encoding.
const LEGACY_PERMALINK_LABEL: &str = "...â†’";
const DATE_PREFIX: &str = "<!date^";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct EntryPayload {
    v: u32,
    index: u32,
    link: String,
    submitter: String,
    repo: String,
    excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permalink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avatar: Option<String>,
    submitted_at: String,
}

impl EntryPayload {
    fn from_entry(entry: &QueueEntry) -> Self {
        Self {
            v: PAYLOAD_VERSION,
            index: entry.index,
            link: entry.link_url.clone(),
            submitter: entry.submitter_id.clone(),
            repo: entry.repo_label.clone(),
            excerpt: entry.excerpt.clone(),
            permalink: entry.source_permalink.clone(),
            avatar: entry.submitter_avatar_url.clone(),
            submitted_at: entry.submitted_at.clone(),
        }
    }

    fn into_entry(self) -> QueueEntry {
        QueueEntry {
            submitter_id: self.submitter,
            repo_label: self.repo,
            link_url: self.link,
            excerpt: self.excerpt,
            source_permalink: self.permalink,
            submitter_avatar_url: self.avatar,
            submitted_at: self.submitted_at,
            index: self.index,
        }
    }
}

/// Render the full block list for `state`.
pub fn encode(state: &QueueState) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(1 + state.items.len() * 2);
    blocks.push(Block::header(state.header_text()));

    for item in &state.items {
        match item {
            QueueItem::Entry(entry) => {
                blocks.push(entry_section(entry));
                blocks.push(entry_context(entry));
            }
            QueueItem::Tombstone => blocks.push(Block::plain_section(COMPLETED_TEXT)),
            QueueItem::Separator => blocks.push(Block::Divider),
        }
    }

    blocks
}

/// [`encode`], refusing layouts Slack would reject for size.
pub fn encode_checked(state: &QueueState) -> Result<Vec<Block>, QueueError> {
    let blocks = encode(state);
    if blocks.len() > MAX_BLOCKS {
        return Err(QueueError::TooManyBlocks {
            count: blocks.len(),
            limit: MAX_BLOCKS,
        });
    }
    Ok(blocks)
}

pub fn render_entry_text(entry: &QueueEntry) -> String {
    let mut quote = format!("> {}", entry.excerpt);
    if let Some(permalink) = &entry.source_permalink {
        quote.push_str(&format!(" <{}|{}>", permalink, PERMALINK_LABEL));
    }
    format!(
        "<@{}>'s {} pull request:\n{}\n{}",
        entry.submitter_id, entry.repo_label, entry.link_url, quote
    )
}

fn entry_section(entry: &QueueEntry) -> Block {
    // Oversized payloads fall back to the legacy bare index; the rendered
    // text still carries the link.
    let value = serde_json::to_string(&EntryPayload::from_entry(entry))
        .ok()
        .filter(|payload| payload.len() <= MAX_BUTTON_VALUE_LEN)
        .unwrap_or_else(|| entry.index.to_string());

    Block::Section {
        text: Some(Text::mrkdwn(render_entry_text(entry))),
        accessory: Some(Accessory::Button(Button {
            text: Text::plain(COMPLETE_BUTTON_TEXT),
            style: Some("primary".to_string()),
            value,
            action_id: REMOVE_ACTION_ID.to_string(),
        })),
    }
}

fn entry_context(entry: &QueueEntry) -> Block {
    let mut elements = Vec::with_capacity(2);
    if let Some(avatar) = entry.submitter_avatar_url.as_deref().filter(|a| !a.is_empty()) {
        elements.push(ContextElement::Image {
            image_url: avatar.to_string(),
            alt_text: entry.submitter_id.clone(),
        });
    }
    elements.push(ContextElement::Mrkdwn {
        text: submitted_text(&entry.submitted_at),
    });
    Block::Context { elements }
}

fn submitted_text(submitted_at: &str) -> String {
    match submitted_at.parse::<f64>() {
        Ok(secs) if secs.is_finite() => format!(
            "{}{}^submitted {{date_short_pretty}} at {{time}}|submitted some time ago>",
            DATE_PREFIX, secs as i64
        ),
        _ => "submitted some time ago".to_string(),
    }
}

/// Decode raw blocks as returned by the Slack API. Blocks that are not part
/// of the queue layout are skipped, never fatal.
pub fn decode(raw: &[serde_json::Value]) -> QueueState {
    let blocks: Vec<Block> = raw
        .iter()
        .enumerate()
        .filter_map(
            |(position, value)| match serde_json::from_value::<Block>(value.clone()) {
                Ok(block) => Some(block),
                Err(e) => {
                    warn!("Skipping unreadable block at position {}: {}", position, e);
                    None
                }
            },
        )
        .collect();
    decode_blocks(&blocks)
}

pub fn decode_blocks(blocks: &[Block]) -> QueueState {
    let mut items = Vec::new();
    let mut position = 0;

    while position < blocks.len() {
        let block = &blocks[position];
        position += 1;

        match block {
            // The header is derived from the entries.
            Block::Header { .. } => {}
            Block::Divider => items.push(QueueItem::Separator),
            Block::Context { .. } => {
                warn!("Skipping context block that follows no queue entry");
            }
            Block::Section { .. } => {
                if let Some(button) = block.button().filter(|b| b.action_id == REMOVE_ACTION_ID) {
                    let context = match blocks.get(position) {
                        Some(Block::Context { elements }) => {
                            position += 1;
                            Some(elements.as_slice())
                        }
                        _ => None,
                    };
                    let text = block.section_text().unwrap_or_default();
                    match decode_entry(text, &button.value, context) {
                        Some(entry) => items.push(QueueItem::Entry(entry)),
                        None => warn!("Skipping queue entry with unreadable value {:?}", button.value),
                    }
                } else if block.section_text() == Some(COMPLETED_TEXT) {
                    items.push(QueueItem::Tombstone);
                } else {
                    warn!("Skipping section block that is not part of the queue layout");
                }
            }
        }
    }

    QueueState {
        handle: None,
        items,
    }
}

/// Index targeted by a "Complete" button value.
pub fn parse_action_value(value: &str) -> Option<u32> {
    match serde_json::from_str::<EntryPayload>(value) {
        Ok(payload) => Some(payload.index),
        Err(_) => value.trim().parse().ok(),
    }
}

fn decode_entry(text: &str, value: &str, context: Option<&[ContextElement]>) -> Option<QueueEntry> {
    if let Ok(payload) = serde_json::from_str::<EntryPayload>(value) {
        if payload.v != PAYLOAD_VERSION {
            warn!("Unsupported entry payload version {}", payload.v);
            return None;
        }
        return Some(payload.into_entry());
    }

    let index = value.trim().parse::<u32>().ok()?;
    decode_legacy_entry(text, index, context)
}

fn decode_legacy_entry(
    text: &str,
    index: u32,
    context: Option<&[ContextElement]>,
) -> Option<QueueEntry> {
    let mut lines = text.splitn(3, '\n');
    let (submitter_id, repo_label) = parse_title(lines.next()?)?;
    let link_url = lines
        .next()?
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string();
    if link_url.is_empty() {
        return None;
    }
    let (excerpt, source_permalink) = parse_quote(lines.next().unwrap_or_default());

    let mut submitter_avatar_url = None;
    let mut submitted_at = String::new();
    for element in context.unwrap_or_default() {
        match element {
            ContextElement::Image { image_url, .. } if !image_url.is_empty() => {
                submitter_avatar_url = Some(image_url.clone());
            }
            ContextElement::Mrkdwn { text } => {
                if let Some(epoch) = text
                    .strip_prefix(DATE_PREFIX)
                    .and_then(|rest| rest.split('^').next())
                {
                    submitted_at = epoch.to_string();
                }
            }
            _ => {}
        }
    }

    Some(QueueEntry {
        submitter_id,
        repo_label,
        link_url,
        excerpt,
        source_permalink,
        submitter_avatar_url,
        submitted_at,
        index,
    })
}

// "<@U123>'s repo pull request:"
fn parse_title(title: &str) -> Option<(String, String)> {
    let rest = title.strip_prefix("<@")?;
    let (submitter, rest) = rest.split_once(">'s ")?;
    let repo = rest.strip_suffix(" pull request:")?;
    Some((submitter.to_string(), repo.to_string()))
}

// "> excerpt <permalink|...→>"
fn parse_quote(quote: &str) -> (String, Option<String>) {
    let body = quote
        .strip_prefix("> ")
        .or_else(|| quote.strip_prefix('>'))
        .unwrap_or(quote);

    for label in [PERMALINK_LABEL, LEGACY_PERMALINK_LABEL] {
        let suffix = format!("|{}>", label);
        if let Some(without) = body.strip_suffix(suffix.as_str()) {
            if let Some(start) = without.rfind(" <") {
                return (
                    without[..start].to_string(),
                    Some(without[start + 2..].to_string()),
                );
            }
        }
    }

    (body.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(index: u32, link: &str) -> QueueEntry {
        QueueEntry {
            submitter_id: "U42".to_string(),
            repo_label: "repoA".to_string(),
            link_url: link.to_string(),
            excerpt: "please look\n> at this".to_string(),
            source_permalink: Some("https://t.slack.com/archives/C1/p1".to_string()),
            submitter_avatar_url: Some("https://avatars.example/u42.png".to_string()),
            submitted_at: "1700000000.000100".to_string(),
            index,
        }
    }

    #[test]
    fn test_scaffold_encodes_header_and_divider() {
        let blocks = encode(&QueueState::scaffold());
        assert_eq!(
            serde_json::to_value(&blocks).unwrap(),
            json!([
                {"type": "header", "text": {"type": "plain_text", "text": "There are 0 pending PRs."}},
                {"type": "divider"}
            ])
        );
    }

    #[test]
    fn test_entry_cluster_layout() {
        let mut state = QueueState::scaffold();
        state.items.push(QueueItem::Entry(entry(0, "https://github.com/o/a/pull/1")));
        state.items.push(QueueItem::Separator);

        let blocks = encode(&state);
        assert_eq!(blocks.len(), 5);
        assert_eq!(blocks[0], Block::header("There is 1 pending PR."));

        let button = blocks[2].button().expect("entry section carries a button");
        assert_eq!(button.action_id, REMOVE_ACTION_ID);
        assert_eq!(parse_action_value(&button.value), Some(0));

        let text = blocks[2].section_text().unwrap();
        assert_eq!(
            text.lines().nth(1),
            Some("https://github.com/o/a/pull/1"),
            "link must stay on the second line"
        );
        assert!(text.starts_with("<@U42>'s repoA pull request:"));

        match &blocks[3] {
            Block::Context { elements } => {
                assert_eq!(elements.len(), 2);
                assert_eq!(
                    elements[1],
                    ContextElement::Mrkdwn {
                        text: "<!date^1700000000^submitted {date_short_pretty} at {time}|submitted some time ago>"
                            .to_string()
                    }
                );
            }
            other => panic!("expected context block, got {:?}", other),
        }
        assert_eq!(blocks[4], Block::Divider);
    }

    #[test]
    fn test_context_omits_missing_avatar() {
        let mut without_avatar = entry(0, "https://github.com/o/a/pull/1");
        without_avatar.submitter_avatar_url = None;
        match entry_context(&without_avatar) {
            Block::Context { elements } => {
                assert_eq!(elements.len(), 1);
                assert!(matches!(elements[0], ContextElement::Mrkdwn { .. }));
            }
            other => panic!("expected context block, got {:?}", other),
        }
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut state = QueueState::scaffold();
        state.items.push(QueueItem::Entry(entry(0, "https://github.com/o/a/pull/1")));
        state.items.push(QueueItem::Separator);
        state.items.push(QueueItem::Tombstone);
        state.items.push(QueueItem::Entry(entry(2, "https://github.com/o/b/pull/2")));
        state.items.push(QueueItem::Separator);

        let raw: Vec<serde_json::Value> = encode(&state)
            .iter()
            .map(|b| serde_json::to_value(b).unwrap())
            .collect();
        assert_eq!(decode(&raw), state);
    }

    #[test]
    fn test_decodes_legacy_layout() {
        // Layout written by the previous renderer: integer button values,
        // link on the second line, timestamp only in the context block.
        let raw = json!([
            {"type": "header", "text": {"type": "plain_text", "text": "There are 2 pending PRs."}},
            {"type": "divider"},
            {
                "type": "section",
                "text": {"type": "mrkdwn", "text": "<@U1>'s repoA pull request:\nhttps://github.com/o/repoA/pull/7>\n> ship it <https://t.slack.com/p1|...â†’>"},
                "accessory": {"type": "button", "text": {"type": "plain_text", "text": "Complete"}, "style": "primary", "value": "0", "action_id": "remove_from_queue"}
            },
            {
                "type": "context",
                "elements": [
                    {"type": "image", "image_url": "https://a.example/1.png", "alt_text": "U1"},
                    {"type": "mrkdwn", "text": "<!date^1700000000^submitted {date_short_pretty} at {time}|submitted some time ago>"}
                ]
            },
            {"type": "divider"},
            {"type": "section", "text": {"type": "plain_text", "text": ":white_check_mark: Completed"}},
            {
                "type": "section",
                "text": {"type": "mrkdwn", "text": "<@U2>'s unknown pull request:\nhttps://github.com/o/x/pull/9\n> "},
                "accessory": {"type": "button", "text": {"type": "plain_text", "text": "Complete"}, "style": "primary", "value": "1", "action_id": "remove_from_queue"}
            },
            {"type": "context", "elements": [{"type": "mrkdwn", "text": "<!date^1700000100^x|y>"}]},
            {"type": "divider"}
        ]);
        let raw = raw.as_array().unwrap().clone();

        let state = decode(&raw);
        let entries: Vec<&QueueEntry> = state.entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(state.tombstone_count(), 1);

        assert_eq!(entries[0].index, 0);
        assert_eq!(entries[0].submitter_id, "U1");
        assert_eq!(entries[0].repo_label, "repoA");
        assert_eq!(entries[0].link_url, "https://github.com/o/repoA/pull/7");
        assert_eq!(entries[0].excerpt, "ship it");
        assert_eq!(
            entries[0].source_permalink.as_deref(),
            Some("https://t.slack.com/p1")
        );
        assert_eq!(
            entries[0].submitter_avatar_url.as_deref(),
            Some("https://a.example/1.png")
        );
        assert_eq!(entries[0].submitted_at, "1700000000");

        assert_eq!(entries[1].index, 1);
        assert_eq!(entries[1].excerpt, "");
        assert_eq!(entries[1].source_permalink, None);
        assert_eq!(entries[1].submitted_at, "1700000100");
    }

    #[test]
    fn test_corrupt_units_are_skipped() {
        let good = entry(1, "https://github.com/o/a/pull/1");
        let mut raw: Vec<serde_json::Value> = encode(&QueueState {
            handle: None,
            items: vec![QueueItem::Entry(good.clone())],
        })
        .iter()
        .map(|b| serde_json::to_value(b).unwrap())
        .collect();

        // A hand-edited button whose value is garbage, an unknown block type
        // and a stray context block.
        raw.push(json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": "edited by hand"},
            "accessory": {"type": "button", "text": {"type": "plain_text", "text": "Complete"}, "value": "oops", "action_id": "remove_from_queue"}
        }));
        raw.push(json!({"type": "rich_text", "elements": []}));
        raw.push(json!({"type": "context", "elements": []}));
        raw.push(json!({"type": "section", "text": {"type": "mrkdwn", "text": "random note"}}));

        let state = decode(&raw);
        assert_eq!(state.items, vec![QueueItem::Entry(good)]);
    }

    #[test]
    fn test_future_payload_version_is_skipped() {
        let value = json!({
            "v": 2, "index": 0, "link": "https://github.com/o/a/pull/1",
            "submitter": "U1", "repo": "r", "excerpt": "", "submitted_at": "1"
        })
        .to_string();
        assert_eq!(decode_entry("", &value, None), None);
    }

    #[test]
    fn test_oversized_payload_falls_back_to_bare_index() {
        let link = format!("https://github.com/o/a/pull/1?{}", "x".repeat(MAX_BUTTON_VALUE_LEN));
        let mut state = QueueState::scaffold();
        state.items.push(QueueItem::Entry(entry(3, &link)));
        state.items.push(QueueItem::Separator);

        let blocks = encode(&state);
        let button = blocks[2].button().unwrap();
        assert_eq!(button.value, "3");
        assert_eq!(parse_action_value(&button.value), Some(3));

        let raw: Vec<serde_json::Value> = blocks
            .iter()
            .map(|b| serde_json::to_value(b).unwrap())
            .collect();
        let decoded = decode(&raw);
        let entries: Vec<&QueueEntry> = decoded.entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index, 3);
        assert_eq!(entries[0].link_url, link);
        assert_eq!(entries[0].submitter_id, "U42");
        assert_eq!(entries[0].repo_label, "repoA");
    }

    #[test]
    fn test_parse_action_value() {
        assert_eq!(parse_action_value("3"), Some(3));
        assert_eq!(parse_action_value(" 12 "), Some(12));
        assert_eq!(parse_action_value(""), None);
        assert_eq!(parse_action_value("-1"), None);
    }

    #[test]
    fn test_encode_checked_enforces_block_limit() {
        let mut state = QueueState::scaffold();
        for i in 0..16 {
            state.items.push(QueueItem::Entry(entry(i, "https://github.com/o/a/pull/1")));
            state.items.push(QueueItem::Separator);
        }
        // 1 header + 1 divider + 16 * 3 = 50 blocks: still allowed.
        assert_eq!(encode_checked(&state).map(|b| b.len()), Ok(50));

        state.items.push(QueueItem::Tombstone);
        assert_eq!(
            encode_checked(&state),
            Err(QueueError::TooManyBlocks {
                count: 51,
                limit: MAX_BLOCKS
            })
        );
    }
}
