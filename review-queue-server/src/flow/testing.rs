//! Shared fixtures for handler tests.

use review_queue_core::{Extractor, QueueEngine, QueueState, RetentionPolicy};
use std::sync::Arc;

use super::{handle_message, FlowOutcome, IncomingMessage, QueueContext, QueueSettings};
use crate::locator::{load_queue, LoadMode};
use crate::slack::InMemorySlack;

pub(crate) const BOT: &str = "UBOT";
pub(crate) const CHANNEL: &str = "C1";

pub(crate) fn context_with(
    policy: RetentionPolicy,
    settings: QueueSettings,
) -> (Arc<InMemorySlack>, QueueContext) {
    let slack = Arc::new(InMemorySlack::new(BOT));
    let ctx = QueueContext::new(
        slack.clone(),
        BOT,
        Extractor::new(vec!["repoA".to_string(), "repoB".to_string()]),
        QueueEngine::new(policy),
        settings,
    );
    (slack, ctx)
}

pub(crate) fn context(policy: RetentionPolicy) -> (Arc<InMemorySlack>, QueueContext) {
    context_with(policy, QueueSettings::default())
}

/// Seed `text` from `user` at `ts` and run it through the message handler.
pub(crate) async fn submit(
    slack: &InMemorySlack,
    ctx: &QueueContext,
    user: &str,
    ts: &str,
    text: &str,
) -> FlowOutcome {
    slack.seed_message(CHANNEL, ts, user, text);
    handle_message(
        ctx,
        &IncomingMessage {
            channel: CHANNEL.to_string(),
            user: user.to_string(),
            text: text.to_string(),
            ts: ts.to_string(),
        },
    )
    .await
    .unwrap()
}

pub(crate) async fn pinned_state(slack: &InMemorySlack) -> Option<QueueState> {
    load_queue(slack, &QueueEngine::default(), CHANNEL, BOT, LoadMode::Raw)
        .await
        .unwrap()
        .map(|pinned| pinned.state)
}
