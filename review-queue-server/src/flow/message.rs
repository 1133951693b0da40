use anyhow::Result;
use review_queue_core::{QueueHandle, Submission};
use tracing::{debug, info, warn};

use super::publish::{publish_new, publish_update};
use super::{FlowOutcome, QueueContext};
use crate::locator::LoadMode;
use crate::slack::OutgoingMessage;

/// A plain user message posted in a channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub channel: String,
    pub user: String,
    pub text: String,
    pub ts: String,
}

/// Queue every code-host link in `message`.
pub async fn handle_message(ctx: &QueueContext, message: &IncomingMessage) -> Result<FlowOutcome> {
    if ctx.extractor.qualifying_links(&message.text).is_empty() {
        debug!("Message {} in {} has no PR links", message.ts, message.channel);
        return Ok(FlowOutcome::Ignored);
    }

    // Lookups that only decorate the entry; a failure leaves the field empty.
    let permalink = match ctx.slack.permalink(&message.channel, &message.ts).await {
        Ok(link) => Some(link),
        Err(e) => {
            warn!("No permalink for {}: {}", message.ts, e);
            None
        }
    };
    let avatar = match ctx.slack.user_avatar(&message.user).await {
        Ok(avatar) => avatar,
        Err(e) => {
            warn!("No avatar for {}: {}", message.user, e);
            None
        }
    };

    let entries = ctx.extractor.extract(&Submission {
        text: &message.text,
        submitter_id: &message.user,
        permalink: permalink.as_deref(),
        avatar_url: avatar.as_deref(),
        submitted_at: &message.ts,
    });
    let added = entries.len();

    let _guard = ctx.locks.lock(&message.channel).await;
    let pinned = ctx.load(&message.channel, LoadMode::Sanitized).await?;
    let Some(state) = ctx.engine.add(pinned.as_ref().map(|p| &p.state), entries) else {
        return Ok(FlowOutcome::Ignored);
    };

    let outcome = match &pinned {
        Some(pinned) => publish_update(ctx, &pinned.handle, &state).await?,
        None => publish_new(ctx, &message.channel, &state, &state.header_text()).await?,
    };
    info!(
        "Queued {} PR link(s) from {} in {}",
        added, message.user, message.channel
    );

    if ctx.settings.confirm_additions {
        if let FlowOutcome::Updated(handle) | FlowOutcome::Created(handle) = &outcome {
            let queue_link = match pinned.as_ref().and_then(|p| p.permalink.clone()) {
                Some(link) => Some(link),
                None => queue_permalink(ctx, handle).await,
            };
            let reply = OutgoingMessage::text(
                &message.channel,
                confirmation_text(added, queue_link.as_deref()),
            )
            .in_thread(&message.ts);
            if let Err(e) = ctx.slack.post_message(reply).await {
                warn!("Failed to confirm queued PRs to {}: {}", message.user, e);
            }
        }
    }

    Ok(outcome)
}

async fn queue_permalink(ctx: &QueueContext, handle: &QueueHandle) -> Option<String> {
    match ctx.slack.permalink(&handle.channel_id, &handle.message_ts).await {
        Ok(link) => Some(link),
        Err(e) => {
            warn!("No permalink for queue {}: {}", handle, e);
            None
        }
    }
}

pub fn confirmation_text(added: usize, queue_link: Option<&str>) -> String {
    let subject = if added == 1 {
        "Your PR has"
    } else {
        "Your PRs have"
    };
    match queue_link {
        Some(link) => format!("{} been added to the queue <{}|here>.", subject, link),
        None => format!("{} been added to the queue.", subject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::testing::{context, context_with, pinned_state, submit, CHANNEL};
    use crate::flow::QueueSettings;
    use crate::slack::SlackCall;
    use review_queue_core::{QueueItem, RetentionPolicy, MAX_BLOCKS};

    #[tokio::test]
    async fn test_first_link_creates_and_pins_queue() {
        let (slack, ctx) = context(RetentionPolicy::default());
        slack.set_avatar("U1", "https://avatars.example/u1.png");

        let outcome = submit(
            &slack,
            &ctx,
            "U1",
            "1700000000.000100",
            "check this out <http://github.com/org/repoA/pull/1>",
        )
        .await;

        let FlowOutcome::Created(handle) = outcome else {
            panic!("expected a new queue, got {:?}", outcome);
        };
        assert_eq!(slack.pins(CHANNEL), vec![handle.message_ts.clone()]);

        let state = pinned_state(&slack).await.unwrap();
        assert_eq!(state.header_text(), "There is 1 pending PR.");
        let entries: Vec<_> = state.entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].repo_label, "repoA");
        assert_eq!(entries[0].submitter_id, "U1");
        assert_eq!(entries[0].excerpt, "check this out");
        assert_eq!(entries[0].index, 0);
        assert_eq!(
            entries[0].submitter_avatar_url.as_deref(),
            Some("https://avatars.example/u1.png")
        );
        assert!(entries[0].source_permalink.is_some());

        let stored = slack.message(CHANNEL, &handle.message_ts).unwrap();
        assert_eq!(stored.text, "There is 1 pending PR.");
    }

    #[tokio::test]
    async fn test_second_submission_updates_in_place() {
        let (slack, ctx) = context(RetentionPolicy::default());
        let first = submit(&slack, &ctx, "U1", "1.000001", "<https://github.com/o/repoA/pull/1>").await;
        let second = submit(
            &slack,
            &ctx,
            "U2",
            "1.000002",
            "two more <https://github.com/o/repoB/pull/2> <https://github.com/o/other/pull/3>",
        )
        .await;

        let FlowOutcome::Created(handle) = first else {
            panic!("expected a new queue, got {:?}", first);
        };
        assert_eq!(second, FlowOutcome::Updated(handle));
        assert_eq!(slack.pins(CHANNEL).len(), 1);

        let state = pinned_state(&slack).await.unwrap();
        assert_eq!(state.header_text(), "There are 3 pending PRs.");
        let labels: Vec<_> = state.entries().map(|e| e.repo_label.as_str()).collect();
        assert_eq!(labels, vec!["repoA", "repoB", "unknown"]);
        let indices: Vec<_> = state.entries().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_message_without_links_touches_nothing() {
        let (slack, ctx) = context(RetentionPolicy::default());
        let outcome = submit(&slack, &ctx, "U1", "1.0", "lunch? <https://example.com/menu>").await;

        assert_eq!(outcome, FlowOutcome::Ignored);
        assert!(slack.calls().is_empty());
    }

    #[tokio::test]
    async fn test_confirmation_reply_in_thread() {
        let (slack, ctx) = context(RetentionPolicy::default());
        submit(&slack, &ctx, "U1", "1.000001", "<https://github.com/o/repoA/pull/1>").await;
        submit(
            &slack,
            &ctx,
            "U1",
            "1.000002",
            "<https://github.com/o/repoA/pull/2> <https://github.com/o/repoA/pull/3>",
        )
        .await;

        let replies: Vec<_> = slack
            .bot_messages(CHANNEL)
            .into_iter()
            .filter(|m| m.thread_ts.is_some())
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].thread_ts.as_deref(), Some("1.000001"));
        assert!(replies[0]
            .text
            .starts_with("Your PR has been added to the queue <https://"));
        assert!(replies[1]
            .text
            .starts_with("Your PRs have been added to the queue <https://"));
    }

    #[tokio::test]
    async fn test_confirmation_can_be_disabled() {
        let settings = QueueSettings {
            confirm_additions: false,
            ..QueueSettings::default()
        };
        let (slack, ctx) = context_with(RetentionPolicy::default(), settings);
        submit(&slack, &ctx, "U1", "1.0", "<https://github.com/o/repoA/pull/1>").await;

        assert!(!slack.calls().iter().any(|call| matches!(
            call,
            SlackCall::PostMessage {
                thread_ts: Some(_),
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_lookup_failures_still_queue() {
        let (slack, ctx) = context(RetentionPolicy::default());
        slack.fail("users.profile.get");
        slack.fail("chat.getPermalink");

        let outcome = submit(&slack, &ctx, "U1", "1.0", "<https://github.com/o/repoA/pull/1>").await;
        assert!(matches!(outcome, FlowOutcome::Created(_)));

        let state = pinned_state(&slack).await.unwrap();
        let entry = state.entries().next().unwrap();
        assert_eq!(entry.source_permalink, None);
        assert_eq!(entry.submitter_avatar_url, None);

        let reply = slack
            .bot_messages(CHANNEL)
            .into_iter()
            .find(|m| m.thread_ts.is_some())
            .unwrap();
        assert_eq!(reply.text, "Your PR has been added to the queue.");
    }

    #[tokio::test]
    async fn test_oversized_queue_posts_warning_and_keeps_pin() {
        let (slack, ctx) = context(RetentionPolicy::default());
        // Header + leading divider, then section + context + divider per entry.
        let fitting = (MAX_BLOCKS - 2) / 3;
        let links: Vec<String> = (0..fitting)
            .map(|n| format!("<https://github.com/o/repoA/pull/{}>", n))
            .collect();
        let outcome = submit(&slack, &ctx, "U1", "1.000001", &links.join(" ")).await;
        let FlowOutcome::Created(handle) = outcome else {
            panic!("expected a new queue, got {:?}", outcome);
        };
        let before = slack.message(CHANNEL, &handle.message_ts).unwrap();

        let outcome = submit(
            &slack,
            &ctx,
            "U2",
            "1.000002",
            "one too many <https://github.com/o/repoB/pull/99>",
        )
        .await;

        assert_eq!(outcome, FlowOutcome::Rejected);
        assert_eq!(slack.message(CHANNEL, &handle.message_ts).unwrap(), before);
        assert!(slack
            .bot_messages(CHANNEL)
            .iter()
            .any(|m| m.text == crate::flow::TOO_LARGE_WARNING));
        assert_eq!(slack.pins(CHANNEL), vec![handle.message_ts]);
    }

    #[tokio::test]
    async fn test_platform_block_rejection_posts_warning() {
        let (slack, ctx) = context(RetentionPolicy::default());
        slack.reject_blocks("invalid_blocks");

        let outcome = submit(&slack, &ctx, "U1", "1.0", "<https://github.com/o/repoA/pull/1>").await;

        assert_eq!(outcome, FlowOutcome::Rejected);
        assert!(slack.pins(CHANNEL).is_empty());
        let texts: Vec<_> = slack.bot_messages(CHANNEL).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec![crate::flow::TOO_LARGE_WARNING.to_string()]);
    }

    #[tokio::test]
    async fn test_tombstones_cleared_on_next_addition() {
        let (slack, ctx) = context(RetentionPolicy::TombstoneUntilNextLoad);
        submit(
            &slack,
            &ctx,
            "U1",
            "1.000001",
            "<https://github.com/o/repoA/pull/1> <https://github.com/o/repoA/pull/2>",
        )
        .await;
        crate::flow::handle_remove_action(
            &ctx,
            &crate::flow::RemoveAction {
                channel: CHANNEL.to_string(),
                message_ts: None,
                value: "0".to_string(),
                user: "U9".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(pinned_state(&slack).await.unwrap().tombstone_count(), 1);

        submit(&slack, &ctx, "U1", "1.000003", "<https://github.com/o/repoA/pull/3>").await;

        let state = pinned_state(&slack).await.unwrap();
        assert_eq!(state.tombstone_count(), 0);
        assert!(state.items.iter().all(|item| !matches!(item, QueueItem::Tombstone)));
        let indices: Vec<_> = state.entries().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_are_not_lost() {
        let (slack, ctx) = context(RetentionPolicy::default());
        let ctx = std::sync::Arc::new(ctx);

        let mut handles = Vec::new();
        for n in 0..8 {
            let slack = slack.clone();
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                let text = format!("<https://github.com/o/repoA/pull/{}>", n);
                submit(&slack, &ctx, "U1", &format!("1.{:06}", n), &text).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let state = pinned_state(&slack).await.unwrap();
        assert_eq!(state.active_count(), 8);
        assert_eq!(slack.pins(CHANNEL).len(), 1);
    }

    #[test]
    fn test_confirmation_text() {
        assert_eq!(
            confirmation_text(1, Some("https://x/p1")),
            "Your PR has been added to the queue <https://x/p1|here>."
        );
        assert_eq!(
            confirmation_text(3, None),
            "Your PRs have been added to the queue."
        );
    }
}
