use anyhow::Result;
use review_queue_core::{ShowOutcome, NO_PENDING_TEXT};
use tracing::{info, warn};

use super::publish::{publish_new, publish_update, reply};
use super::{FlowOutcome, QueueContext};
use crate::command::QueueCommand;
use crate::locator::LoadMode;

/// Fallback text of a re-posted queue message.
const SURFACED_TEXT: &str = "PRs are pending.";

pub async fn handle_command(
    ctx: &QueueContext,
    channel: &str,
    command: QueueCommand,
) -> Result<FlowOutcome> {
    info!("Running /prs {} in {}", command, channel);
    match command {
        QueueCommand::Show => show(ctx, channel).await,
        QueueCommand::Subscribe => {
            let text = if ctx.reminders.subscribe(channel).await {
                "This channel will get a reminder of pending PRs each weekday morning."
            } else {
                "This channel is already subscribed to morning reminders."
            };
            reply(ctx, channel, text).await
        }
        QueueCommand::Unsubscribe => {
            let text = if ctx.reminders.unsubscribe(channel).await {
                "This channel will no longer get morning reminders."
            } else {
                "This channel was not subscribed to morning reminders."
            };
            reply(ctx, channel, text).await
        }
        QueueCommand::ClearTombstones => clear_tombstones(ctx, channel).await,
        QueueCommand::StripDecoration => strip_decoration(ctx, channel).await,
    }
}

/// Re-post the queue so it is the newest message, moving the pin with it.
///
/// The old pin is only released once the new copy is pinned, so a refused
/// post leaves the existing queue in place.
async fn show(ctx: &QueueContext, channel: &str) -> Result<FlowOutcome> {
    let _guard = ctx.locks.lock(channel).await;
    let pinned = ctx.load(channel, LoadMode::Sanitized).await?;

    let state = match ctx.engine.show(pinned.as_ref().map(|p| &p.state)) {
        ShowOutcome::Surface(state) => state,
        ShowOutcome::NothingPending => return reply(ctx, channel, NO_PENDING_TEXT).await,
    };

    let outcome = publish_new(ctx, channel, &state, SURFACED_TEXT).await?;
    if let (FlowOutcome::Created(_), Some(old)) = (&outcome, &state.handle) {
        if let Err(e) = ctx.slack.remove_pin(&old.channel_id, &old.message_ts).await {
            // The new pin is newer, so the locator already prefers it.
            warn!("Failed to unpin superseded queue {}: {}", old, e);
        }
    }
    Ok(outcome)
}

async fn clear_tombstones(ctx: &QueueContext, channel: &str) -> Result<FlowOutcome> {
    let _guard = ctx.locks.lock(channel).await;
    let Some(pinned) = ctx.load(channel, LoadMode::Raw).await? else {
        return reply(ctx, channel, NO_PENDING_TEXT).await;
    };
    if pinned.state.tombstone_count() == 0 {
        return reply(ctx, channel, "There are no completed PRs to clear.").await;
    }

    let state = ctx.engine.clear_tombstones(&pinned.state);
    publish_update(ctx, &pinned.handle, &state).await
}

async fn strip_decoration(ctx: &QueueContext, channel: &str) -> Result<FlowOutcome> {
    let _guard = ctx.locks.lock(channel).await;
    let Some(pinned) = ctx.load(channel, LoadMode::Raw).await? else {
        return reply(ctx, channel, NO_PENDING_TEXT).await;
    };

    let state = ctx.engine.strip_decoration(&pinned.state);
    if state == pinned.state {
        return reply(ctx, channel, "There are no dividers to strip.").await;
    }
    publish_update(ctx, &pinned.handle, &state).await
}
