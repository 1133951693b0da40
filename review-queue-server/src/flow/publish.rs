use anyhow::{Context, Result};
use review_queue_core::{encode_checked, Block, QueueError, QueueHandle, QueueState};
use tracing::{info, warn};

use super::{FlowOutcome, QueueContext};
use crate::slack::{OutgoingMessage, SlackError};

pub const TOO_LARGE_WARNING: &str = ":warning: The review queue has grown too large to update. \
     Complete some PRs or run `/prs clear` to make room.";

/// Encode `state`, posting the size warning instead when it cannot fit.
async fn encode_or_warn(ctx: &QueueContext, channel: &str, state: &QueueState) -> Result<Option<Vec<Block>>> {
    match encode_checked(state) {
        Ok(blocks) => Ok(Some(blocks)),
        Err(QueueError::TooManyBlocks { count, limit }) => {
            warn!(
                "Queue in {} would need {} blocks (limit {}), not updating",
                channel, count, limit
            );
            post_warning(ctx, channel).await?;
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

async fn post_warning(ctx: &QueueContext, channel: &str) -> Result<()> {
    ctx.slack
        .post_message(OutgoingMessage::text(channel, TOO_LARGE_WARNING))
        .await
        .context("Failed to post the queue size warning")?;
    Ok(())
}

/// Rewrite the pinned message at `handle` with `state`.
pub(crate) async fn publish_update(
    ctx: &QueueContext,
    handle: &QueueHandle,
    state: &QueueState,
) -> Result<FlowOutcome> {
    let Some(blocks) = encode_or_warn(ctx, &handle.channel_id, state).await? else {
        return Ok(FlowOutcome::Rejected);
    };

    match ctx
        .slack
        .update_message(&handle.channel_id, &handle.message_ts, &state.header_text(), &blocks)
        .await
    {
        Ok(()) => {
            info!("Updated queue {}: {}", handle, state.header_text());
            Ok(FlowOutcome::Updated(handle.clone()))
        }
        Err(e) if e.is_block_rejection() => reject(ctx, &handle.channel_id, e).await,
        Err(e) => Err(e).with_context(|| format!("Failed to update queue {}", handle)),
    }
}

/// Post `state` as a new message in `channel` and pin it.
pub(crate) async fn publish_new(
    ctx: &QueueContext,
    channel: &str,
    state: &QueueState,
    text: &str,
) -> Result<FlowOutcome> {
    let Some(blocks) = encode_or_warn(ctx, channel, state).await? else {
        return Ok(FlowOutcome::Rejected);
    };

    let posted = match ctx
        .slack
        .post_message(OutgoingMessage::text(channel, text).with_blocks(blocks))
        .await
    {
        Ok(posted) => posted,
        Err(e) if e.is_block_rejection() => return reject(ctx, channel, e).await,
        Err(e) => return Err(e).context("Failed to post the queue message"),
    };

    ctx.slack
        .add_pin(&posted.channel, &posted.ts)
        .await
        .context("Failed to pin the queue message")?;

    let handle = QueueHandle::new(posted.channel, posted.ts);
    info!("Pinned new queue {}: {}", handle, state.header_text());
    Ok(FlowOutcome::Created(handle))
}

async fn reject(ctx: &QueueContext, channel: &str, error: SlackError) -> Result<FlowOutcome> {
    warn!("Slack refused the queue layout in {}: {}", channel, error);
    post_warning(ctx, channel).await?;
    Ok(FlowOutcome::Rejected)
}

/// Plain text message in `channel`.
pub(crate) async fn reply(ctx: &QueueContext, channel: &str, text: &str) -> Result<FlowOutcome> {
    ctx.slack
        .post_message(OutgoingMessage::text(channel, text))
        .await
        .with_context(|| format!("Failed to reply in {}", channel))?;
    Ok(FlowOutcome::Replied)
}
