use anyhow::{Context, Result};
use review_queue_core::ReconcileOutcome;
use tracing::{debug, info};

use super::publish::publish_update;
use super::{FlowOutcome, QueueContext};
use crate::locator::LoadMode;

/// A `reaction_added` event on a message.
#[derive(Debug, Clone)]
pub struct IncomingReaction {
    pub channel: String,
    /// Timestamp of the message the reaction was added to.
    pub message_ts: String,
    pub reaction: String,
    pub user: String,
}

/// Complete every queued PR linked from the reacted-to message.
pub async fn handle_reaction(ctx: &QueueContext, event: &IncomingReaction) -> Result<FlowOutcome> {
    let completion = &ctx.settings.completion_reactions;
    if !completion.iter().any(|name| name == &event.reaction) {
        return Ok(FlowOutcome::Ignored);
    }

    let Some(text) = ctx
        .slack
        .message_text(&event.channel, &event.message_ts)
        .await
        .context("Failed to fetch the reacted-to message")?
    else {
        debug!("Reacted-to message {} is gone", event.message_ts);
        return Ok(FlowOutcome::Ignored);
    };

    let _guard = ctx.locks.lock(&event.channel).await;
    let Some(pinned) = ctx.load(&event.channel, LoadMode::Raw).await? else {
        return Ok(FlowOutcome::Ignored);
    };

    match ctx
        .engine
        .reconcile_reaction(&pinned.state, &event.reaction, &text, completion)
    {
        ReconcileOutcome::Removed { state, indices } => {
            info!(
                "{} completed queue entries {:?} in {} with :{}:",
                event.user, indices, event.channel, event.reaction
            );
            publish_update(ctx, &pinned.handle, &state).await
        }
        ReconcileOutcome::Ignored | ReconcileOutcome::NoMatch => Ok(FlowOutcome::Ignored),
    }
}
