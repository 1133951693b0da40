use anyhow::Result;
use review_queue_core::{parse_action_value, QueueError};
use tracing::{debug, info, warn};

use super::publish::publish_update;
use super::{FlowOutcome, QueueContext};
use crate::locator::LoadMode;

/// A press of an entry's "Complete" button.
#[derive(Debug, Clone)]
pub struct RemoveAction {
    pub channel: String,
    /// The message carrying the button, when Slack reports it.
    pub message_ts: Option<String>,
    /// The button value: an entry payload or a bare index.
    pub value: String,
    pub user: String,
}

pub async fn handle_remove_action(ctx: &QueueContext, action: &RemoveAction) -> Result<FlowOutcome> {
    let Some(index) = parse_action_value(&action.value) else {
        warn!("Unreadable remove button value: {:?}", action.value);
        return Ok(FlowOutcome::Ignored);
    };

    let _guard = ctx.locks.lock(&action.channel).await;
    let Some(pinned) = ctx.load(&action.channel, LoadMode::Raw).await? else {
        info!("Remove pressed in {} but no queue is pinned", action.channel);
        return Ok(FlowOutcome::Ignored);
    };
    if let Some(ts) = &action.message_ts {
        if ts != &pinned.handle.message_ts {
            debug!(
                "Remove pressed on unpinned copy {}; applying to {}",
                ts, pinned.handle
            );
        }
    }

    match ctx.engine.remove_by_index(&pinned.state, index) {
        Ok(state) => {
            info!(
                "{} completed queue entry {} in {}",
                action.user, index, action.channel
            );
            publish_update(ctx, &pinned.handle, &state).await
        }
        Err(QueueError::NotFound { index }) => {
            info!("No queue entry {} in {}, ignoring", index, action.channel);
            Ok(FlowOutcome::NotFound(index))
        }
        Err(e) => Err(e.into()),
    }
}
