//! Weekday morning reminders of the pending queue.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, TimeZone, Utc, Weekday};
use review_queue_core::header_text;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::flow::QueueContext;
use crate::locator::LoadMode;
use crate::slack::OutgoingMessage;

/// Channels that asked for the morning reminder. Lives only in memory.
#[derive(Clone, Default)]
pub struct ReminderChannels {
    channels: Arc<Mutex<BTreeSet<String>>>,
}

impl ReminderChannels {
    /// False if the channel was already subscribed.
    pub async fn subscribe(&self, channel: &str) -> bool {
        self.channels.lock().await.insert(channel.to_string())
    }

    /// False if the channel was not subscribed.
    pub async fn unsubscribe(&self, channel: &str) -> bool {
        self.channels.lock().await.remove(channel)
    }

    pub async fn snapshot(&self) -> Vec<String> {
        self.channels.lock().await.iter().cloned().collect()
    }
}

/// Fires at `hour`:00 local time on each of `days`.
#[derive(Debug, Clone)]
pub struct ReminderSchedule {
    days: Vec<Weekday>,
    hour: u32,
    offset: FixedOffset,
}

impl ReminderSchedule {
    pub fn new(days: Vec<Weekday>, hour: u32, utc_offset_hours: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .with_context(|| format!("Invalid UTC offset: {} hours", utc_offset_hours))?;
        if hour > 23 {
            anyhow::bail!("Invalid reminder hour: {}", hour);
        }
        Ok(Self { days, hour, offset })
    }

    /// The first firing strictly after `now`; `None` when no days are set.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local_now = now.with_timezone(&self.offset);
        (0..=7)
            .filter_map(|days_ahead| {
                let date = local_now.date_naive() + ChronoDuration::days(days_ahead);
                if !self.days.contains(&date.weekday()) {
                    return None;
                }
                let at = date.and_hms_opt(self.hour, 0, 0)?;
                self.offset.from_local_datetime(&at).single()
            })
            .find(|candidate| *candidate > local_now)
            .map(|candidate| candidate.with_timezone(&Utc))
    }
}

pub fn reminder_text(count: usize, queue_link: Option<&str>) -> String {
    match queue_link {
        Some(link) => format!("Good morning! {} <{}|See the queue>", header_text(count), link),
        None => format!("Good morning! {}", header_text(count)),
    }
}

pub async fn reminder_loop(ctx: Arc<QueueContext>, schedule: ReminderSchedule) {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            warn!("No reminder days configured; morning reminders are off");
            return;
        };
        info!("Next morning reminder at {}", next);

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        send_reminders(&ctx).await;
    }
}

/// One pass over every subscribed channel. Returns how many reminders were
/// posted.
pub async fn send_reminders(ctx: &QueueContext) -> usize {
    let channels = ctx.reminders.snapshot().await;
    let mut posted = 0;
    for channel in channels {
        match remind_channel(ctx, &channel).await {
            Ok(true) => posted += 1,
            Ok(false) => {}
            Err(e) => error!("Failed to send reminder to {}: {:#}", channel, e),
        }
    }
    posted
}

async fn remind_channel(ctx: &QueueContext, channel: &str) -> Result<bool> {
    let Some(pinned) = ctx.load(channel, LoadMode::Raw).await? else {
        return Ok(false);
    };
    let count = pinned.state.active_count();
    if count == 0 {
        return Ok(false);
    }

    let text = reminder_text(count, pinned.permalink.as_deref());
    ctx.slack
        .post_message(OutgoingMessage::text(channel, text))
        .await
        .context("Failed to post reminder")?;
    info!("Reminded {} of {} pending PRs", channel, count);
    Ok(true)
}
