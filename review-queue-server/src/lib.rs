pub mod channel_locks;
pub mod command;
pub mod config;
pub mod events;
pub mod flow;
pub mod locator;
pub mod recording;
pub mod reminder;
pub mod slack;

use std::sync::Arc;

pub use flow::{QueueContext, QueueSettings};
pub use recording::RecordingLogger;
pub use slack::{SlackApi, SlackClient, SlackError};

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(8).collect()
}

pub fn get_bot_version() -> String {
    // Hash injected by the packaging build wins over the one `built` saw.
    if let Some(git_hash) = option_env!("REVIEW_QUEUE_GIT_HASH") {
        short_hash(git_hash)
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        short_hash(git_hash)
    } else {
        built_info::PKG_VERSION.to_string()
    }
}

pub struct AppState {
    pub queue: Arc<QueueContext>,
    pub signing_secret: String,
    pub recording_logger: Option<RecordingLogger>,
}
