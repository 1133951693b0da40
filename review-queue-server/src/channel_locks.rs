//! Per-channel serialization of queue read-modify-write cycles.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutex. Handlers touching the same channel's queue run one at
/// a time; different channels proceed in parallel.
#[derive(Clone, Default)]
pub struct ChannelLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ChannelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Held until the guard is dropped.
    pub async fn lock(&self, channel: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(channel.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
