use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::CalendarKey;

const CHANNEL_CAPACITY: usize = 256;

/// Sent after a calendar's persisted state changes. Subscribers re-fetch and
/// re-resolve the listed dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarChange {
    pub key: CalendarKey,
    /// Ascending, deduplicated.
    pub dates: Vec<NaiveDate>,
}

/// One broadcast channel per calendar.
pub struct NotifyHub {
    channels: DashMap<CalendarKey, broadcast::Sender<CalendarChange>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub fn subscribe(&self, key: CalendarKey) -> broadcast::Receiver<CalendarChange> {
        self.channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, change: CalendarChange) {
        if let Some(sender) = self.channels.get(&change.key) {
            let _ = sender.send(change);
        }
    }

    /// Drop channels whose receivers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
