use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::time_series::{lock_window, SharedWindow};
use crate::feed::{FeedHub, SubscriberId};

/// Format of the x-axis label stamped on each point when it is received.
pub const LABEL_FORMAT: &str = "%H:%M:%S";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

struct ActiveSubscription {
    subscriber_id: SubscriberId,
    task: JoinHandle<()>,
}

/// Bridges named feed channels into the windows of one chart.
///
/// Each subscribed channel gets one registration on the hub and one task that
/// drains it, labels every snapshot with the receipt time, and appends it to
/// all attached windows. Dropping the subscriber releases every registration.
pub struct MetricsFeedSubscriber {
    hub: Arc<FeedHub>,
    windows: Vec<SharedWindow>,
    clock: Arc<dyn Clock>,
    active: HashMap<String, ActiveSubscription>,
}

impl MetricsFeedSubscriber {
    pub fn new(hub: Arc<FeedHub>, windows: Vec<SharedWindow>) -> Self {
        Self {
            hub,
            windows,
            clock: Arc::new(SystemClock),
            active: HashMap::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Starts feeding `channel` into the windows. Must be called from within a
    /// Tokio runtime. Returns `false` if the channel was already subscribed.
    pub fn subscribe(&mut self, channel: &str) -> bool {
        if self.active.contains_key(channel) {
            debug!(channel = %channel, "Already subscribed to feed channel.");
            return false;
        }

        let mut receiver = self.hub.subscribe(channel);
        let subscriber_id = receiver.id;
        let windows = self.windows.clone();
        let clock = Arc::clone(&self.clock);
        let channel_name = channel.to_string();
        let task = tokio::spawn(async move {
            while let Some(snapshot) = receiver.rx.recv().await {
                let label = clock.now().format(LABEL_FORMAT).to_string();
                for window in &windows {
                    lock_window(window).append_snapshot(label.clone(), &snapshot);
                }
            }
            debug!(channel = %channel_name, "Feed registration closed.");
        });

        info!(channel = %channel, subscriber_id, "Subscribed to feed channel.");
        self.active.insert(
            channel.to_string(),
            ActiveSubscription {
                subscriber_id,
                task,
            },
        );
        true
    }

    /// Stops feeding `channel`. Safe to call for channels that were never
    /// subscribed. Returns `false` in that case.
    pub fn unsubscribe(&mut self, channel: &str) -> bool {
        match self.active.remove(channel) {
            Some(subscription) => {
                self.hub.unsubscribe(channel, subscription.subscriber_id);
                // Snapshots already queued for this registration must not land.
                subscription.task.abort();
                info!(channel = %channel, "Unsubscribed from feed channel.");
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe_all(&mut self) {
        let channels: Vec<String> = self.active.keys().cloned().collect();
        for channel in channels {
            self.unsubscribe(&channel);
        }
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.active.contains_key(channel)
    }

    pub fn windows(&self) -> &[SharedWindow] {
        &self.windows
    }
}

impl Drop for MetricsFeedSubscriber {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}
