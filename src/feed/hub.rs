use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::models::MetricSnapshot;

pub type SubscriberId = u64;

#[derive(Default)]
struct ChannelState {
    latest: Option<MetricSnapshot>,
    subscribers: Vec<(SubscriberId, mpsc::UnboundedSender<MetricSnapshot>)>,
}

/// Receiving end of one registration on a channel. Snapshots arrive in publish
/// order and are never dropped by the hub.
#[derive(Debug)]
pub struct FeedReceiver {
    pub id: SubscriberId,
    pub channel: String,
    pub rx: mpsc::UnboundedReceiver<MetricSnapshot>,
}

/// Process-wide keyed store for the push feed.
///
/// Holds the latest snapshot per channel and the set of registrations on each
/// channel. The set of channels with at least one registration is published on
/// a watch channel so the connector knows what to ask the server for.
pub struct FeedHub {
    channels: DashMap<String, ChannelState>,
    next_id: AtomicU64,
    active_tx: watch::Sender<BTreeSet<String>>,
}

impl Default for FeedHub {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedHub {
    pub fn new() -> Self {
        let (active_tx, _) = watch::channel(BTreeSet::new());
        Self {
            channels: DashMap::new(),
            next_id: AtomicU64::new(1),
            active_tx,
        }
    }

    pub fn subscribe(&self, channel: &str) -> FeedReceiver {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        {
            // The active set is updated while the entry is locked so it always
            // agrees with the registration count.
            let mut state = self.channels.entry(channel.to_string()).or_default();
            state.subscribers.push((id, tx));
            if state.subscribers.len() == 1 {
                info!(channel = %channel, "Feed channel became active.");
                self.active_tx
                    .send_if_modified(|active| active.insert(channel.to_string()));
            }
        }
        debug!(channel = %channel, subscriber_id = id, "Registered feed subscriber.");
        FeedReceiver {
            id,
            channel: channel.to_string(),
            rx,
        }
    }

    /// Returns `false` when the registration was not found, which is not an error.
    pub fn unsubscribe(&self, channel: &str, id: SubscriberId) -> bool {
        let Some(mut state) = self.channels.get_mut(channel) else {
            return false;
        };
        let before = state.subscribers.len();
        state.subscribers.retain(|(sid, _)| *sid != id);
        let removed = state.subscribers.len() != before;
        if removed && state.subscribers.is_empty() {
            self.mark_inactive(channel);
        }
        removed
    }

    /// Stores the snapshot as the channel's latest value and hands it to every
    /// registration. Returns how many registrations received it.
    pub fn publish(&self, channel: &str, snapshot: MetricSnapshot) -> usize {
        let mut state = self.channels.entry(channel.to_string()).or_default();
        let had_subscribers = !state.subscribers.is_empty();
        state
            .subscribers
            .retain(|(_, tx)| tx.send(snapshot.clone()).is_ok());
        let delivered = state.subscribers.len();
        state.latest = Some(snapshot);
        if had_subscribers && delivered == 0 {
            self.mark_inactive(channel);
        }
        delivered
    }

    pub fn latest(&self, channel: &str) -> Option<MetricSnapshot> {
        self.channels
            .get(channel)
            .and_then(|state| state.latest.clone())
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|state| state.subscribers.len())
            .unwrap_or(0)
    }

    pub fn active_channels(&self) -> BTreeSet<String> {
        self.active_tx.borrow().clone()
    }

    pub fn watch_active(&self) -> watch::Receiver<BTreeSet<String>> {
        self.active_tx.subscribe()
    }

    /// Callers hold the channel's entry lock.
    fn mark_inactive(&self, channel: &str) {
        info!(channel = %channel, "Feed channel has no subscribers left.");
        self.active_tx.send_if_modified(|active| active.remove(channel));
    }
}
