use std::sync::Arc;
use tracing::info;

use crate::feed::FeedHub;
use crate::live::time_series::lock_window;
use crate::live::{Clock, MetricsFeedSubscriber, SharedWindow, TimeSeriesWindow, WindowSnapshot};
use crate::models::metrics::{DOWNLOAD_RATE, UPLOAD_RATE};
use crate::models::MetricSnapshot;

/// Rolling upload/download chart fed from one stats channel.
pub struct TrafficPanel {
    channel: String,
    hub: Arc<FeedHub>,
    window: SharedWindow,
    subscriber: MetricsFeedSubscriber,
}

impl TrafficPanel {
    pub fn new(hub: Arc<FeedHub>, channel: impl Into<String>, capacity: usize) -> Self {
        let window = TimeSeriesWindow::new(capacity, [UPLOAD_RATE, DOWNLOAD_RATE]).shared();
        let subscriber = MetricsFeedSubscriber::new(Arc::clone(&hub), vec![Arc::clone(&window)]);
        Self {
            channel: channel.into(),
            hub,
            window,
            subscriber,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.subscriber = MetricsFeedSubscriber::new(Arc::clone(&self.hub), vec![Arc::clone(&self.window)])
            .with_clock(clock);
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn mount(&mut self) {
        if self.subscriber.subscribe(&self.channel) {
            info!(channel = %self.channel, "Mounted traffic panel.");
        }
    }

    /// Stops the feed and empties the chart, so a later mount starts fresh.
    pub fn unmount(&mut self) {
        if self.subscriber.unsubscribe(&self.channel) {
            lock_window(&self.window).clear();
            info!(channel = %self.channel, "Unmounted traffic panel.");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.subscriber.is_subscribed(&self.channel)
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        lock_window(&self.window).snapshot()
    }

    /// Most recent snapshot seen on the channel, even one received before mount.
    pub fn latest(&self) -> Option<MetricSnapshot> {
        self.hub.latest(&self.channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::wait_until;

    fn rates(upload: f64, download: f64) -> MetricSnapshot {
        MetricSnapshot::default()
            .with(UPLOAD_RATE, upload)
            .with(DOWNLOAD_RATE, download)
    }

    #[tokio::test]
    async fn test_mount_feeds_chart_and_unmount_clears_it() {
        let hub = Arc::new(FeedHub::new());
        let mut panel = TrafficPanel::new(Arc::clone(&hub), "stats", 3);

        panel.mount();
        assert!(panel.is_mounted());
        assert_eq!(hub.subscriber_count("stats"), 1);

        for i in 0..5 {
            hub.publish("stats", rates(i as f64, 10.0 * i as f64));
        }
        wait_until(|| panel.snapshot().series(UPLOAD_RATE).and_then(|v| v.last().copied()) == Some(4.0)).await;
        let snapshot = panel.snapshot();
        assert_eq!(snapshot.series(UPLOAD_RATE), Some(&[2.0, 3.0, 4.0][..]));
        assert_eq!(snapshot.series(DOWNLOAD_RATE), Some(&[20.0, 30.0, 40.0][..]));

        panel.unmount();
        assert!(!panel.is_mounted());
        assert_eq!(hub.subscriber_count("stats"), 0);
        assert!(panel.snapshot().is_empty());

        hub.publish("stats", rates(9.0, 9.0));
        tokio::task::yield_now().await;
        assert!(panel.snapshot().is_empty());
        assert_eq!(panel.latest().and_then(|s| s.get(UPLOAD_RATE)), Some(9.0));
    }

    #[tokio::test]
    async fn test_remount_starts_fresh() {
        let hub = Arc::new(FeedHub::new());
        let mut panel = TrafficPanel::new(Arc::clone(&hub), "stats", 60);

        panel.mount();
        panel.mount();
        assert_eq!(hub.subscriber_count("stats"), 1);
        hub.publish("stats", rates(1.0, 2.0));
        wait_until(|| panel.snapshot().len() == 1).await;

        panel.unmount();
        panel.mount();
        hub.publish("stats", rates(3.0, 4.0));
        wait_until(|| panel.snapshot().len() == 1).await;
        assert_eq!(panel.snapshot().series(UPLOAD_RATE), Some(&[3.0][..]));
    }
}
