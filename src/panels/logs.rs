use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::live::{ApiFetcher, DerivedView, Fetch, PollHandle, PolledResourceStore, Searchable};
use crate::models::{AccessLogRow, QueryLogRow};
use crate::notifications::Notifier;
use crate::transport::Transport;

pub const QUERY_LOG_PATH: &str = "/api/adguard/querylog";
pub const ACCESS_LOG_PATH: &str = "/api/caddy/logs";

/// A read-only, searchable log table kept fresh by polling.
pub struct LogPanel<T> {
    store: PolledResourceStore<T>,
    view: DerivedView<T>,
    poll: Option<PollHandle>,
}

impl<T> LogPanel<T>
where
    T: DeserializeOwned + Searchable + Clone + Send + Sync + 'static,
{
    pub fn new(name: &str, fetcher: Arc<dyn Fetch<T>>, notifier: Arc<dyn Notifier>) -> Self {
        let store = PolledResourceStore::new(name, fetcher, notifier);
        let view = DerivedView::new(&store);
        Self {
            store,
            view,
            poll: None,
        }
    }

    pub fn mount(&mut self, interval: Duration) {
        if self.poll.is_none() {
            info!(log = %self.store.name(), interval_ms = interval.as_millis() as u64, "Mounting log panel.");
            self.poll = Some(self.store.start(interval));
        }
    }

    pub fn unmount(&mut self) {
        if let Some(poll) = self.poll.take() {
            info!(log = %self.store.name(), "Unmounting log panel.");
            poll.stop();
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.poll.is_some()
    }

    pub fn store(&self) -> &PolledResourceStore<T> {
        &self.store
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.view.set_query(query);
    }

    pub fn rows(&self) -> Vec<T> {
        self.view.rows()
    }
}

impl LogPanel<QueryLogRow> {
    /// DNS resolver query log. The API wraps rows as `{"data": [...]}`.
    pub fn query_log(transport: Arc<dyn Transport>, notifier: Arc<dyn Notifier>) -> Self {
        let fetcher = ApiFetcher::<QueryLogRow>::new(transport, QUERY_LOG_PATH).with_pointer("/data");
        Self::new("DNS query log", Arc::new(fetcher), notifier)
    }

    pub fn blocked_count(&self) -> usize {
        self.store.items().iter().filter(|row| row.is_blocked()).count()
    }
}

impl LogPanel<AccessLogRow> {
    /// Reverse proxy access log, merged across every configured log file.
    pub fn access_log(transport: Arc<dyn Transport>, notifier: Arc<dyn Notifier>) -> Self {
        let fetcher = ApiFetcher::<AccessLogRow>::new(transport, ACCESS_LOG_PATH).with_pointer("/entries");
        Self::new("access log", Arc::new(fetcher), notifier)
    }
}

impl<T> Drop for LogPanel<T> {
    fn drop(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::Severity;
    use crate::test_support::{RecordingNotifier, ScriptedTransport};
    use serde_json::json;

    #[tokio::test]
    async fn test_query_log_search_by_client() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_get(
            QUERY_LOG_PATH,
            Ok(json!({ "data": [
                { "time": "2026-10-18T10:00:00Z", "client": "10.0.0.5", "domain": "example.org", "status": "NotFilteredNotFound" },
                { "time": "2026-10-18T10:00:01Z", "client": "10.0.0.6", "domain": "ads.example", "status": "FilteredBlackList" },
                { "time": "2026-10-18T10:00:02Z", "client": "10.0.0.5", "domain": "tracker.example", "status": "FilteredBlackList" }
            ]})),
        );
        let mut panel = LogPanel::query_log(transport, Arc::new(RecordingNotifier::default()));
        panel.store().refresh().await;

        panel.set_query("10.0.0.5");
        let domains: Vec<String> = panel.rows().into_iter().map(|r| r.domain).collect();
        assert_eq!(domains, vec!["example.org", "tracker.example"]);
        assert_eq!(panel.blocked_count(), 2);

        panel.set_query("");
        assert_eq!(panel.rows().len(), 3);
    }

    #[tokio::test]
    async fn test_access_log_search_by_status() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_get(
            ACCESS_LOG_PATH,
            Ok(json!({ "entries": [
                { "time": "2026-10-18T10:00:00Z", "clientIp": "100.64.0.2", "method": "GET", "host": "dash.mesh", "path": "/", "status": 200 },
                { "time": "2026-10-18T10:00:01Z", "clientIp": "100.64.0.3", "method": "POST", "host": "dash.mesh", "path": "/login", "status": 401 }
            ]})),
        );
        let mut panel = LogPanel::access_log(transport, Arc::new(RecordingNotifier::default()));
        panel.store().refresh().await;

        panel.set_query("401");
        let rows = panel.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, "/login");
    }

    #[tokio::test]
    async fn test_unreachable_log_keeps_rows() {
        let transport = Arc::new(ScriptedTransport::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let panel = LogPanel::query_log(transport.clone(), notifier.clone());

        panel.store().refresh().await;
        assert!(panel.rows().is_empty());
        assert_eq!(notifier.count(Severity::Error), 1);
    }
}
