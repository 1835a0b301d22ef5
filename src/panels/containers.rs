use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::SyncError;
use crate::live::{
    ActionGuard, ApiFetcher, CommandKind, DerivedView, PollHandle, PolledResourceStore,
};
use crate::models::Container;
use crate::notifications::Notifier;
use crate::transport::Transport;

pub const CONTAINERS_PATH: &str = "/api/docker/containers";

/// Container status list with start/stop/restart controls.
pub struct ContainerPanel {
    transport: Arc<dyn Transport>,
    store: PolledResourceStore<Container>,
    guard: ActionGuard,
    view: DerivedView<Container>,
    poll: Option<PollHandle>,
}

impl ContainerPanel {
    pub fn new(transport: Arc<dyn Transport>, notifier: Arc<dyn Notifier>) -> Self {
        let store = PolledResourceStore::new(
            "containers",
            Arc::new(ApiFetcher::<Container>::new(
                Arc::clone(&transport),
                CONTAINERS_PATH,
            )),
            Arc::clone(&notifier),
        );
        let guard = ActionGuard::new(Arc::new(store.clone()), notifier);
        let view = DerivedView::new(&store);
        Self {
            transport,
            store,
            guard,
            view,
            poll: None,
        }
    }

    /// Starts polling. Mounting an already mounted panel does nothing.
    pub fn mount(&mut self, interval: Duration) {
        if self.poll.is_none() {
            info!(interval_ms = interval.as_millis() as u64, "Mounting container panel.");
            self.poll = Some(self.store.start(interval));
        }
    }

    pub fn unmount(&mut self) {
        if let Some(poll) = self.poll.take() {
            info!("Unmounting container panel.");
            poll.stop();
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.poll.is_some()
    }

    pub fn store(&self) -> &PolledResourceStore<Container> {
        &self.store
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.view.set_query(query);
    }

    pub fn rows(&self) -> Vec<Container> {
        self.view.rows()
    }

    pub fn running_count(&self) -> usize {
        self.store.items().iter().filter(|c| c.is_running()).count()
    }

    /// Whether the button for `kind` on `container_id` should be disabled.
    pub fn is_busy(&self, container_id: &str, kind: CommandKind) -> bool {
        self.guard.is_pending(container_id, kind)
    }

    pub async fn start_container(&self, container_id: &str) -> Result<(), SyncError> {
        self.command(container_id, CommandKind::Start).await
    }

    pub async fn stop_container(&self, container_id: &str) -> Result<(), SyncError> {
        self.command(container_id, CommandKind::Stop).await
    }

    pub async fn restart_container(&self, container_id: &str) -> Result<(), SyncError> {
        self.command(container_id, CommandKind::Restart).await
    }

    async fn command(&self, container_id: &str, kind: CommandKind) -> Result<(), SyncError> {
        let path = format!("{CONTAINERS_PATH}/{}/{kind}", urlencoding::encode(container_id));
        let done = match kind {
            CommandKind::Start => "started",
            CommandKind::Stop => "stopped",
            _ => "restarted",
        };
        let transport = Arc::clone(&self.transport);
        self.guard
            .run(
                container_id,
                kind,
                &format!("Container {container_id} {done}"),
                || async move { transport.post(&path, json!({})).await.map(|_| ()) },
            )
            .await
    }
}

impl Drop for ContainerPanel {
    fn drop(&mut self) {
        self.unmount();
    }
}
