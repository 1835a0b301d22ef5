use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::notifications::{Notifier, Severity};
use crate::transport::{Transport, TransportError};

/// Source of a polled collection.
#[async_trait]
pub trait Fetch<T>: Send + Sync {
    async fn fetch(&self) -> Result<Vec<T>, TransportError>;
}

/// Fetches a list with `GET path`. When `pointer` is set the list is read from
/// that JSON pointer inside the body (e.g. `/data` for `{"data": [...]}`); a
/// missing or null list is treated as empty.
pub struct ApiFetcher<T> {
    transport: Arc<dyn Transport>,
    path: String,
    pointer: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ApiFetcher<T> {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
            pointer: None,
            _marker: PhantomData,
        }
    }

    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = Some(pointer.into());
        self
    }
}

#[async_trait]
impl<T> Fetch<T> for ApiFetcher<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch(&self) -> Result<Vec<T>, TransportError> {
        let body = self.transport.get(&self.path).await?;
        let list = match &self.pointer {
            Some(pointer) => body.pointer(pointer).cloned().unwrap_or(Value::Null),
            None => body,
        };
        if list.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(list).map_err(|e| TransportError::Decode {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }
}

/// Last successfully fetched state of a store. Replaced as a whole on every
/// successful refresh, so a reader holding one never sees a partial update.
#[derive(Debug)]
pub struct PolledCollection<T> {
    pub items: Arc<Vec<T>>,
    pub last_fetched: Option<DateTime<Utc>>,
}

impl<T> Default for PolledCollection<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            last_fetched: None,
        }
    }
}

impl<T> Clone for PolledCollection<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            last_fetched: self.last_fetched,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Collection replaced; carries the new item count.
    Updated(usize),
    /// Fetch failed; the previous collection is still current.
    Failed(SyncError),
    /// A poll tick landed while a fetch was in flight.
    Skipped,
}

type Completed = watch::Sender<Option<(u64, RefreshOutcome)>>;

struct StoreInner<T> {
    name: String,
    fetcher: Arc<dyn Fetch<T>>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<Arc<PolledCollection<T>>>,
    in_flight: AtomicBool,
    /// Set by a refresh that found a fetch running. The running driver fetches
    /// once more before letting go, however many refreshes piled up.
    requested: AtomicBool,
    /// Bumped by `invalidate`. A fetch started under an older generation is dropped.
    generation: AtomicU64,
    next_cycle: AtomicU64,
    /// Sequence number and outcome of the latest applied fetch cycle.
    completed: Completed,
}

/// Holds the in-flight flag. Releasing it, including by cancellation, wakes
/// refreshes waiting on the running fetch.
struct InFlight<'a> {
    flag: &'a AtomicBool,
    completed: &'a Completed,
    held: bool,
}

impl InFlight<'_> {
    fn release(&mut self) {
        if self.held {
            self.flag.store(false, Ordering::SeqCst);
            self.held = false;
            self.completed.send_modify(|_| {});
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Mirror of a remote collection kept fresh by polling.
///
/// Cloning is cheap and every clone refers to the same store.
pub struct PolledResourceStore<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for PolledResourceStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PolledResourceStore<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        fetcher: Arc<dyn Fetch<T>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(Arc::new(PolledCollection::default()));
        let (completed, _) = watch::channel(None);
        Self {
            inner: Arc::new(StoreInner {
                name: name.into(),
                fetcher,
                notifier,
                state,
                in_flight: AtomicBool::new(false),
                requested: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                next_cycle: AtomicU64::new(0),
                completed,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn current(&self) -> Arc<PolledCollection<T>> {
        Arc::clone(&self.inner.state.borrow())
    }

    pub fn items(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.inner.state.borrow().items)
    }

    pub fn is_fetching(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Receiver that is marked changed every time the collection is replaced.
    pub fn watch(&self) -> watch::Receiver<Arc<PolledCollection<T>>> {
        self.inner.state.subscribe()
    }

    /// Marks whatever the running fetch returns as stale. Its result is
    /// dropped and the store fetches again.
    pub fn invalidate(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.requested.store(true, Ordering::SeqCst);
        debug!(store = %self.inner.name, "Collection invalidated.");
    }

    /// Resolves with the outcome of a fetch that started after this call.
    ///
    /// If a fetch is already running it is not interrupted; one more fetch
    /// follows it and every refresh that arrived meanwhile shares that one.
    pub async fn refresh(&self) -> RefreshOutcome {
        let after = self.inner.next_cycle.load(Ordering::SeqCst);
        self.inner.requested.store(true, Ordering::SeqCst);
        let mut completed = self.inner.completed.subscribe();
        loop {
            let done = (*completed.borrow_and_update())
                .as_ref()
                .filter(|(cycle, _)| *cycle >= after)
                .map(|(_, outcome)| outcome.clone());
            if let Some(outcome) = done {
                return outcome;
            }
            if !self.inner.in_flight.swap(true, Ordering::SeqCst) {
                return self.drive().await;
            }
            debug!(store = %self.inner.name, "Fetch in flight, waiting for the next one.");
            if completed.changed().await.is_err() {
                return RefreshOutcome::Skipped;
            }
        }
    }

    /// One poll tick. Dropped when a fetch is already in flight.
    async fn poll_once(&self) -> RefreshOutcome {
        if self.inner.in_flight.swap(true, Ordering::SeqCst) {
            debug!(store = %self.inner.name, "Fetch already in flight, skipping tick.");
            return RefreshOutcome::Skipped;
        }
        self.drive().await
    }

    /// Runs fetch cycles until no refresh is pending. The caller has already
    /// taken the in-flight flag.
    async fn drive(&self) -> RefreshOutcome {
        let mut in_flight = InFlight {
            flag: &self.inner.in_flight,
            completed: &self.inner.completed,
            held: true,
        };
        loop {
            let Some(outcome) = self.cycle().await else {
                continue;
            };
            if self.inner.requested.load(Ordering::SeqCst) {
                continue;
            }
            in_flight.release();
            // A refresh may have arrived between the check and the release.
            if self.inner.requested.load(Ordering::SeqCst)
                && !self.inner.in_flight.swap(true, Ordering::SeqCst)
            {
                in_flight.held = true;
                continue;
            }
            return outcome;
        }
    }

    /// Fetches once. Returns `None` when the store was invalidated while the
    /// fetch ran; nothing is applied or reported in that case.
    async fn cycle(&self) -> Option<RefreshOutcome> {
        self.inner.requested.store(false, Ordering::SeqCst);
        let cycle = self.inner.next_cycle.fetch_add(1, Ordering::SeqCst);
        let generation = self.inner.generation.load(Ordering::SeqCst);

        let result = self.inner.fetcher.fetch().await;
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            debug!(store = %self.inner.name, cycle, "Dropping result of a stale fetch.");
            return None;
        }

        let outcome = match result {
            Ok(items) => {
                let count = items.len();
                self.inner.state.send_replace(Arc::new(PolledCollection {
                    items: Arc::new(items),
                    last_fetched: Some(Utc::now()),
                }));
                debug!(store = %self.inner.name, cycle, count, "Collection refreshed.");
                RefreshOutcome::Updated(count)
            }
            Err(e) => {
                let err = SyncError::Fetch {
                    resource: self.inner.name.clone(),
                    message: e.to_string(),
                };
                warn!(store = %self.inner.name, error = %e, "Refresh failed, keeping previous collection.");
                self.inner.notifier.notify(&err.to_string(), Severity::Error);
                RefreshOutcome::Failed(err)
            }
        };
        self.inner.completed.send_replace(Some((cycle, outcome.clone())));
        Some(outcome)
    }

    /// Fetches now and then every `interval` until the returned handle is
    /// stopped or dropped. Ticks that land while a fetch is in flight are
    /// dropped.
    pub fn start(&self, interval: Duration) -> PollHandle {
        let store = self.clone();
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            info!(store = %store.inner.name, interval_ms = interval.as_millis() as u64, "Polling started.");
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut cycles = JoinSet::new();
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        while cycles.try_join_next().is_some() {}
                        let store = store.clone();
                        cycles.spawn(async move {
                            store.poll_once().await;
                        });
                    }
                }
            }
            // Dropping the set cancels a fetch that is still running.
            cycles.abort_all();
            info!(store = %store.inner.name, "Polling stopped.");
        });

        PollHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }
}

/// Cancels a polling schedule. Dropping the handle cancels it as well.
#[derive(Debug)]
pub struct PollHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn stop(mut self) {
        self.signal_stop();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    fn signal_stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.signal_stop();
    }
}
