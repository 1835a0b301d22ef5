use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::polled_store::PolledResourceStore;
use crate::error::SyncError;
use crate::notifications::{Notifier, Severity};
use crate::transport::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Start,
    Stop,
    Restart,
    Create,
    Expire,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Start => "start",
            CommandKind::Stop => "stop",
            CommandKind::Restart => "restart",
            CommandKind::Create => "create",
            CommandKind::Expire => "expire",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that can be asked to re-read its state after a command settles.
#[async_trait]
pub trait Refresh: Send + Sync {
    async fn refresh_now(&self);
}

#[async_trait]
impl<T> Refresh for PolledResourceStore<T>
where
    T: Send + Sync + 'static,
{
    async fn refresh_now(&self) {
        self.refresh().await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub entity_id: String,
    pub kind: CommandKind,
}

type LiveSet = Arc<Mutex<HashSet<ActionKey>>>;

fn lock_live(live: &LiveSet) -> MutexGuard<'_, HashSet<ActionKey>> {
    live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Proof that a command is in flight for one (entity, kind) pair. The pair is
/// released when the token is handed back to [`ActionGuard::end`] or dropped.
#[must_use = "the action is released as soon as the token is dropped"]
#[derive(Debug)]
pub struct ActionToken {
    id: Uuid,
    key: ActionKey,
    live: LiveSet,
    released: bool,
}

impl ActionToken {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &ActionKey {
        &self.key
    }

    fn release(&mut self) {
        if !self.released {
            lock_live(&self.live).remove(&self.key);
            self.released = true;
        }
    }
}

impl Drop for ActionToken {
    fn drop(&mut self) {
        self.release();
    }
}

/// Serializes user-triggered commands per entity and refreshes the owning
/// store once each command settles.
///
/// Only identical (entity, kind) pairs conflict. A `stop` and a `start` on the
/// same container may be in flight together.
#[derive(Clone)]
pub struct ActionGuard {
    live: LiveSet,
    owner: Arc<dyn Refresh>,
    notifier: Arc<dyn Notifier>,
}

impl ActionGuard {
    pub fn new(owner: Arc<dyn Refresh>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            live: Arc::new(Mutex::new(HashSet::new())),
            owner,
            notifier,
        }
    }

    pub fn begin(&self, entity_id: &str, kind: CommandKind) -> Result<ActionToken, SyncError> {
        let key = ActionKey {
            entity_id: entity_id.to_string(),
            kind,
        };
        if !lock_live(&self.live).insert(key.clone()) {
            debug!(entity_id = %entity_id, command = %kind, "Command already in flight.");
            return Err(SyncError::Conflict {
                entity: entity_id.to_string(),
                command: kind,
            });
        }
        let id = Uuid::new_v4();
        debug!(entity_id = %entity_id, command = %kind, token = %id, "Command started.");
        Ok(ActionToken {
            id,
            key,
            live: Arc::clone(&self.live),
            released: false,
        })
    }

    /// Releases the token whatever the command's outcome, then refreshes the
    /// owning store once. The refresh reads state fetched after the command
    /// settled, even when a poll fetch was already running.
    pub async fn end(&self, mut token: ActionToken) {
        token.release();
        debug!(entity_id = %token.key.entity_id, command = %token.key.kind, token = %token.id, "Command settled.");
        self.owner.refresh_now().await;
    }

    /// Whether the control for this (entity, kind) should be disabled.
    pub fn is_pending(&self, entity_id: &str, kind: CommandKind) -> bool {
        lock_live(&self.live).contains(&ActionKey {
            entity_id: entity_id.to_string(),
            kind,
        })
    }

    pub fn pending(&self) -> Vec<ActionKey> {
        lock_live(&self.live).iter().cloned().collect()
    }

    /// Runs `command` under a token for (entity, kind).
    ///
    /// A conflict returns immediately without notifying. A failed command is
    /// reported with error severity. Either way the token is released and the
    /// owning store refreshed before this returns.
    pub async fn run<F, Fut, T>(
        &self,
        entity_id: &str,
        kind: CommandKind,
        success_message: &str,
        command: F,
    ) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let token = self.begin(entity_id, kind)?;
        let outcome = match command().await {
            Ok(value) => {
                info!(entity_id = %entity_id, command = %kind, "Command succeeded.");
                self.notifier.notify(success_message, Severity::Success);
                Ok(value)
            }
            Err(e) => {
                let err = SyncError::Command {
                    entity: entity_id.to_string(),
                    command: kind,
                    message: e.to_string(),
                };
                warn!(entity_id = %entity_id, command = %kind, error = %e, "Command failed.");
                self.notifier.notify(&err.to_string(), Severity::Error);
                Err(err)
            }
        };
        self.end(token).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingNotifier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct CountingRefresh {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Refresh for CountingRefresh {
        async fn refresh_now(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn guard() -> (ActionGuard, Arc<CountingRefresh>, Arc<RecordingNotifier>) {
        let refresh = Arc::new(CountingRefresh::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let guard = ActionGuard::new(refresh.clone(), notifier.clone());
        (guard, refresh, notifier)
    }

    #[tokio::test]
    async fn test_second_begin_conflicts_until_end() {
        let (guard, refresh, _) = guard();

        let first = guard.begin("web", CommandKind::Restart).unwrap();
        let second = guard.begin("web", CommandKind::Restart);
        assert!(matches!(second, Err(SyncError::Conflict { .. })));
        assert!(guard.is_pending("web", CommandKind::Restart));

        guard.end(first).await;
        assert!(!guard.is_pending("web", CommandKind::Restart));
        assert_eq!(refresh.calls.load(Ordering::SeqCst), 1);

        let third = guard.begin("web", CommandKind::Restart);
        assert!(third.is_ok());
    }

    #[test]
    fn test_different_kinds_do_not_conflict() {
        let (guard, _, _) = guard();

        let _stop = guard.begin("web", CommandKind::Stop).unwrap();
        let _start = guard.begin("web", CommandKind::Start).unwrap();
        let _other = guard.begin("db", CommandKind::Stop).unwrap();
        assert_eq!(guard.pending().len(), 3);
    }

    #[test]
    fn test_dropped_token_releases_without_refresh() {
        let (guard, refresh, _) = guard();
        {
            let _token = guard.begin("key-1", CommandKind::Expire).unwrap();
            assert!(guard.is_pending("key-1", CommandKind::Expire));
        }
        assert!(!guard.is_pending("key-1", CommandKind::Expire));
        assert_eq!(refresh.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_failure_notifies_and_releases() {
        let (guard, refresh, notifier) = guard();

        let result: Result<(), SyncError> = guard
            .run("web", CommandKind::Stop, "Container web stopped", || async {
                Err(TransportError::Status {
                    path: "/api/docker/containers/web/stop".to_string(),
                    status: 500,
                    message: "daemon unavailable".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(SyncError::Command { command: CommandKind::Stop, .. })));
        assert_eq!(notifier.count(Severity::Error), 1);
        assert_eq!(notifier.count(Severity::Success), 0);
        assert!(!guard.is_pending("web", CommandKind::Stop));
        assert_eq!(refresh.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_rejects_duplicate_while_in_flight() {
        let (guard, refresh, notifier) = guard();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let in_flight = {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .run("web", CommandKind::Restart, "Container web restarted", || async move {
                        let _ = release_rx.await;
                        Ok(())
                    })
                    .await
            })
        };
        while !guard.is_pending("web", CommandKind::Restart) {
            tokio::task::yield_now().await;
        }

        let duplicate = guard
            .run("web", CommandKind::Restart, "Container web restarted", || async { Ok(()) })
            .await;
        assert!(matches!(duplicate, Err(SyncError::Conflict { .. })));
        assert_eq!(refresh.calls.load(Ordering::SeqCst), 0);
        assert!(notifier.messages().is_empty());

        release_tx.send(()).unwrap();
        assert!(in_flight.await.unwrap().is_ok());
        assert_eq!(refresh.calls.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.count(Severity::Success), 1);
    }
}
