use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::confirm::Confirm;
use crate::error::SyncError;
use crate::live::{
    ActionGuard, ApiFetcher, CommandKind, DerivedView, Fetch, PollHandle, PolledResourceStore,
};
use crate::models::auth_key::{CreateAuthKeyRequest, ExpireAuthKeyRequest};
use crate::models::{AuthKey, NewAuthKey, User};
use crate::notifications::{Notifier, Severity};
use crate::transport::{Transport, TransportError};

pub const USERS_PATH: &str = "/api/users";
pub const AUTH_KEYS_PATH: &str = "/api/preauthkeys";
pub const EXPIRE_AUTH_KEY_PATH: &str = "/api/preauthkeys/expire";

type SelectedUser = Arc<RwLock<Option<String>>>;

fn selected(user: &SelectedUser) -> Option<String> {
    user.read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

pub fn keys_path(user: &str) -> String {
    format!("{AUTH_KEYS_PATH}?user={}", urlencoding::encode(user))
}

/// Reads the keys of whichever user is selected. With no selection the list is
/// empty and no request is made.
struct UserKeysFetcher {
    transport: Arc<dyn Transport>,
    user: SelectedUser,
}

#[async_trait]
impl Fetch<AuthKey> for UserKeysFetcher {
    async fn fetch(&self) -> Result<Vec<AuthKey>, TransportError> {
        let Some(user) = selected(&self.user) else {
            return Ok(Vec::new());
        };
        let path = keys_path(&user);
        let body = self.transport.get(&path).await?;
        let list = match body {
            Value::Object(mut map) => map.remove("preAuthKeys").unwrap_or(Value::Null),
            list @ Value::Array(_) => list,
            _ => Value::Null,
        };
        if list.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(list).map_err(|e| TransportError::Decode {
            path,
            message: e.to_string(),
        })
    }
}

/// Users and their pre-authentication keys, with create and expire controls.
pub struct AuthKeyPanel {
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    confirm: Arc<dyn Confirm>,
    selected_user: SelectedUser,
    users: PolledResourceStore<User>,
    keys: PolledResourceStore<AuthKey>,
    guard: ActionGuard,
    view: DerivedView<AuthKey>,
    polls: Vec<PollHandle>,
}

impl AuthKeyPanel {
    pub fn new(
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
        confirm: Arc<dyn Confirm>,
    ) -> Self {
        let selected_user: SelectedUser = Arc::new(RwLock::new(None));
        let users = PolledResourceStore::new(
            "users",
            Arc::new(ApiFetcher::<User>::new(Arc::clone(&transport), USERS_PATH)),
            Arc::clone(&notifier),
        );
        let keys = PolledResourceStore::new(
            "auth keys",
            Arc::new(UserKeysFetcher {
                transport: Arc::clone(&transport),
                user: Arc::clone(&selected_user),
            }),
            Arc::clone(&notifier),
        );
        let guard = ActionGuard::new(Arc::new(keys.clone()), Arc::clone(&notifier));
        let view = DerivedView::auth_keys(&keys);
        Self {
            transport,
            notifier,
            confirm,
            selected_user,
            users,
            keys,
            guard,
            view,
            polls: Vec::new(),
        }
    }

    pub fn mount(&mut self, interval: Duration) {
        if self.polls.is_empty() {
            info!(interval_ms = interval.as_millis() as u64, "Mounting auth key panel.");
            self.polls.push(self.users.start(interval));
            self.polls.push(self.keys.start(interval));
        }
    }

    pub fn unmount(&mut self) {
        if !self.polls.is_empty() {
            info!("Unmounting auth key panel.");
            for poll in self.polls.drain(..) {
                poll.stop();
            }
        }
    }

    pub fn is_mounted(&self) -> bool {
        !self.polls.is_empty()
    }

    pub fn users(&self) -> Arc<Vec<User>> {
        self.users.items()
    }

    pub fn users_store(&self) -> &PolledResourceStore<User> {
        &self.users
    }

    pub fn keys_store(&self) -> &PolledResourceStore<AuthKey> {
        &self.keys
    }

    pub fn selected_user(&self) -> Option<String> {
        selected(&self.selected_user)
    }

    /// Switches the key list to `user` and reloads it. A fetch still running
    /// for the previous user is discarded when it lands.
    pub async fn select_user(&self, user: Option<String>) {
        *self
            .selected_user
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = user;
        self.keys.invalidate();
        self.keys.refresh().await;
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.view.set_query(query);
    }

    /// Active keys first by soonest expiry, then the rest by latest expiry.
    pub fn rows(&self) -> Vec<AuthKey> {
        self.view.rows()
    }

    pub fn is_busy(&self, entity_id: &str, kind: CommandKind) -> bool {
        self.guard.is_pending(entity_id, kind)
    }

    /// Issues a key for the form's user. Fails before any request is made when
    /// no user is selected.
    pub async fn create_key(&self, input: &NewAuthKey) -> Result<AuthKey, SyncError> {
        let user = match input.user.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() => user.to_string(),
            _ => {
                let err = SyncError::Validation("select a user before creating a key".to_string());
                warn!(error = %err, "Rejected auth key creation.");
                self.notifier.notify(&err.to_string(), Severity::Error);
                return Err(err);
            }
        };

        let request = CreateAuthKeyRequest::new(user.clone(), input, Utc::now());
        let body = serde_json::to_value(&request).map_err(|e| SyncError::Validation(e.to_string()))?;
        let transport = Arc::clone(&self.transport);
        self.guard
            .run(
                &user,
                CommandKind::Create,
                &format!("Created auth key for {user}"),
                || async move {
                    let created = transport.post(AUTH_KEYS_PATH, body).await?;
                    let created = match created {
                        Value::Object(mut map) if map.contains_key("preAuthKey") => {
                            map.remove("preAuthKey").unwrap_or(Value::Null)
                        }
                        other => other,
                    };
                    serde_json::from_value::<AuthKey>(created).map_err(|e| TransportError::Decode {
                        path: AUTH_KEYS_PATH.to_string(),
                        message: e.to_string(),
                    })
                },
            )
            .await
    }

    /// Expires `key` once the user confirms. A declined prompt sends nothing
    /// and shows nothing.
    pub async fn expire_key(&self, key: &AuthKey) -> Result<(), SyncError> {
        let prompt = format!(
            "Expire auth key {} for {}? Nodes can no longer join with it.",
            key.key, key.user
        );
        if !self.confirm.confirm(&prompt).await {
            info!(key_id = %key.id, "Auth key expiry declined.");
            return Err(SyncError::Cancelled(format!("expire auth key {}", key.id)));
        }

        let request = ExpireAuthKeyRequest {
            user: key.user.clone(),
            key: key.key.clone(),
        };
        let body = serde_json::to_value(&request).map_err(|e| SyncError::Validation(e.to_string()))?;
        let transport = Arc::clone(&self.transport);
        self.guard
            .run(
                &key.id,
                CommandKind::Expire,
                &format!("Expired auth key for {}", key.user),
                || async move { transport.post(EXPIRE_AUTH_KEY_PATH, body).await.map(|_| ()) },
            )
            .await
    }
}

impl Drop for AuthKeyPanel {
    fn drop(&mut self) {
        self.unmount();
    }
}
