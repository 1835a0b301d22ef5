use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::live::derived_view::Searchable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
}

impl Searchable for User {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![Cow::Borrowed(&self.name)]
    }
}

/// A pre-authentication key issued to a mesh user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthKey {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub reusable: bool,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default)]
    pub used: bool,
    pub expiration: DateTime<Utc>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub acl_tags: Vec<String>,
}

impl AuthKey {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }

    /// Active keys can still be used to join a node: not expired and not consumed.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.used
    }
}

impl Searchable for AuthKey {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        let mut fields = vec![Cow::Borrowed(self.key.as_str()), Cow::Borrowed(self.user.as_str())];
        fields.extend(self.acl_tags.iter().map(|tag| Cow::Borrowed(tag.as_str())));
        fields
    }
}

/// Form input for issuing a key. `user` stays `None` until one is selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAuthKey {
    pub user: Option<String>,
    pub reusable: bool,
    pub ephemeral: bool,
    pub expires_in_days: u32,
    pub acl_tags: Vec<String>,
}

/// Body of `POST /api/preauthkeys`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuthKeyRequest {
    pub user: String,
    pub reusable: bool,
    pub ephemeral: bool,
    pub expiration: DateTime<Utc>,
    pub acl_tags: Vec<String>,
}

impl CreateAuthKeyRequest {
    pub fn new(user: String, input: &NewAuthKey, now: DateTime<Utc>) -> Self {
        Self {
            user,
            reusable: input.reusable,
            ephemeral: input.ephemeral,
            expiration: now + Duration::days(i64::from(input.expires_in_days.max(1))),
            acl_tags: input.acl_tags.clone(),
        }
    }
}

/// Body of `POST /api/preauthkeys/expire`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpireAuthKeyRequest {
    pub user: String,
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_auth_key() {
        let key: AuthKey = serde_json::from_value(json!({
            "id": "7",
            "key": "a1b2c3",
            "user": "alice",
            "reusable": true,
            "expiration": "2026-10-20T12:00:00Z",
            "createdAt": "2026-10-18T12:00:00Z",
            "aclTags": ["tag:server"]
        }))
        .unwrap();
        assert_eq!(key.user, "alice");
        assert!(key.reusable);
        assert!(!key.used);
        assert_eq!(key.acl_tags, vec!["tag:server".to_string()]);
    }

    #[test]
    fn test_activity_class() {
        let now = Utc::now();
        let mut key = AuthKey {
            id: "1".to_string(),
            key: "k".to_string(),
            user: "bob".to_string(),
            reusable: false,
            ephemeral: false,
            used: false,
            expiration: now + Duration::hours(1),
            created_at: None,
            acl_tags: Vec::new(),
        };
        assert!(key.is_active(now));

        key.used = true;
        assert!(!key.is_active(now));

        key.used = false;
        key.expiration = now;
        assert!(key.is_expired(now));
        assert!(!key.is_active(now));
    }

    #[test]
    fn test_create_request_expiration() {
        let now = Utc::now();
        let input = NewAuthKey {
            user: Some("alice".to_string()),
            expires_in_days: 0,
            ..Default::default()
        };
        let request = CreateAuthKeyRequest::new("alice".to_string(), &input, now);
        assert_eq!(request.expiration, now + Duration::days(1));
    }
}
