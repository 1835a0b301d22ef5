use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::live::derived_view::Searchable;

/// One DNS lookup as recorded by the filtering resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLogRow {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub query_type: String,
    /// Filtering verdict, e.g. `NotFilteredNotFound`, `FilteredBlackList`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub elapsed_ms: f64,
    #[serde(default)]
    pub upstream: String,
}

impl QueryLogRow {
    pub fn is_blocked(&self) -> bool {
        self.status.starts_with("Filtered")
    }
}

impl Searchable for QueryLogRow {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(&self.domain),
            Cow::Borrowed(&self.client),
            Cow::Borrowed(&self.status),
            Cow::Borrowed(&self.query_type),
        ]
    }
}

/// One request as recorded by the reverse proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogRow {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub client_ip: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub status: u16,
    /// Log file the row was read from.
    #[serde(default)]
    pub log_path: String,
    #[serde(default)]
    pub duration_ms: f64,
}

impl Searchable for AccessLogRow {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(&self.host),
            Cow::Borrowed(&self.path),
            Cow::Borrowed(&self.client_ip),
            Cow::Borrowed(&self.log_path),
            Cow::Borrowed(&self.method),
            Cow::Owned(self.status.to_string()),
        ]
    }
}
