//! Read-only projections over polled collections.
//!
//! Nothing here is cached: every call to [`DerivedView::rows`] filters and sorts
//! the store's current collection with the current query. Recomputation is
//! needed whenever the store replaces its collection (observable through
//! [`DerivedView::changed`]) or the query changes.

use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::watch;

use super::polled_store::{PolledCollection, PolledResourceStore};
use crate::models::AuthKey;

/// Fields a list row exposes to the search box.
pub trait Searchable {
    fn search_fields(&self) -> Vec<Cow<'_, str>>;
}

/// Case-insensitive substring match against any searchable field. An empty
/// query matches every row.
pub fn matches_query<T: Searchable + ?Sized>(row: &T, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    row.search_fields()
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// Filters then sorts. `sort_by` is stable, so rows that compare equal keep
/// their source order.
pub fn project<T, P, C>(rows: &[T], mut predicate: P, compare: Option<C>) -> Vec<T>
where
    T: Clone,
    P: FnMut(&T) -> bool,
    C: FnMut(&T, &T) -> Ordering,
{
    let mut projected: Vec<T> = rows.iter().filter(|row| predicate(row)).cloned().collect();
    if let Some(compare) = compare {
        projected.sort_by(compare);
    }
    projected
}

/// Orders auth keys for display: active keys first, soonest expiry first;
/// then inactive keys (expired or used), most recent expiry first.
pub fn compare_auth_keys(a: &AuthKey, b: &AuthKey, now: DateTime<Utc>) -> Ordering {
    match (a.is_active(now), b.is_active(now)) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => a.expiration.cmp(&b.expiration),
        (false, false) => b.expiration.cmp(&a.expiration),
    }
}

/// Sorts in place with a single reading of "now" for the whole sort.
pub fn sort_auth_keys(keys: &mut [AuthKey], now: DateTime<Utc>) {
    keys.sort_by(|a, b| compare_auth_keys(a, b, now));
}

type Sorter<T> = Arc<dyn Fn(&mut Vec<T>) + Send + Sync>;

/// A search-filtered, optionally sorted view over one store.
pub struct DerivedView<T> {
    source: watch::Receiver<Arc<PolledCollection<T>>>,
    query: String,
    sorter: Option<Sorter<T>>,
}

impl<T> DerivedView<T>
where
    T: Searchable + Clone + Send + Sync + 'static,
{
    pub fn new(store: &PolledResourceStore<T>) -> Self {
        Self {
            source: store.watch(),
            query: String::new(),
            sorter: None,
        }
    }

    /// Applies `sorter` to the filtered rows on every read.
    pub fn with_sorter(mut self, sorter: impl Fn(&mut Vec<T>) + Send + Sync + 'static) -> Self {
        self.sorter = Some(Arc::new(sorter));
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn rows(&self) -> Vec<T> {
        let collection = Arc::clone(&self.source.borrow());
        let mut rows = project(
            &collection.items,
            |row| matches_query(row, &self.query),
            None::<fn(&T, &T) -> Ordering>,
        );
        if let Some(sorter) = &self.sorter {
            sorter(&mut rows);
        }
        rows
    }

    /// Waits until the store replaces its collection. Returns `false` once the
    /// store is gone.
    pub async fn changed(&mut self) -> bool {
        self.source.changed().await.is_ok()
    }
}

impl DerivedView<AuthKey> {
    pub fn auth_keys(store: &PolledResourceStore<AuthKey>) -> Self {
        Self::new(store).with_sorter(|keys| sort_auth_keys(keys, Utc::now()))
    }
}
