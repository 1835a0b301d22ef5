//! Live data synchronization: the pieces that keep panel state correct while
//! the stats feed pushes, stores poll, and the user issues commands.

pub mod action_guard;
pub mod derived_view;
pub mod metric_feed;
pub mod polled_store;
pub mod time_series;

pub use action_guard::{ActionGuard, ActionKey, ActionToken, CommandKind, Refresh};
pub use derived_view::{DerivedView, Searchable};
pub use metric_feed::{Clock, MetricsFeedSubscriber, SystemClock};
pub use polled_store::{ApiFetcher, Fetch, PollHandle, PolledCollection, PolledResourceStore, RefreshOutcome};
pub use time_series::{SharedWindow, TimeSeriesWindow, WindowSnapshot, DEFAULT_WINDOW_CAPACITY};
