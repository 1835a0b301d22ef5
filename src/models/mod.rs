//! JSON-shaped records exchanged with the dashboard API and the stats feed.

pub mod auth_key;
pub mod container;
pub mod logs;
pub mod metrics;

pub use auth_key::{AuthKey, NewAuthKey, User};
pub use container::Container;
pub use logs::{AccessLogRow, QueryLogRow};
pub use metrics::MetricSnapshot;
