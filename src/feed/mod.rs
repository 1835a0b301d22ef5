//! Push-channel side of the dashboard: the keyed hub every panel subscribes
//! through, and the websocket connector that fills it.

pub mod connector;
pub mod hub;

pub use connector::{FeedConnector, FeedError};
pub use hub::{FeedHub, FeedReceiver, SubscriberId};
