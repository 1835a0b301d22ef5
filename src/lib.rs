pub mod config;
pub mod confirm;
pub mod error;
pub mod feed;
pub mod live;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod panels;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;
