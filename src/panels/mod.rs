//! Per-view wiring. Each panel owns its stores, windows and guards, starts
//! them on `mount` and stops them on `unmount` or drop.

pub mod auth_keys;
pub mod containers;
pub mod logs;
pub mod traffic;

pub use auth_keys::AuthKeyPanel;
pub use containers::ContainerPanel;
pub use logs::LogPanel;
pub use traffic::TrafficPanel;
