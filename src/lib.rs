pub mod booking;
pub mod config;
pub mod directory;
pub mod limits;
pub mod model;
pub mod notifier;
pub mod notify;
pub mod observability;
pub mod reconciler;
pub mod store;
pub mod system;
pub mod wal;
