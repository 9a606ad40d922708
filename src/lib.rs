pub mod config;
pub mod core;
pub mod logging;

pub use config::{ConfigError, RootPair};
pub use core::{DirectoryComparator, SyncEngine, SyncReport};
