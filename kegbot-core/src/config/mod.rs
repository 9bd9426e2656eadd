//! Runtime configuration held by the core.
//!
//! Static settings live in [`kegbot_sdk::config`]; this module holds the
//! parts that can change while running.

mod config_store;

pub use config_store::{ConfigStore, ConfigWatcher};

use kegbot_sdk::config::TapConfig;

/// The configured tap set, reconciled by the core service on every update.
pub type TapStore = ConfigStore<Vec<TapConfig>>;
pub type TapWatcher = ConfigWatcher<Vec<TapConfig>>;
