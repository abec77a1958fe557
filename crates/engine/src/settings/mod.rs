//! Sync settings and their propagation between display contexts.
//!
//! Settings live in durable key-value storage under [`SETTINGS_KEY`]. Writes
//! are announced on a [`StorageBus`]; every other context sharing the bus
//! picks the change up without a network round-trip. The writer never hears
//! its own announcement and applies the change locally instead.
//!
//! Processes do not share a bus. A [`SettingsFileWatcher`] bridges them by
//! turning writes to a [`JsonFileStorage`] file into bus announcements.

mod bus;
mod file_watch;
mod model;
mod storage;
mod sync;

pub use bus::{ContextId, StorageBus, StorageChange};
pub use file_watch::SettingsFileWatcher;
pub use model::{
    SyncSettings, DEFAULT_POLL_INTERVAL_MINUTES, MAX_POLL_INTERVAL_MINUTES,
    MIN_POLL_INTERVAL_MINUTES,
};
pub use storage::{JsonFileStorage, MemoryStorage, SettingsStorage};
pub use sync::{ChangeSubscription, SettingsSync};

/// Storage key holding the serialized [`SyncSettings`].
pub const SETTINGS_KEY: &str = "lobbyboard.kiosk.sync-settings";

/// Change notifications are filtered on this key prefix.
pub const SETTINGS_KEY_PREFIX: &str = "lobbyboard.kiosk.";
