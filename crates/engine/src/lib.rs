//! Lobbyboard Engine - display-side state for the lobby kiosk.
//!
//! This crate owns everything the kiosk needs that does not touch the network:
//!
//! - [`models`]: wire types for scenes, widget placements and public building data
//! - [`rotation`]: the scene rotation state machine and its timer driver
//! - [`settings`]: durable sync settings and their propagation across display contexts
//! - [`fallback`]: the static payloads shown while the backend is unreachable
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lobbyboard_engine::{RotationController, SystemClock};
//!
//! let rotation = RotationController::spawn(Arc::new(SystemClock));
//! rotation.replace_scenes(scenes);
//! let mut frames = rotation.subscribe();
//! ```

pub mod clock;
pub mod errors;
pub mod fallback;
pub mod models;
pub mod rotation;
pub mod settings;

pub use clock::{Clock, FixedClock, SystemClock};
pub use errors::{Error, Result};
pub use fallback::{FallbackPayload, SyncSourceId};
pub use models::*;
pub use rotation::{ActiveScene, RotationController, RotationHandle, RotationState, SceneRotation};
pub use settings::{
    ChangeSubscription, ContextId, JsonFileStorage, MemoryStorage, SettingsFileWatcher,
    SettingsStorage, SettingsSync, StorageBus, StorageChange, SyncSettings,
};
