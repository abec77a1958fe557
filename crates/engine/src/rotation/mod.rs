//! Scene rotation.
//!
//! [`SceneRotation`] is the pure state machine: it is told the time and
//! decides which scene is current. [`RotationController`] drives it from a
//! Tokio task with a single rescheduled timer.

mod controller;
mod state;

pub use controller::{RotationController, RotationHandle, ELIGIBILITY_RECHECK};
pub use state::{ActiveScene, RotationState, SceneRotation};
