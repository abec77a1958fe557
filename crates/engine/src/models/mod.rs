//! Wire types served by the building API and consumed by the kiosk.
//!
//! All payloads are read-only snapshots: each successful sync replaces them
//! wholesale, nothing here is patched in place.

mod building;
mod scene;
mod time_of_day;
mod widget;

pub use building::{Announcement, LatestBill, PublicInfo};
pub use scene::{ActiveWindow, Scene, SceneList, TransitionStyle, MIN_SCENE_DURATION};
pub use widget::{GridPosition, WidgetList, WidgetPlacement, WidgetSettings};
