use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize};

use super::time_of_day;
use super::widget::WidgetPlacement;

/// Shortest time a scene stays on screen, whatever the upstream duration says.
pub const MIN_SCENE_DURATION: Duration = Duration::from_secs(1);

// ─────────────────────────────────────────────────────────────────────────────
// Scene
// ─────────────────────────────────────────────────────────────────────────────

/// How the renderer moves from the previous scene to this one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum TransitionStyle {
    #[default]
    None,
    Fade,
    Slide,
}

impl From<String> for TransitionStyle {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "fade" => Self::Fade,
            "slide" => Self::Slide,
            _ => Self::None,
        }
    }
}

impl std::fmt::Display for TransitionStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Fade => write!(f, "fade"),
            Self::Slide => write!(f, "slide"),
        }
    }
}

/// One full-screen rotation frame of the kiosk display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: i64,
    pub building_id: i64,
    pub name: String,
    /// Position in the rotation sequence (ascending).
    pub order: i32,
    pub duration_seconds: u32,
    #[serde(default, deserialize_with = "transition_or_default")]
    pub transition: TransitionStyle,
    #[serde(default = "default_enabled", deserialize_with = "enabled_or_default")]
    pub enabled: bool,
    #[serde(default, with = "time_of_day")]
    pub active_from: Option<NaiveTime>,
    #[serde(default, with = "time_of_day")]
    pub active_until: Option<NaiveTime>,
    #[serde(default)]
    pub widgets: Vec<WidgetPlacement>,
}

fn default_enabled() -> bool {
    true
}

// An explicit null reads the same as a missing field.
fn transition_or_default<'de, D>(deserializer: D) -> Result<TransitionStyle, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<TransitionStyle>::deserialize(deserializer)?.unwrap_or_default())
}

fn enabled_or_default<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_else(default_enabled))
}

impl Scene {
    pub fn active_window(&self) -> ActiveWindow {
        ActiveWindow {
            start: self.active_from,
            end: self.active_until,
        }
    }

    /// Enabled and inside its active window at `time`.
    pub fn is_eligible_at(&self, time: NaiveTime) -> bool {
        self.enabled && self.active_window().contains(time)
    }

    /// How long the scene stays current once shown.
    pub fn display_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_seconds)).max(MIN_SCENE_DURATION)
    }

    /// Rotation sort key: `order`, then `id` to break ties deterministically.
    pub fn sort_key(&self) -> (i32, i64) {
        (self.order, self.id)
    }
}

/// Time-of-day window during which a scene may be shown.
///
/// Start is inclusive, end is exclusive. A start later than the end wraps
/// midnight (`22:00-06:00`). A missing bound is open towards midnight, and a
/// window with no bounds (or identical bounds) is always active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveWindow {
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

impl ActiveWindow {
    pub fn contains(&self, time: NaiveTime) -> bool {
        match (self.start, self.end) {
            (None, None) => true,
            (Some(start), None) => time >= start,
            (None, Some(end)) => time < end,
            (Some(start), Some(end)) if start == end => true,
            (Some(start), Some(end)) if start < end => time >= start && time < end,
            (Some(start), Some(end)) => time >= start || time < end,
        }
    }
}

/// Response of the active-scenes endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneList {
    pub scenes: Vec<Scene>,
}
