use serde::{Deserialize, Serialize};

/// Opaque widget configuration, interpreted only by the widget renderer.
pub type WidgetSettings = serde_json::Map<String, serde_json::Value>;

/// Cell span of a widget on the scene layout grid (1-based, end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPosition {
    pub row_start: i32,
    pub col_start: i32,
    pub row_end: i32,
    pub col_end: i32,
}

/// A positioned widget instance within a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetPlacement {
    pub id: i64,
    /// Absent for placements served by the building-wide widgets endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<i64>,
    /// Key into the renderer's widget registry (e.g. "clock", "weather").
    pub widget_type: String,
    #[serde(flatten)]
    pub grid: GridPosition,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub settings: WidgetSettings,
}

/// Response of the building widgets endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetList {
    pub widgets: Vec<WidgetPlacement>,
}
