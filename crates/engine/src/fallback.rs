//! Static payloads shown while a sync source is unreachable.
//!
//! Every polled source has a structurally valid stand-in so that the display
//! always renders "no content yet" rather than an error state.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::models::{LatestBill, PublicInfo, SceneList, WidgetList};

/// Identifies one polled endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncSourceId {
    Scenes,
    Widgets,
    PublicInfo,
    LatestBill,
}

impl SyncSourceId {
    pub const ALL: [SyncSourceId; 4] = [
        Self::Scenes,
        Self::Widgets,
        Self::PublicInfo,
        Self::LatestBill,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scenes => "scenes",
            Self::Widgets => "widgets",
            Self::PublicInfo => "public-info",
            Self::LatestBill => "latest-bill",
        }
    }

    /// Client-side timeout for one poll of this source.
    ///
    /// The latest bill carries an image reference and is served noticeably
    /// slower than the JSON-only sources.
    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::Scenes | Self::Widgets | Self::PublicInfo => Duration::from_secs(5),
            Self::LatestBill => Duration::from_secs(15),
        }
    }

    /// API path for this source, relative to the API base URL.
    pub fn path_for_building(&self, building_id: i64) -> String {
        match self {
            Self::Scenes => format!("/kiosk/buildings/{building_id}/scenes/active"),
            Self::Widgets => format!("/kiosk/buildings/{building_id}/widgets"),
            Self::PublicInfo => format!("/public-info/buildings/{building_id}"),
            Self::LatestBill => format!("/kiosk/buildings/{building_id}/latest-bill"),
        }
    }
}

impl std::fmt::Display for SyncSourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload type that belongs to exactly one sync source and has a static fallback.
pub trait FallbackPayload: DeserializeOwned + Send + Sync + 'static {
    const SOURCE: SyncSourceId;

    fn fallback() -> Self;
}

impl FallbackPayload for SceneList {
    const SOURCE: SyncSourceId = SyncSourceId::Scenes;

    fn fallback() -> Self {
        Self { scenes: Vec::new() }
    }
}

impl FallbackPayload for WidgetList {
    const SOURCE: SyncSourceId = SyncSourceId::Widgets;

    fn fallback() -> Self {
        Self {
            widgets: Vec::new(),
        }
    }
}

impl FallbackPayload for PublicInfo {
    const SOURCE: SyncSourceId = SyncSourceId::PublicInfo;

    fn fallback() -> Self {
        Self::placeholder()
    }
}

impl FallbackPayload for LatestBill {
    const SOURCE: SyncSourceId = SyncSourceId::LatestBill;

    fn fallback() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reencodes<T: FallbackPayload + serde::Serialize>() -> bool {
        let value = serde_json::to_value(T::fallback()).unwrap();
        serde_json::from_value::<T>(value).is_ok()
    }

    #[test]
    fn test_fallbacks_match_their_wire_schema() {
        assert!(reencodes::<SceneList>());
        assert!(reencodes::<WidgetList>());
        assert!(reencodes::<PublicInfo>());
        assert!(reencodes::<LatestBill>());
    }

    #[test]
    fn test_every_source_has_a_payload_type() {
        let covered = [
            SceneList::SOURCE,
            WidgetList::SOURCE,
            PublicInfo::SOURCE,
            LatestBill::SOURCE,
        ];
        for source in SyncSourceId::ALL {
            assert!(covered.contains(&source), "{source} has no fallback");
        }
    }

    #[test]
    fn test_latest_bill_has_the_longest_timeout() {
        for source in SyncSourceId::ALL {
            assert!(source.default_timeout() <= SyncSourceId::LatestBill.default_timeout());
        }
    }
}
