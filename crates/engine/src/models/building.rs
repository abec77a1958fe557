use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Building-wide information shown alongside the scenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicInfo {
    #[serde(default)]
    pub building_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub announcements: Vec<Announcement>,
}

impl PublicInfo {
    /// Neutral block shown until the first live response arrives.
    pub fn placeholder() -> Self {
        Self {
            building_name: "Welcome".to_string(),
            address: None,
            announcements: Vec::new(),
        }
    }

    /// Announcements in display order: pinned first, then newest first.
    pub fn display_order(&self) -> Vec<&Announcement> {
        let mut announcements: Vec<&Announcement> = self.announcements.iter().collect();
        announcements.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.published_at.cmp(&a.published_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        announcements
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// The most recent building bill, rendered as an image on the display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestBill {
    #[serde(default)]
    pub image_url: Option<String>,
    /// Billing period label, e.g. "2026-09".
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
}

impl LatestBill {
    pub fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}
