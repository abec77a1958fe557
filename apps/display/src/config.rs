use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use lobbyboard_sync::SourceTimeouts;

pub struct Config {
    pub api_base_url: String,
    pub building_id: i64,
    pub settings_path: PathBuf,
    pub usage_meter: bool,
    pub timeouts: SourceTimeouts,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_base_url = lookup("LOBBYBOARD_API_BASE_URL")
            .unwrap_or_else(|| "http://localhost:8080/api".into());

        let raw_building = lookup("LOBBYBOARD_BUILDING_ID").context("LOBBYBOARD_BUILDING_ID is not set")?;
        let building_id: i64 = raw_building
            .trim()
            .parse()
            .with_context(|| format!("Invalid LOBBYBOARD_BUILDING_ID: {}", raw_building))?;
        if building_id <= 0 {
            bail!("LOBBYBOARD_BUILDING_ID must be positive, got {}", building_id);
        }

        let settings_path = lookup("LOBBYBOARD_SETTINGS_PATH")
            .unwrap_or_else(|| "./lobbyboard-settings.json".into())
            .into();
        let usage_meter = lookup("LOBBYBOARD_USAGE_METER")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let defaults = SourceTimeouts::default();
        let timeout = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        let timeouts = SourceTimeouts {
            scenes: timeout("LOBBYBOARD_SCENES_TIMEOUT_MS", defaults.scenes),
            widgets: timeout("LOBBYBOARD_WIDGETS_TIMEOUT_MS", defaults.widgets),
            public_info: timeout("LOBBYBOARD_PUBLIC_INFO_TIMEOUT_MS", defaults.public_info),
            latest_bill: timeout("LOBBYBOARD_LATEST_BILL_TIMEOUT_MS", defaults.latest_bill),
        };

        Ok(Self {
            api_base_url,
            building_id,
            settings_path,
            usage_meter,
            timeouts,
        })
    }
}
