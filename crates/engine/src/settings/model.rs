use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_POLL_INTERVAL_MINUTES: u32 = 5;
pub const MIN_POLL_INTERVAL_MINUTES: u32 = 1;
pub const MAX_POLL_INTERVAL_MINUTES: u32 = 60;

/// User-tunable polling parameters shared by every display context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    pub poll_interval_minutes: u32,
    pub enabled: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_minutes: DEFAULT_POLL_INTERVAL_MINUTES,
            enabled: true,
        }
    }
}

impl SyncSettings {
    /// Build settings, clamping the interval into the supported range.
    pub fn new(poll_interval_minutes: u32, enabled: bool) -> Self {
        Self {
            poll_interval_minutes: clamp_minutes(poll_interval_minutes),
            enabled,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::from(clamp_minutes(self.poll_interval_minutes)) * 60)
    }

    /// Parse persisted settings, falling back field by field to defaults.
    ///
    /// Malformed JSON, a non-object document or a partial object never fail:
    /// whatever cannot be read is replaced by the default for that field.
    pub fn from_json(raw: &str) -> Self {
        let defaults = Self::default();

        let document: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Persisted sync settings are not valid JSON, using defaults: {}", e);
                return defaults;
            }
        };

        let Some(fields) = document.as_object() else {
            warn!("Persisted sync settings are not a JSON object, using defaults");
            return defaults;
        };

        let poll_interval_minutes = fields
            .get("pollIntervalMinutes")
            .and_then(read_minutes)
            .unwrap_or_else(|| {
                debug!("pollIntervalMinutes missing or unreadable, using default");
                defaults.poll_interval_minutes
            });

        let enabled = fields.get("enabled").and_then(read_flag).unwrap_or_else(|| {
            debug!("enabled flag missing or unreadable, using default");
            defaults.enabled
        });

        Self::new(poll_interval_minutes, enabled)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn clamp_minutes(minutes: u32) -> u32 {
    minutes.clamp(MIN_POLL_INTERVAL_MINUTES, MAX_POLL_INTERVAL_MINUTES)
}

fn read_minutes(value: &Value) -> Option<u32> {
    let minutes = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !minutes.is_finite() {
        return None;
    }
    // Saturating float-to-int cast; clamping happens in `SyncSettings::new`.
    Some(minutes.round().max(0.0) as u32)
}

fn read_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
