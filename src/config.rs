use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::temperature::TemperatureUnit;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const THROTTLED_POLL_INTERVAL: Duration = Duration::from_secs(120);
pub const RATE_LIMIT_LOW_WATER: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Floor applied to every requested interval.
    pub min_interval: Duration,
    /// Remaining calls below which polling slows down.
    pub low_water_mark: u64,
    pub throttled_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            min_interval: MIN_POLL_INTERVAL,
            low_water_mark: RATE_LIMIT_LOW_WATER,
            throttled_interval: THROTTLED_POLL_INTERVAL,
        }
    }
}

impl PollConfig {
    pub fn clamp(&self, interval: Duration) -> Duration {
        interval.max(self.min_interval)
    }
}

/// Plugin-wide settings as persisted by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(rename = "access_token", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(rename = "refresh_token", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_unit: Option<TemperatureUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_set_at: Option<DateTime<Utc>>,
}

impl GlobalSettings {
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_seconds.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clamp_enforces_floor() {
        let cfg = PollConfig::default();
        assert_eq!(cfg.clamp(Duration::from_secs(5)), MIN_POLL_INTERVAL);
        assert_eq!(cfg.clamp(Duration::from_secs(90)), Duration::from_secs(90));
    }

    #[test]
    fn settings_use_host_field_names() {
        let settings: GlobalSettings = serde_json::from_value(json!({
            "refresh_token": "abc",
            "pollIntervalSeconds": 45,
            "defaultUnit": "fahrenheit",
            "refreshTokenSetAt": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(settings.refresh_token.as_deref(), Some("abc"));
        assert_eq!(settings.poll_interval(), Some(Duration::from_secs(45)));
        assert_eq!(settings.default_unit, Some(TemperatureUnit::Fahrenheit));
        assert!(settings.refresh_token_set_at.is_some());
    }
}
