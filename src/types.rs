use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::rust::double_option;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HomeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub u64);

impl fmt::Display for HomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cache key: a zone is only unique within its home.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneKey {
    pub home: HomeId,
    pub zone: ZoneId,
}

impl ZoneKey {
    pub fn new(home: HomeId, zone: ZoneId) -> Self {
        Self { home, zone }
    }
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.home, self.zone)
    }
}

/// Plain `{celsius, fahrenheit}` pair as used in settings and overlays.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TemperatureReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub celsius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fahrenheit: Option<f64>,
}

/// Payload field that tells an explicit `null` (`Some(None)`) apart from a
/// missing key (`None`), so both survive reserialization.
pub type Nullable<T> = Option<Option<T>>;

fn value<T>(field: &Nullable<T>) -> Option<&T> {
    field.as_ref()?.as_ref()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemperatureDataPoint {
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub celsius: Nullable<f64>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub fahrenheit: Nullable<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TemperatureDataPoint {
    pub fn reading(&self) -> TemperatureReading {
        TemperatureReading {
            celsius: self.celsius.flatten(),
            fahrenheit: self.fahrenheit.flatten(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PercentageDataPoint {
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub percentage: Nullable<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorDataPoints {
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub inside_temperature: Nullable<TemperatureDataPoint>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub humidity: Nullable<PercentageDataPoint>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Power {
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSetting {
    #[serde(
        rename = "type",
        default,
        with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Nullable<String>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub power: Nullable<Power>,
    /// `null` while the zone is powered off.
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub temperature: Nullable<TemperatureDataPoint>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub is_boost: Nullable<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Termination {
    #[serde(
        rename = "type",
        default,
        with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Nullable<String>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub type_skill_based_app: Nullable<String>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub duration_in_seconds: Nullable<i64>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub remaining_time_in_seconds: Nullable<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    #[serde(
        rename = "type",
        default,
        with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Nullable<String>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub setting: Nullable<ZoneSetting>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub termination: Nullable<Termination>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// State of one zone as returned by the cloud. Fields not modelled here are
/// kept in `extra`, and explicit nulls stay nulls, so the payload serializes
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneState {
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub sensor_data_points: Nullable<SensorDataPoints>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub setting: Nullable<ZoneSetting>,
    /// `null` while the zone follows its schedule.
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub overlay: Nullable<Overlay>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ZoneState {
    pub fn inside_temperature(&self) -> Option<TemperatureReading> {
        let points = value(&self.sensor_data_points)?;
        value(&points.inside_temperature).map(TemperatureDataPoint::reading)
    }

    pub fn humidity(&self) -> Option<f64> {
        let points = value(&self.sensor_data_points)?;
        value(&points.humidity)?.percentage.flatten()
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        value(&self.overlay)
    }

    pub fn mode(&self) -> ZoneMode {
        ZoneMode::of(self)
    }
}

/// How a zone is currently being driven.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneMode {
    /// No overlay; the zone follows its smart schedule.
    Schedule,
    /// Manual overlay with an optional target.
    Manual { target: Option<TemperatureReading> },
    /// Timed boost overlay.
    Boost { remaining: Option<Duration> },
}

impl ZoneMode {
    pub fn of(state: &ZoneState) -> Self {
        let Some(overlay) = state.overlay() else {
            return ZoneMode::Schedule;
        };
        let setting = value(&overlay.setting);
        let termination = value(&overlay.termination);
        let boost_flag = setting.and_then(|s| value(&s.is_boost)).copied().unwrap_or(false);
        let timer = termination
            .and_then(|t| value(&t.type_skill_based_app))
            .is_some_and(|kind| kind == "TIMER");

        if boost_flag || timer {
            let remaining = termination
                .and_then(|t| value(&t.remaining_time_in_seconds))
                .map(|s| Duration::from_secs((*s).max(0) as u64));
            ZoneMode::Boost { remaining }
        } else {
            ZoneMode::Manual {
                target: setting
                    .and_then(|s| value(&s.temperature))
                    .map(TemperatureDataPoint::reading),
            }
        }
    }
}

/// Batch answer of the zone-states endpoint, keyed by decimal zone id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStates {
    #[serde(default)]
    pub zone_states: BTreeMap<String, ZoneState>,
}

impl ZoneStates {
    pub fn get(&self, zone: ZoneId) -> Option<&ZoneState> {
        self.zone_states.get(&zone.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub remaining: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Presence {
    Home,
    Away,
}

impl Presence {
    pub fn toggled(self) -> Self {
        match self {
            Presence::Home => Presence::Away,
            Presence::Away => Presence::Home,
        }
    }

    pub fn as_tado_str(&self) -> &'static str {
        match self {
            Presence::Home => "HOME",
            Presence::Away => "AWAY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HomeSummary {
    pub id: HomeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Me {
    #[serde(default)]
    pub homes: Vec<HomeSummary>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HomeState {
    pub presence: Presence,
}

/// How long a new overlay stays in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayTermination {
    Manual,
    Timer { seconds: u64 },
    NextTimeBlock,
}

/// One zone's entry in a bulk overlay request.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRequest {
    pub zone: ZoneId,
    pub power: Power,
    pub temperature: Option<TemperatureReading>,
    pub is_boost: bool,
}

/// `90s` -> `2m`, `3720s` -> `1h 2m`.
pub fn format_remaining(remaining: Duration) -> String {
    let minutes = remaining.as_secs().div_ceil(60);
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}
