use serde_json::{json, Value};

use crate::types::{OverlayRequest, OverlayTermination, Presence, RateLimit, ZoneId};

pub const DEFAULT_BASE_URL: &str = "https://my.tado.com/api/v2";
pub const DEFAULT_TOKEN_URL: &str = "https://login.tado.com/oauth2/token";
pub const DEFAULT_DEVICE_AUTHORIZE_URL: &str = "https://login.tado.com/oauth2/device_authorize";
pub const OAUTH_CLIENT_ID: &str = "1bb50063-6b0c-4d11-bd99-387f4a91cc46";
pub const OAUTH_SCOPE: &str = "offline_access";
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

pub const RATE_LIMIT_HEADER: &str = "ratelimit";
pub const RATE_LIMIT_POLICY_HEADER: &str = "ratelimit-policy";

pub fn overlay_body(overlays: &[OverlayRequest], termination: OverlayTermination) -> Value {
    let termination = termination_data(termination);
    let entries: Vec<Value> = overlays
        .iter()
        .map(|o| {
            let mut setting = json!({
                "type": "HEATING",
                "power": o.power,
            });
            if let Some(temp) = o.temperature {
                setting["temperature"] = json!(temp);
            }
            if o.is_boost {
                setting["isBoost"] = json!(true);
            }
            json!({
                "room": o.zone.0.to_string(),
                "overlay": {
                    "setting": setting,
                    "termination": termination,
                }
            })
        })
        .collect();
    json!({ "overlays": entries })
}

fn termination_data(termination: OverlayTermination) -> Value {
    match termination {
        OverlayTermination::Manual => json!({ "typeSkillBasedApp": "MANUAL" }),
        OverlayTermination::NextTimeBlock => json!({ "typeSkillBasedApp": "NEXT_TIME_BLOCK" }),
        OverlayTermination::Timer { seconds } => json!({
            "typeSkillBasedApp": "TIMER",
            "durationInSeconds": seconds,
        }),
    }
}

pub fn presence_body(presence: Presence) -> Value {
    json!({ "homePresence": presence.as_tado_str() })
}

/// `rooms=1,2,3` query value for clearing overlays.
pub fn rooms_query(zones: &[ZoneId]) -> String {
    zones
        .iter()
        .map(|z| z.0.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Pulls `key=<n>` out of a structured header such as `"perday";r=4999;t=512`.
fn header_param(header: &str, key: &str) -> Option<u64> {
    header.split(';').find_map(|part| {
        let (k, v) = part.trim().split_once('=')?;
        if k.trim() == key { v.trim().parse().ok() } else { None }
    })
}

/// Combines the `RateLimit-Policy` quota with the `RateLimit` remainder.
pub fn parse_rate_limit(policy: Option<&str>, current: Option<&str>) -> Option<RateLimit> {
    let remaining = header_param(current?, "r")?;
    let limit = policy.and_then(|p| header_param(p, "q")).unwrap_or(0);
    Some(RateLimit { remaining, limit })
}
