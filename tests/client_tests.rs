use tado_deck::{
    Error, HomeId, MessageLogMode, OverlayRequest, OverlayTermination, Power, Presence, RateLimit,
    TadoClient, TemperatureReading, ZoneApi, ZoneId, ZoneMode,
};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> TadoClient {
    TadoClient::builder()
        .base_url(server.uri())
        .bearer_token("test-token")
        .build()
        .expect("client should build")
}

fn zone_states_body() -> serde_json::Value {
    serde_json::json!({
        "zoneStates": {
            "1": {
                "sensorDataPoints": {
                    "insideTemperature": { "celsius": 20.5, "fahrenheit": 68.9 },
                    "humidity": { "percentage": 51.2 }
                },
                "setting": { "type": "HEATING", "power": "ON", "temperature": { "celsius": 21.0 } }
            },
            "2": {
                "sensorDataPoints": { "insideTemperature": { "celsius": 18.0 } },
                "overlay": {
                    "setting": {
                        "type": "HEATING",
                        "power": "ON",
                        "temperature": { "celsius": 25.0 },
                        "isBoost": true
                    },
                    "termination": { "typeSkillBasedApp": "TIMER", "remainingTimeInSeconds": 1200 }
                },
                "openWindow": null
            }
        }
    })
}

#[tokio::test]
async fn zone_states_parses_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/homes/7/zoneStates"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(zone_states_body()))
        .expect(1)
        .mount(&server)
        .await;

    let states = client(&server).zone_states(HomeId(7)).await.unwrap();

    let living = states.get(ZoneId(1)).expect("zone 1 present");
    assert_eq!(living.inside_temperature().unwrap().celsius, Some(20.5));
    assert_eq!(living.humidity(), Some(51.2));
    assert_eq!(living.mode(), ZoneMode::Schedule);

    let bath = states.get(ZoneId(2)).expect("zone 2 present");
    assert!(matches!(bath.mode(), ZoneMode::Boost { .. }));
    assert!(bath.extra.contains_key("openWindow"));
    assert!(states.get(ZoneId(3)).is_none());
}

#[tokio::test]
async fn rate_limit_headers_are_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/homes/7/zones/1/state"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ratelimit-policy", "\"perday\";q=1000;w=86400")
                .insert_header("ratelimit", "\"perday\";r=87;t=3600")
                .set_body_json(serde_json::json!({ "sensorDataPoints": {} })),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(client.rate_limit(), None);

    client.zone_state(HomeId(7), ZoneId(1)).await.unwrap();
    let expected = RateLimit { remaining: 87, limit: 1000 };
    assert_eq!(client.rate_limit(), Some(expected));
    assert_eq!(ZoneApi::rate_limit(&client).await.unwrap(), Some(expected));
}

#[tokio::test]
async fn unauthorized_maps_to_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/homes/7/zoneStates"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let err = client(&server).zone_states(HomeId(7)).await.unwrap_err();
    assert!(err.is_unauthorized(), "expected 401, got {err:?}");
    assert!(matches!(err, Error::Api { status: 401, ref message } if message == "token expired"));
}

#[tokio::test]
async fn missing_token_is_not_authenticated() {
    let server = MockServer::start().await;
    let client = TadoClient::builder().base_url(server.uri()).build().unwrap();

    let err = client.me().await.unwrap_err();
    assert!(matches!(err, Error::NotAuthenticated), "got {err:?}");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn me_and_zones_list_homes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "Sam",
            "homes": [{ "id": 7, "name": "Cottage" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/homes/7/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": 1, "name": "Living", "type": "HEATING" },
            { "id": 2, "name": "Bath", "type": "HEATING" }
        ])))
        .mount(&server)
        .await;

    let client = client(&server);
    let me = client.me().await.unwrap();
    assert_eq!(me.homes.len(), 1);
    assert_eq!(me.homes[0].id, HomeId(7));

    let zones = client.zones(HomeId(7)).await.unwrap();
    assert_eq!(zones.iter().map(|z| z.name.as_str()).collect::<Vec<_>>(), ["Living", "Bath"]);
}

#[tokio::test]
async fn set_zone_overlays_sends_bulk_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/homes/7/overlay"))
        .and(body_json(serde_json::json!({
            "overlays": [{
                "room": "2",
                "overlay": {
                    "setting": {
                        "type": "HEATING",
                        "power": "ON",
                        "temperature": { "celsius": 25.0 },
                        "isBoost": true
                    },
                    "termination": { "typeSkillBasedApp": "TIMER", "durationInSeconds": 1800 }
                }
            }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let request = OverlayRequest {
        zone: ZoneId(2),
        power: Power::On,
        temperature: Some(TemperatureReading {
            celsius: Some(25.0),
            fahrenheit: None,
        }),
        is_boost: true,
    };
    client(&server)
        .set_zone_overlays(HomeId(7), &[request], OverlayTermination::Timer { seconds: 1800 })
        .await
        .unwrap();
}

#[tokio::test]
async fn clear_zone_overlays_lists_rooms() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/homes/7/overlay"))
        .and(query_param("rooms", "1,2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .clear_zone_overlays(HomeId(7), &[ZoneId(1), ZoneId(2)])
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_overlay_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/homes/7/zones/1/overlay"))
        .respond_with(ResponseTemplate::new(404).set_body_string("{}"))
        .mount(&server)
        .await;

    let overlay = client(&server).zone_overlay(HomeId(7), ZoneId(1)).await.unwrap();
    assert!(overlay.is_none());
}

#[tokio::test]
async fn presence_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/homes/7/state"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "presence": "HOME" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/homes/7/presenceLock"))
        .and(body_json(serde_json::json!({ "homePresence": "AWAY" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let current = client.home_state(HomeId(7)).await.unwrap().presence;
    assert_eq!(current, Presence::Home);
    client.set_presence(HomeId(7), current.toggled()).await.unwrap();
}

#[tokio::test]
async fn message_log_writes_requests_and_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/homes/7/zoneStates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(zone_states_body()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("traffic.ndjson");
    let client = TadoClient::builder()
        .base_url(server.uri())
        .bearer_token("test-token")
        .message_log(MessageLogMode::Diffed, log_path.to_str().unwrap())
        .build()
        .unwrap();

    client.zone_states(HomeId(7)).await.unwrap();
    client.zone_states(HomeId(7)).await.unwrap();

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["dir"], "req");
    assert_eq!(lines[1]["full"], true);
    assert!(lines[3].get("body").is_none());
}
