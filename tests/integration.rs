use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tado_deck::{OAuthAuthenticator, PollingService, Session, TadoClient, ZoneState};

/// Run with: cargo test --test integration -- --ignored
/// Requires a real account:
///   TADO_REFRESH_TOKEN=<token> TADO_HOME_ID=<home> cargo test --test integration -- --ignored
#[tokio::test]
#[ignore]
async fn authenticate_list_and_poll() {
    let refresh_token = env::var("TADO_REFRESH_TOKEN").expect("TADO_REFRESH_TOKEN not set");
    let home = env::var("TADO_HOME_ID")
        .expect("TADO_HOME_ID not set")
        .parse()
        .map(tado_deck::HomeId)
        .expect("TADO_HOME_ID must be numeric");

    let session = Session::builder(OAuthAuthenticator::new())
        .refresh_token(refresh_token)
        .build();
    session.ensure_authenticated().await.expect("authentication failed");

    let client = Arc::new(
        TadoClient::builder()
            .token_source(session.clone())
            .build()
            .expect("client build failed"),
    );
    let zones = client.zones(home).await.expect("zone listing failed");
    assert!(!zones.is_empty(), "home has no zones");

    let updates: Arc<Mutex<Vec<ZoneState>>> = Arc::default();
    let sink = Arc::clone(&updates);
    let service = PollingService::new(Arc::clone(&client), session.clone());
    let _sub = service.on_update(move |_, _, state| sink.lock().unwrap().push(state.clone()));

    service.register_zone(home, zones[0].id);
    for _ in 0..20 {
        if !updates.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    service.unregister_zone(home, zones[0].id);

    assert!(!updates.lock().unwrap().is_empty(), "no zone update received");
    assert!(service.cached(home, zones[0].id).is_some());
    assert!(client.rate_limit().is_some(), "rate limit headers missing");
}
