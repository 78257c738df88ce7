use std::env;
use std::sync::Arc;

use tado_deck::temperature::{self, TemperatureUnit};
use tado_deck::{
    HomeId, OAuthAuthenticator, PollingService, Session, TadoClient, ZoneId, ZoneMode,
    format_remaining,
};

#[tokio::main]
async fn main() -> tado_deck::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let usage = "usage: monitor <home-id> <zone-id>... [--fahrenheit]";
    let home = args
        .get(1)
        .and_then(|a| a.parse().ok())
        .map(HomeId)
        .expect(usage);
    let zones: Vec<ZoneId> = args[2..]
        .iter()
        .filter_map(|a| a.parse().ok().map(ZoneId))
        .collect();
    if zones.is_empty() {
        panic!("{usage}");
    }
    let unit = if args.iter().any(|a| a == "--fahrenheit") {
        TemperatureUnit::Fahrenheit
    } else {
        TemperatureUnit::Celsius
    };

    // Without a stored refresh token the session falls back to the device flow.
    let mut builder = Session::builder(OAuthAuthenticator::new()).on_token(|token| {
        if let Some(refresh) = &token.refresh_token {
            println!("New refresh token: {refresh}");
        }
    });
    if let Ok(token) = env::var("TADO_REFRESH_TOKEN") {
        builder = builder.refresh_token(token);
    }
    let session = builder.build();

    println!("Authenticating...");
    session.ensure_authenticated().await?;

    let client = Arc::new(TadoClient::builder().token_source(session.clone()).build()?);
    let service = PollingService::new(client, session);

    let _sub = service.on_update(move |home, zone, state| {
        let inside = temperature::read(state.inside_temperature().as_ref(), unit);
        let humidity = state
            .humidity()
            .map(|h| format!("{h:.0}%"))
            .unwrap_or_else(|| "--".into());
        let mode = match state.mode() {
            ZoneMode::Schedule => "schedule".to_string(),
            ZoneMode::Manual { target } => format!(
                "manual {}",
                temperature::format(temperature::read(target.as_ref(), unit), unit)
            ),
            ZoneMode::Boost { remaining } => match remaining {
                Some(r) => format!("boost {}", format_remaining(r)),
                None => "boost".to_string(),
            },
        };
        println!(
            "[{home}/{zone}] {} | humidity {humidity} | {mode}",
            temperature::format(inside, unit)
        );
    });

    for zone in &zones {
        service.register_zone(home, *zone);
    }
    println!("Polling every {}s, Ctrl-C to stop", service.poll_interval().as_secs());

    let _ = tokio::signal::ctrl_c().await;
    for zone in &zones {
        service.unregister_zone(home, *zone);
    }
    Ok(())
}
