//! Skin Store Checkout - checkout coupon and pricing service

use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skinstore_checkout::api::{router, AppState, SessionFactory, StoreLocation};
use skinstore_checkout::config::Settings;
use skinstore_checkout::{HttpCampaignClient, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    let lookup = HttpCampaignClient::new(&settings.campaign_api_url, settings.validator.lookup_timeout)?;
    let nats = match &settings.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, checkout events will not be published");
                None
            }
        },
        None => None,
    };

    let factory = SessionFactory {
        lookup: Arc::new(lookup),
        clock: Arc::new(SystemClock),
        store: StoreLocation::Directory(settings.state_dir.clone()),
        guard: settings.guard,
        validator: settings.validator,
        checkout: settings.checkout.clone(),
    };
    let state = AppState::new(factory, nats).with_session_policy(settings.sessions);
    tokio::spawn(sweep_idle_sessions(state.clone()));
    let app = router(state).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", settings.port);
    tracing::info!(%addr, state_dir = %settings.state_dir.display(), "skinstore checkout listening");
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}

async fn sweep_idle_sessions(state: AppState) {
    let period = (state.session_policy().idle_timeout / 2).max(std::time::Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        state.evict_idle().await;
    }
}
