mod config;
mod error;
mod routes;

use std::sync::Arc;

use config::AppConfig;
use prefsync_core::{InMemorySessionStore, RestKvSessionStore, SessionStore};
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prefsync_api=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting prefsync-api with config: {:?}", config);

    let store = session_store(&config)?;
    let bind_addr = config.bind_addr.clone();
    let router = app_router(AppState::new(config, store));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("prefsync-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}

fn session_store(config: &AppConfig) -> prefsync_core::Result<Arc<dyn SessionStore>> {
    if let Some(kv) = &config.kv {
        let store = RestKvSessionStore::new(
            kv.rest_api_url.as_str(),
            kv.rest_api_token.as_str(),
            config.kv_request_timeout,
        )?;
        return Ok(Arc::new(store));
    }

    tracing::warn!(
        "KV_REST_API_URL is not set; sync sessions live in process memory and are lost on restart"
    );
    Ok(Arc::new(InMemorySessionStore::new()))
}
