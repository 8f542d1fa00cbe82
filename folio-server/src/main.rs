use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

use folio_core::retry::RetryEvent;
use folio_server::config::Config;
use folio_server::github::GitHubClient;
use folio_server::handlers::api_router;
use folio_server::store::RecordStore;
use folio_server::AppState;

/// Log rate-limit signals so operators see them even when no API client is
/// subscribed. Fire-and-forget: lagging or having no other receiver never
/// affects the retry pipeline.
async fn rate_limit_logger(mut events: broadcast::Receiver<RetryEvent>) {
    loop {
        match events.recv().await {
            Ok(RetryEvent::RateLimitHit {
                message,
                attempt,
                max_retries,
                ..
            }) => {
                warn!("{} (attempt {}/{})", message, attempt, max_retries);
            }
            Ok(RetryEvent::RateLimitRecovered { message, .. }) => {
                info!("{}", message);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Dropped {} retry notifications", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting Folio wiki backend");

    let config =
        Config::from_env().expect("Failed to load configuration from environment variables");

    let github_client = GitHubClient::new(
        config.github_token.clone(),
        config.github_owner.clone(),
        config.github_repo.clone(),
    );

    let (retry_events, receiver) = broadcast::channel(32);
    tokio::spawn(rate_limit_logger(receiver));

    let state = Arc::new(AppState {
        store: RecordStore::new(Arc::new(github_client)),
        verification_secret: config.verification_secret.clone(),
        verification_ttl: chrono::Duration::seconds(config.verification_ttl_secs as i64),
        admin_auth_token: config.admin_auth_token.clone(),
        retry_events,
    });

    let app = api_router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
