//! Fingerpost Daemon
//!
//! Serves this instance's webfinger endpoints according to RFC 7033,
//! resolves remote handles on request and periodically expires the actor
//! cache.

mod api;
mod webfinger;

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use fingerpost::config::{Config, ConfigError};
use fingerpost::{HttpFetcher, Instance};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub instance: Arc<Instance<HttpFetcher>>,
}

/// Errors that can occur in the fingerpostd service
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Error binding or serving
    #[error("io error: {0}")]
    IOError(#[from] io::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Build the router for the given state
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(webfinger::webfinger_router())
        .merge(api::api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Sweep the actor cache on a fixed interval
fn spawn_expiry(instance: Arc<Instance<HttpFetcher>>) {
    let period = Duration::from_secs(instance.config.expire_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            instance.expire_actors();
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    // Configure logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var("FINGERPOST_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    tracing::info!(
        "Serving {} from {}",
        config.domain,
        config.base_dir.display()
    );

    let bind_address = config.bind_address.clone();
    let instance = Arc::new(Instance::from_config(config)?);
    spawn_expiry(instance.clone());

    let app = app(AppState { instance });

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
