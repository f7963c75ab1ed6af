#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Orbit API Server
//!
//! HTTP surface for the invitation and billing reconciliation core: billing
//! webhook intake, the invite action interface, trial and notification
//! projections. Runs the invite expiry sweep as an in-process periodic task.

mod config;
mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orbit_invites::InviteManager;
use orbit_shared::MemoryGateway;

use crate::config::Config;
use crate::routes::create_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,orbit_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Orbit API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    if config.webhook_secret.trim().is_empty() {
        tracing::warn!(
            "BILLING_WEBHOOK_SECRET not set - webhook deliveries will be refused"
        );
    }

    let state = AppState::new(config.clone());

    tokio::spawn(expiry_sweep_task(
        state.invites.clone(),
        config.sweep_interval_secs,
    ));
    tracing::info!(
        interval_secs = config.sweep_interval_secs,
        "invite expiry sweep task started"
    );

    let allowed_origins: Vec<axum::http::HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();
    tracing::info!(allowed_origins = ?allowed_origins, "CORS configured");

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically flip lapsed PENDING invites to EXPIRED. Accepting an
/// expired invite is refused regardless; the sweep keeps stored state in
/// line with the lazy checks.
async fn expiry_sweep_task(invites: Arc<InviteManager<MemoryGateway>>, interval_secs: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    interval.tick().await; // immediate first tick
    loop {
        interval.tick().await;
        if let Err(e) = invites.expiry_sweep().await {
            tracing::error!(error = %e, "invite expiry sweep failed");
        }
    }
}
