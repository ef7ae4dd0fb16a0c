// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Imgur Upload Relay Service
//!
//! Accepts image uploads from the uploader page and forwards them to Imgur,
//! one at a time, without exceeding Imgur's rate limits.
//!
//! ## Endpoints
//!
//! - `POST /upload`: multipart body with an `image` field and optional
//!   `title` / `description`. Answers with Imgur's response, or `503` with
//!   `{"retryIn": <seconds>}` when the upload budget is spent.
//! - `GET /status`: current upload budget and queue depth.
//! - `GET /health`, `GET /metrics`.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (and `.env`, if present):
//!
//! - `IMGUR_CLIENT_ID`: Imgur application client id (required for uploads)
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `CREDIT_CHECK_COOLDOWN_SECS`: Backoff after a failed credit check (default: 900)
//! - `RETRY_JITTER_SECS`: Maximum jitter added to retry hints (default: 60)
//! - `MAX_UPLOAD_BYTES`: Largest accepted request body (default: 20 MiB)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use imgur_upload_relay::{
    config::Config,
    gateway::UploadGateway,
    handlers::{router, AppState},
    limiter::{RateLimiter, SystemClock},
    metrics::RelayMetrics,
    provider::ImgurClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        api_base = %config.imgur.api_base,
        credit_check_cooldown_secs = config.rate_limit.credit_check_cooldown_secs,
        max_retry_jitter_secs = config.rate_limit.max_retry_jitter_secs,
        "Starting Imgur upload relay"
    );
    if config.imgur.client_id.is_none() {
        warn!("IMGUR_CLIENT_ID is not set, every upload will fail");
    }

    // Create application state
    let host = ImgurClient::new(&config.imgur)?;
    let limiter = RateLimiter::new(config.rate_limit.clone(), Arc::new(SystemClock));
    let metrics = Arc::new(RelayMetrics::new()?);

    let state = Arc::new(AppState {
        gateway: UploadGateway::new(host, limiter, metrics),
        config: config.clone(),
    });

    let app = router(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
