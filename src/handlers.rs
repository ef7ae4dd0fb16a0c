// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the upload relay.
//!
//! The upload form posts one multipart request per image. The handler turns
//! it into an [`Upload`], hands it to the gateway and answers with whatever
//! outcome the pump produces.

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::gateway::{RelayStatus, UploadGateway};
use crate::outcome::UploadOutcome;
use crate::provider::{ImageHost, Upload};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

/// Shared application state.
pub struct AppState<H> {
    pub gateway: UploadGateway<H>,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Build the relay's router.
pub fn router<H: ImageHost>(state: Arc<AppState<H>>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/status", get(status::<H>))
        .route("/upload", post(upload::<H>))
        .route("/api/imgur/upload", post(upload::<H>));

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics::<H>));
    }

    app = app.layer(DefaultBodyLimit::max(state.config.upload.max_body_bytes));
    if state.config.upload.allow_any_origin {
        app = app.layer(CorsLayer::permissive());
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "imgur-upload-relay",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Current upload budget and queue.
pub async fn status<H: ImageHost>(State(state): State<Arc<AppState<H>>>) -> Json<RelayStatus> {
    Json(state.gateway.status().await)
}

/// Prometheus text exposition.
pub async fn metrics<H: ImageHost>(
    State(state): State<Arc<AppState<H>>>,
) -> Result<impl IntoResponse> {
    let body = state.gateway.metrics().render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// Queue one image for forwarding and wait for its outcome.
pub async fn upload<H: ImageHost>(
    State(state): State<Arc<AppState<H>>>,
    multipart: Multipart,
) -> Result<UploadOutcome> {
    let upload = read_upload(multipart).await?;
    debug!(
        size = upload.image.len(),
        content_type = ?upload.content_type,
        has_title = upload.title.is_some(),
        "Queueing upload"
    );

    let outcome = state.gateway.submit(upload).await;
    debug!(outcome = outcome.label(), "Upload finished");
    Ok(outcome)
}

/// Collect the `image`, `title` and `description` fields. Others are ignored.
async fn read_upload(mut multipart: Multipart) -> Result<Upload> {
    let mut upload: Option<Upload> = None;
    let mut title = None;
    let mut description = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let content_type = field.content_type().map(str::to_string);
                let file_name = field.file_name().map(str::to_string);
                let mut image = Upload::new(field.bytes().await?);
                image.content_type = content_type;
                image.file_name = file_name;
                upload = Some(image);
            }
            Some("title") => title = Some(field.text().await?),
            Some("description") => description = Some(field.text().await?),
            _ => debug!(field = ?name, "Ignoring unknown multipart field"),
        }
    }

    let mut upload = upload.ok_or(RelayError::MissingField("image"))?;
    upload.title = title;
    upload.description = description;
    Ok(upload)
}
