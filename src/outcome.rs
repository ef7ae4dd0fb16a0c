// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! What a caller gets back for one queued upload.

use crate::provider::{HostedImage, UpstreamResponse};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Final result of one upload, written back exactly once.
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    /// The image host accepted the image; its answer is passed through
    Uploaded(UpstreamResponse),
    /// The image host answered with a non-2xx status
    UpstreamError(UpstreamResponse),
    /// No capacity left; try again after `retry_in` seconds
    RateLimited { retry_in: u64 },
    /// The relay could not forward the upload
    Failed(FailureReason),
}

/// Why the relay could not forward an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// No provider credential is configured
    MissingCredential,
    /// The request to the image host did not complete
    Transport,
    /// The pump went away before answering
    Internal,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "no client id"),
            Self::Transport => write!(f, "upload to image host failed"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}

/// Body of a rate limited answer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryBody {
    pub retry_in: u64,
}

impl UploadOutcome {
    /// Short label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uploaded(_) => "uploaded",
            Self::UpstreamError(_) => "upstream_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::Failed(_) => "failed",
        }
    }

    /// The hosted image, for successful uploads whose body describes one.
    pub fn hosted_image(&self) -> Option<HostedImage> {
        match self {
            Self::Uploaded(response) => response.hosted_image(),
            _ => None,
        }
    }
}

impl IntoResponse for UploadOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Uploaded(upstream) | Self::UpstreamError(upstream) => passthrough(upstream),
            Self::RateLimited { retry_in } => (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, retry_in.to_string())],
                Json(RetryBody { retry_in }),
            )
                .into_response(),
            Self::Failed(reason) => {
                (StatusCode::INTERNAL_SERVER_ERROR, reason.to_string()).into_response()
            }
        }
    }
}

fn passthrough(upstream: UpstreamResponse) -> Response {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, upstream.body).into_response();

    // Bytes default to application/octet-stream; prefer what the host said.
    if let Some(content_type) = upstream
        .content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
    {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    response
}
