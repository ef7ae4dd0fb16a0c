// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Errors raised by the HTTP layer before an upload reaches the queue.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("metrics unavailable: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Multipart(err) => err.status(),
            Self::MissingField(_) => StatusCode::BAD_REQUEST,
            Self::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = status.as_u16(), error = %self, "Request failed");

        (status, self.to_string()).into_response()
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;
