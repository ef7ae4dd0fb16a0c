// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Image host client.
//!
//! [`ImageHost`] is the seam between the upload pump and the network. The
//! production implementation, [`ImgurClient`], talks to the Imgur v3 API; tests
//! substitute their own.

use crate::config::ImgurConfig;
use crate::limiter::RateLimitSnapshot;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

/// Header names carrying each rate limit signal, canonical spelling first.
const CLIENT_REMAINING_HEADERS: &[&str] =
    &["x-ratelimit-clientremaining", "x-ratelimit-client-remaining"];
const USER_REMAINING_HEADERS: &[&str] =
    &["x-ratelimit-userremaining", "x-ratelimit-user-remaining"];
const USER_RESET_HEADERS: &[&str] = &["x-ratelimit-userreset", "x-ratelimit-user-reset"];
const POST_REMAINING_HEADERS: &[&str] =
    &["x-post-rate-limit-remaining", "x-post-ratelimit-remaining"];
const POST_RESET_HEADERS: &[&str] = &["x-post-rate-limit-reset", "x-post-ratelimit-reset"];

/// Errors talking to the image host.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no Imgur client id configured")]
    MissingCredential,

    #[error("request to image host failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("image host returned HTTP {0}")]
    Status(u16),

    #[error("malformed response from image host: {0}")]
    MalformedBody(String),
}

/// One image to forward, with its optional metadata.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    /// Raw image bytes, forwarded untouched
    pub image: Bytes,
    /// Content type the caller declared for the image
    pub content_type: Option<String>,
    /// File name the caller declared for the image
    pub file_name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl Upload {
    pub fn new(image: impl Into<Bytes>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Metadata fields that should be sent: present and non-empty only.
    pub fn metadata(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [("title", &self.title), ("description", &self.description)]
            .into_iter()
            .filter_map(|(name, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (name, v))
            })
    }

    fn into_form(self) -> Form {
        let mut form = Form::new().part("image", self.image_part());
        for (name, value) in self.metadata() {
            form = form.text(name, value.to_string());
        }
        form
    }

    /// The `image` part. A declared content type that does not parse is
    /// dropped rather than failing an upload that already holds a slot.
    fn image_part(&self) -> Part {
        let part = || {
            let part = Part::bytes(self.image.to_vec());
            match &self.file_name {
                Some(file_name) => part.file_name(file_name.clone()),
                None => part,
            }
        };

        match self.content_type.as_deref() {
            Some(content_type) => part().mime_str(content_type).unwrap_or_else(|err| {
                warn!(content_type, error = %err, "Dropping unparseable image content type");
                part()
            }),
            None => part(),
        }
    }
}

/// What the image host answered to an upload.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    /// Capacity signals from the response headers, reported on failures too
    pub rate_limits: RateLimitSnapshot,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The hosted image described by a successful response body, if any.
    pub fn hosted_image(&self) -> Option<HostedImage> {
        serde_json::from_slice::<Envelope<HostedImage>>(&self.body)
            .ok()
            .map(|envelope| envelope.data)
    }
}

/// The parts of an uploaded image's record that callers need.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostedImage {
    pub id: String,
    pub link: String,
    #[serde(default)]
    pub deletehash: Option<String>,
}

impl HostedImage {
    /// Page that lets the uploader delete the image without an account.
    pub fn delete_link(&self) -> Option<String> {
        self.deletehash
            .as_ref()
            .map(|hash| format!("https://imgur.com/delete/{}", hash))
    }
}

/// Imgur wraps every payload in `{ "data": ..., "success": ..., "status": ... }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Credits {
    #[serde(default)]
    client_remaining: Option<i64>,
    #[serde(default)]
    user_remaining: Option<i64>,
    #[serde(default)]
    user_reset: Option<i64>,
}

/// Remote image host.
pub trait ImageHost: Send + Sync + 'static {
    /// Whether a credential is available. Without one every call fails.
    fn is_configured(&self) -> bool;

    /// Ask the host how much capacity is left.
    fn check_credits(
        &self,
    ) -> impl Future<Output = Result<RateLimitSnapshot, ProviderError>> + Send;

    /// Forward one image. Non-2xx answers are returned, not raised.
    fn upload(
        &self,
        upload: Upload,
    ) -> impl Future<Output = Result<UpstreamResponse, ProviderError>> + Send;
}

/// Imgur v3 API client authenticated with an application client id.
pub struct ImgurClient {
    api_base: String,
    client_id: Option<String>,
    client: reqwest::Client,
}

impl ImgurClient {
    /// Create a new client from configuration.
    pub fn new(config: &ImgurConfig) -> Result<Self, ProviderError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client: builder.build()?,
        })
    }

    fn authorization(&self) -> Result<String, ProviderError> {
        self.client_id
            .as_ref()
            .map(|id| format!("Client-ID {}", id))
            .ok_or(ProviderError::MissingCredential)
    }
}

impl ImageHost for ImgurClient {
    fn is_configured(&self) -> bool {
        self.client_id.is_some()
    }

    async fn check_credits(&self) -> Result<RateLimitSnapshot, ProviderError> {
        let authorization = self.authorization()?;
        let url = format!("{}/credits", self.api_base);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        parse_credits(&body)
    }

    async fn upload(&self, upload: Upload) -> Result<UpstreamResponse, ProviderError> {
        let authorization = self.authorization()?;
        let url = format!("{}/image", self.api_base);
        let size = upload.image.len();
        let form = upload.into_form();

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, authorization)
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let rate_limits =
            snapshot_from_headers(|name| headers.get(name).and_then(|v| v.to_str().ok()));
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        if (200..300).contains(&status) {
            debug!(status, size, "Image host accepted upload");
        } else {
            warn!(
                status,
                body = %String::from_utf8_lossy(&body),
                "Image host rejected upload"
            );
        }

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
            rate_limits,
        })
    }
}

/// Read rate limit signals through a header lookup.
///
/// Each signal is taken from the first of its header spellings that is
/// present and numeric.
pub fn snapshot_from_headers<'a, F>(lookup: F) -> RateLimitSnapshot
where
    F: Fn(&str) -> Option<&'a str>,
{
    let read = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| lookup(name).and_then(|v| v.trim().parse::<i64>().ok()))
    };

    RateLimitSnapshot {
        client_remaining: read(CLIENT_REMAINING_HEADERS),
        user_remaining: read(USER_REMAINING_HEADERS),
        user_reset: read(USER_RESET_HEADERS),
        post_remaining: read(POST_REMAINING_HEADERS),
        post_reset: read(POST_RESET_HEADERS),
    }
}

/// Parse the body of `GET /credits`.
pub fn parse_credits(body: &[u8]) -> Result<RateLimitSnapshot, ProviderError> {
    let envelope: Envelope<Credits> = serde_json::from_slice(body)
        .map_err(|e| ProviderError::MalformedBody(e.to_string()))?;
    let credits = envelope.data;

    let snapshot = RateLimitSnapshot {
        client_remaining: credits.client_remaining,
        user_remaining: credits.user_remaining,
        user_reset: credits.user_reset,
        ..Default::default()
    };

    if snapshot.is_empty() {
        return Err(ProviderError::MalformedBody(
            "credits response carried no limits".to_string(),
        ));
    }
    Ok(snapshot)
}
