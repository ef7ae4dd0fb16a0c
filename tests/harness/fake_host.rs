// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Scriptable in-memory image host.

use bytes::Bytes;
use imgur_upload_relay::{
    limiter::RateLimitSnapshot,
    provider::{ImageHost, ProviderError, Upload, UpstreamResponse},
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Body returned for uploads nobody scripted.
pub const DEFAULT_BODY: &str = r#"{"data":{"id":"aB3dE","link":"https://i.imgur.com/aB3dE.png","deletehash":"x9Yz"},"success":true,"status":200}"#;

#[derive(Default)]
struct Inner {
    configured: bool,
    delay: Duration,
    credits: Mutex<VecDeque<Result<RateLimitSnapshot, ProviderError>>>,
    responses: Mutex<VecDeque<Result<UpstreamResponse, ProviderError>>>,
    uploads: Mutex<Vec<Upload>>,
    credit_checks: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Image host double. Clones share state, so a test keeps one clone to
/// inspect what the pump did with the other.
#[derive(Clone)]
pub struct FakeHost {
    inner: Arc<Inner>,
}

impl FakeHost {
    /// Host with a credential that answers every upload with 200.
    pub fn new() -> Self {
        Self::build(true, Duration::ZERO)
    }

    /// Host with no credential configured.
    pub fn unconfigured() -> Self {
        Self::build(false, Duration::ZERO)
    }

    /// Host whose uploads take `delay` to complete.
    pub fn slow(delay: Duration) -> Self {
        Self::build(true, delay)
    }

    fn build(configured: bool, delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                configured,
                delay,
                ..Default::default()
            }),
        }
    }

    /// Queue the answer to the next credit check. Unscripted checks fail.
    pub fn script_credits(&self, result: Result<RateLimitSnapshot, ProviderError>) {
        self.inner.credits.lock().unwrap().push_back(result);
    }

    /// Queue the answer to the next upload. Unscripted uploads succeed.
    pub fn script_upload(&self, result: Result<UpstreamResponse, ProviderError>) {
        self.inner.responses.lock().unwrap().push_back(result);
    }

    /// Titles of every upload received, in arrival order.
    pub fn titles(&self) -> Vec<String> {
        self.inner
            .uploads
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.title.clone().unwrap_or_default())
            .collect()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.inner.uploads.lock().unwrap().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.inner.uploads.lock().unwrap().len()
    }

    pub fn credit_checks(&self) -> usize {
        self.inner.credit_checks.load(Ordering::SeqCst)
    }

    /// Uploads currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Most uploads ever observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

/// A 200 answer with the given rate limit headers.
pub fn ok_response(rate_limits: RateLimitSnapshot) -> UpstreamResponse {
    response(200, DEFAULT_BODY, rate_limits)
}

pub fn response(status: u16, body: &'static str, rate_limits: RateLimitSnapshot) -> UpstreamResponse {
    UpstreamResponse {
        status,
        content_type: Some("application/json".to_string()),
        body: Bytes::from_static(body.as_bytes()),
        rate_limits,
    }
}

impl ImageHost for FakeHost {
    fn is_configured(&self) -> bool {
        self.inner.configured
    }

    async fn check_credits(&self) -> Result<RateLimitSnapshot, ProviderError> {
        self.inner.credit_checks.fetch_add(1, Ordering::SeqCst);
        let scripted = self.inner.credits.lock().unwrap().pop_front();
        scripted.unwrap_or(Err(ProviderError::Status(500)))
    }

    async fn upload(&self, upload: Upload) -> Result<UpstreamResponse, ProviderError> {
        let current = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if self.inner.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.inner.delay).await;
        }

        self.inner.uploads.lock().unwrap().push(upload);
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.inner.responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(ok_response(RateLimitSnapshot::default())))
    }
}
