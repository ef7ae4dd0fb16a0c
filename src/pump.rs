// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Serialized upload pump.
//!
//! A single worker drains the upload queue one entry at a time, so at most one
//! request to the image host is ever in flight. Before each upload it consults
//! the [`RateLimiter`]; after each upload it folds the response's rate limit
//! headers back in.
//!
//! The queue is swapped out whole before a batch is processed. Entries pushed
//! while a batch runs wait for the next batch. The `running` flag is only ever
//! cleared while holding the queue lock, after seeing the queue empty, so an
//! entry can never be left behind without a pump to process it.

use crate::limiter::{RateLimitResult, RateLimiter};
use crate::metrics::RelayMetrics;
use crate::outcome::{FailureReason, UploadOutcome};
use crate::provider::{ImageHost, ProviderError, Upload};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

/// One queued upload and the handle its result is written to.
pub(crate) struct QueueEntry {
    pub(crate) upload: Upload,
    pub(crate) respond_to: oneshot::Sender<UploadOutcome>,
}

/// Owns the queue, the upload budget and the image host.
pub struct UploadPump<H> {
    host: H,
    limiter: RateLimiter,
    metrics: Arc<RelayMetrics>,
    queue: Mutex<Vec<QueueEntry>>,
    running: AtomicBool,
}

impl<H: ImageHost> UploadPump<H> {
    pub fn new(host: H, limiter: RateLimiter, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            host,
            limiter,
            metrics,
            queue: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Whether a pump task is currently draining the queue.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn queue_depth(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Append an entry. Returns true when the caller has just claimed the
    /// pump slot and must start a pump.
    pub(crate) async fn push(&self, entry: QueueEntry) -> bool {
        let mut queue = self.queue.lock().await;
        queue.push(entry);
        self.metrics.queue_depth.set(queue.len() as i64);

        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Take everything queued so far, or release the pump slot if nothing is.
    async fn next_batch(&self) -> Option<Vec<QueueEntry>> {
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            self.running.store(false, Ordering::Release);
            return None;
        }
        self.metrics.queue_depth.set(0);
        Some(std::mem::take(&mut *queue))
    }

    /// Process batches until the queue is empty.
    pub async fn drain(self: Arc<Self>) {
        while let Some(batch) = self.next_batch().await {
            debug!(size = batch.len(), "Draining upload batch");

            for entry in batch {
                let outcome = self.process(entry.upload).await;
                self.metrics
                    .uploads
                    .with_label_values(&[outcome.label()])
                    .inc();

                if entry.respond_to.send(outcome).is_err() {
                    debug!("Caller went away before its upload was processed");
                }
            }
        }
        debug!("Upload queue empty, pump going idle");
    }

    async fn process(&self, upload: Upload) -> UploadOutcome {
        if !self.host.is_configured() {
            error!("Upload failed, no IMGUR_CLIENT_ID configured");
            return UploadOutcome::Failed(FailureReason::MissingCredential);
        }

        if self.limiter.credit_check_due().await {
            self.refresh_credits().await;
        }

        match self.limiter.try_acquire().await {
            RateLimitResult::Limited { retry_after } => {
                let retry_in = retry_after.as_secs();
                info!(retry_in, "Upload rejected, rate limit reached");
                UploadOutcome::RateLimited { retry_in }
            }
            RateLimitResult::Allowed { remaining } => {
                self.metrics.uploads_allowed.set(remaining);
                self.forward(upload).await
            }
        }
    }

    async fn refresh_credits(&self) {
        debug!("Upload budget spent, checking credits");

        let state = match self.host.check_credits().await {
            Ok(snapshot) => {
                self.metrics.credit_checks.with_label_values(&["ok"]).inc();
                let state = self.limiter.observe(&snapshot).await;
                info!(
                    uploads_allowed = state.uploads_allowed,
                    next_credit_check_at = %state.next_credit_check_at,
                    "Credit check complete"
                );
                state
            }
            Err(err) => {
                self.metrics
                    .credit_checks
                    .with_label_values(&["failed"])
                    .inc();
                let state = self.limiter.credit_check_failed().await;
                warn!(
                    error = %err,
                    next_credit_check_at = %state.next_credit_check_at,
                    "Credit check failed, backing off"
                );
                state
            }
        };
        self.metrics.uploads_allowed.set(state.uploads_allowed);
    }

    async fn forward(&self, upload: Upload) -> UploadOutcome {
        match self.host.upload(upload).await {
            Ok(response) => {
                if !response.rate_limits.is_empty() {
                    let state = self.limiter.observe(&response.rate_limits).await;
                    self.metrics.uploads_allowed.set(state.uploads_allowed);
                }

                if response.is_success() {
                    match response.hosted_image() {
                        Some(image) => info!(
                            id = %image.id,
                            link = %image.link,
                            delete_link = ?image.delete_link(),
                            "Image uploaded"
                        ),
                        None => info!(status = response.status, "Image uploaded"),
                    }
                    UploadOutcome::Uploaded(response)
                } else {
                    warn!(status = response.status, "Upload failed upstream");
                    UploadOutcome::UpstreamError(response)
                }
            }
            Err(ProviderError::MissingCredential) => {
                error!("Upload failed, no IMGUR_CLIENT_ID configured");
                UploadOutcome::Failed(FailureReason::MissingCredential)
            }
            Err(err) => {
                error!(error = %err, "Upload to image host failed");
                UploadOutcome::Failed(FailureReason::Transport)
            }
        }
    }
}
