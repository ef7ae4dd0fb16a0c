// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Upload gateway: the entry point callers submit uploads through.
//!
//! Submitting only touches the queue. All rate limit work happens later,
//! inside the pump. The first submission that finds no pump running starts
//! one under a supervisor; a panic inside the pump is fatal to the process,
//! because the in-memory upload budget can no longer be trusted.

use crate::limiter::RateLimiter;
use crate::metrics::RelayMetrics;
use crate::outcome::{FailureReason, UploadOutcome};
use crate::provider::{ImageHost, Upload};
use crate::pump::{QueueEntry, UploadPump};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Point-in-time view of the relay.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub uploads_allowed: i64,
    pub next_credit_check_at: DateTime<Utc>,
    pub queue_depth: usize,
    pub pump_running: bool,
}

/// Cloneable handle for submitting uploads.
pub struct UploadGateway<H> {
    pump: Arc<UploadPump<H>>,
}

impl<H> Clone for UploadGateway<H> {
    fn clone(&self) -> Self {
        Self {
            pump: self.pump.clone(),
        }
    }
}

impl<H: ImageHost> UploadGateway<H> {
    pub fn new(host: H, limiter: RateLimiter, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            pump: Arc::new(UploadPump::new(host, limiter, metrics)),
        }
    }

    /// Queue an upload and return the handle its outcome arrives on.
    ///
    /// Does not wait for the upload to be processed.
    pub async fn enqueue(&self, upload: Upload) -> oneshot::Receiver<UploadOutcome> {
        let (respond_to, outcome) = oneshot::channel();

        if self.pump.push(QueueEntry { upload, respond_to }).await {
            self.start_pump();
        }
        outcome
    }

    /// Queue an upload and wait for its outcome.
    pub async fn submit(&self, upload: Upload) -> UploadOutcome {
        self.enqueue(upload).await.await.unwrap_or_else(|_| {
            error!("Upload pump dropped a queued upload");
            UploadOutcome::Failed(FailureReason::Internal)
        })
    }

    pub async fn status(&self) -> RelayStatus {
        let state = self.pump.limiter().state().await;
        RelayStatus {
            uploads_allowed: state.uploads_allowed,
            next_credit_check_at: state.next_credit_check_at,
            queue_depth: self.pump.queue_depth().await,
            pump_running: self.pump.is_running(),
        }
    }

    pub fn metrics(&self) -> &RelayMetrics {
        self.pump.metrics()
    }

    /// Spawn a pump under a supervisor. The caller must hold the pump slot.
    fn start_pump(&self) {
        debug!("Starting upload pump");
        let pump = self.pump.clone();

        tokio::spawn(async move {
            let worker = tokio::spawn(pump.drain());
            match worker.await {
                Ok(()) => {}
                Err(err) if err.is_panic() => {
                    error!(error = %err, "Uncaught error in upload pump, exiting");
                    std::process::exit(1);
                }
                Err(err) => debug!(error = %err, "Upload pump cancelled"),
            }
        });
    }
}
