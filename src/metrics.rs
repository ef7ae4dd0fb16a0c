// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for the upload relay.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Relay metrics, registered in a private registry.
pub struct RelayMetrics {
    registry: Registry,
    /// Finished uploads by outcome label
    pub uploads: IntCounterVec,
    /// Credit checks by result (`ok` / `failed`)
    pub credit_checks: IntCounterVec,
    /// Current upload budget estimate
    pub uploads_allowed: IntGauge,
    /// Entries waiting for the pump
    pub queue_depth: IntGauge,
}

impl RelayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let uploads = IntCounterVec::new(
            Opts::new("relay_uploads_total", "Uploads processed, by outcome"),
            &["outcome"],
        )?;
        let credit_checks = IntCounterVec::new(
            Opts::new("relay_credit_checks_total", "Credit checks, by result"),
            &["result"],
        )?;
        let uploads_allowed = IntGauge::new(
            "relay_uploads_allowed",
            "Uploads the relay believes it may still send",
        )?;
        let queue_depth = IntGauge::new("relay_queue_depth", "Uploads waiting to be forwarded")?;

        registry.register(Box::new(uploads.clone()))?;
        registry.register(Box::new(credit_checks.clone()))?;
        registry.register(Box::new(uploads_allowed.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            uploads,
            credit_checks,
            uploads_allowed,
            queue_depth,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
