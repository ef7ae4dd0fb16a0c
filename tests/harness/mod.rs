// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for the upload relay.
//!
//! Provides a scriptable in-memory image host and a clock the tests move by
//! hand, so the pump can be driven without a network.

#![allow(dead_code)]

pub mod fake_host;
pub mod requests;

use chrono::{DateTime, Duration, TimeZone, Utc};
use imgur_upload_relay::{
    config::RateLimitConfig,
    gateway::UploadGateway,
    limiter::{Clock, RateLimitState, RateLimiter},
    metrics::RelayMetrics,
};
use std::sync::{Arc, Mutex};

pub use fake_host::FakeHost;

/// Fixed starting point for every test clock.
pub const EPOCH: i64 = 1_700_000_000;

/// Clock that only moves when told to.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Utc.timestamp_opt(EPOCH, 0).unwrap())))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Instant `secs` seconds after [`EPOCH`].
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(EPOCH + secs, 0).unwrap()
}

/// Budget of `uploads` with the next credit check `check_in` seconds away.
pub fn budget(uploads: i64, check_in: i64) -> RateLimitState {
    RateLimitState {
        uploads_allowed: uploads,
        next_credit_check_at: at(check_in),
    }
}

/// Gateway over `host`, starting from `state`.
pub fn gateway(
    host: FakeHost,
    clock: Arc<ManualClock>,
    state: RateLimitState,
) -> UploadGateway<FakeHost> {
    let limiter = RateLimiter::with_state(RateLimitConfig::default(), clock, state);
    UploadGateway::new(host, limiter, Arc::new(RelayMetrics::new().unwrap()))
}

/// Wait until the pump has observed an empty queue and gone idle.
pub async fn wait_idle(gateway: &UploadGateway<FakeHost>) {
    for _ in 0..1_000 {
        if !gateway.status().await.pump_running {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("pump never went idle");
}
