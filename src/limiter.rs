// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Upload budget tracking for the provider's rate limits.
//!
//! The provider enforces three independent limits:
//! 1. Per-client credits (shared by every user of the application)
//! 2. Per-user credits (keyed by the caller's IP on the provider side)
//! 3. A short post window limiting upload actions
//!
//! Client and user credits are spent at `credits_per_upload` per upload, post
//! window slots one per upload. The limiter collapses all three into a single
//! `uploads_allowed` budget and a single `next_credit_check_at` deadline. The
//! most conservative signal always wins.

use crate::config::RateLimitConfig;
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Remaining-capacity signals reported by the provider.
///
/// Both the credits endpoint and the headers of ordinary upload responses
/// parse into this shape. Absent fields carry no information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    /// Client credits remaining
    pub client_remaining: Option<i64>,
    /// User credits remaining
    pub user_remaining: Option<i64>,
    /// When the user credits reset (Unix epoch seconds)
    pub user_reset: Option<i64>,
    /// Uploads remaining in the current post window
    pub post_remaining: Option<i64>,
    /// Seconds until the post window resets
    pub post_reset: Option<i64>,
}

impl RateLimitSnapshot {
    /// True when the snapshot carries no signal at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Current belief about remaining provider capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitState {
    /// Uploads that may be sent before a limit is hit
    pub uploads_allowed: i64,
    /// Earliest time worth spending a request on a credit check
    pub next_credit_check_at: DateTime<Utc>,
}

impl Default for RateLimitState {
    /// Nothing known yet: no budget, and a credit check is due immediately.
    fn default() -> Self {
        Self {
            uploads_allowed: 0,
            next_credit_check_at: DateTime::<Utc>::default(),
        }
    }
}

impl RateLimitState {
    /// True when no upload may be sent on the current estimate.
    pub fn is_exhausted(&self) -> bool {
        self.uploads_allowed <= 0
    }

    /// True when the budget is spent and the check deadline has passed.
    pub fn credit_check_due(&self, now: DateTime<Utc>) -> bool {
        self.is_exhausted() && now >= self.next_credit_check_at
    }

    /// Fold a snapshot into the state.
    ///
    /// Every present remaining-count is converted to uploads and the smallest
    /// one replaces `uploads_allowed`; every present reset time is resolved to
    /// an instant and the earliest one replaces `next_credit_check_at`. A
    /// dimension with no present signal keeps its previous value.
    pub fn merge(&mut self, snapshot: &RateLimitSnapshot, now: DateTime<Utc>, credits_per_upload: i64) {
        let per_upload = credits_per_upload.max(1);

        let budget = [
            snapshot.client_remaining.map(|c| c.div_euclid(per_upload)),
            snapshot.user_remaining.map(|c| c.div_euclid(per_upload)),
            snapshot.post_remaining,
        ]
        .into_iter()
        .flatten()
        .min();
        if let Some(budget) = budget {
            self.uploads_allowed = budget;
        }

        let resets = [
            snapshot.post_reset.and_then(|secs| seconds_after(now, secs)),
            snapshot
                .user_reset
                .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single()),
        ]
        .into_iter()
        .flatten()
        .min();
        if let Some(reset) = resets {
            self.next_credit_check_at = reset;
        }
    }

    /// Push the next credit check out by `cooldown` from `now`.
    pub fn defer_credit_check(&mut self, now: DateTime<Utc>, cooldown: Duration) {
        let secs = i64::try_from(cooldown.as_secs()).unwrap_or(i64::MAX);
        self.next_credit_check_at = seconds_after(now, secs).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Whole seconds a rejected caller should wait, including `jitter_secs`.
    pub fn retry_in(&self, now: DateTime<Utc>, jitter_secs: f64) -> u64 {
        let until_check = (self.next_credit_check_at - now).num_milliseconds() as f64 / 1000.0;
        (until_check + jitter_secs).floor().max(0.0) as u64
    }
}

/// `now + secs`, or `None` if that is not a representable instant.
fn seconds_after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    chrono::Duration::try_seconds(secs).and_then(|delta| now.checked_add_signed(delta))
}

/// Result of asking the limiter for an upload slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// A slot was reserved
    Allowed {
        /// Uploads left after this one
        remaining: i64,
    },
    /// No capacity
    Limited {
        /// Suggested wait before retrying, jitter included
        retry_after: Duration,
    },
}

/// Shared upload budget.
///
/// Owned by the upload pump, which is the only writer. Reads from elsewhere
/// (the status endpoint) see a consistent copy.
pub struct RateLimiter {
    /// Configuration
    config: RateLimitConfig,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Current estimate
    state: RwLock<RateLimitState>,
}

impl RateLimiter {
    /// Create a new limiter that knows nothing about remaining capacity.
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_state(config, clock, RateLimitState::default())
    }

    /// Create a limiter starting from a known state.
    pub fn with_state(config: RateLimitConfig, clock: Arc<dyn Clock>, state: RateLimitState) -> Self {
        Self {
            config,
            clock,
            state: RwLock::new(state),
        }
    }

    /// Current time according to the limiter's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Copy of the current estimate.
    pub async fn state(&self) -> RateLimitState {
        *self.state.read().await
    }

    /// Whether a credit check should be spent before the next upload.
    pub async fn credit_check_due(&self) -> bool {
        self.state.read().await.credit_check_due(self.now())
    }

    /// Fold provider-reported capacity into the estimate.
    pub async fn observe(&self, snapshot: &RateLimitSnapshot) -> RateLimitState {
        let now = self.now();
        let mut state = self.state.write().await;
        state.merge(snapshot, now, self.config.credits_per_upload);
        debug!(
            ?snapshot,
            uploads_allowed = state.uploads_allowed,
            next_credit_check_at = %state.next_credit_check_at,
            "Updated upload budget"
        );
        *state
    }

    /// Record a failed credit check. Only the check deadline moves.
    pub async fn credit_check_failed(&self) -> RateLimitState {
        let now = self.now();
        let mut state = self.state.write().await;
        state.defer_credit_check(now, self.config.credit_check_cooldown());
        *state
    }

    /// Reserve one upload slot, or report how long to wait.
    ///
    /// The slot is taken before the upload is sent; the real remaining count
    /// only arrives with the response.
    pub async fn try_acquire(&self) -> RateLimitResult {
        let now = self.now();
        let mut state = self.state.write().await;

        if state.is_exhausted() {
            let retry_in = state.retry_in(now, self.jitter());
            debug!(
                uploads_allowed = state.uploads_allowed,
                retry_in, "Upload budget exhausted"
            );
            return RateLimitResult::Limited {
                retry_after: Duration::from_secs(retry_in),
            };
        }

        state.uploads_allowed -= 1;
        RateLimitResult::Allowed {
            remaining: state.uploads_allowed,
        }
    }

    fn jitter(&self) -> f64 {
        let max = self.config.max_retry_jitter_secs as f64;
        if max > 0.0 {
            rand::thread_rng().gen_range(0.0..max)
        } else {
            0.0
        }
    }
}
