// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Imgur Upload Relay
//!
//! This crate forwards image uploads to the Imgur API one at a time while
//! tracking the API's rate limits:
//!
//! - Per-client credits (10 per upload)
//! - Per-user credits (10 per upload)
//! - Post window (1 per upload)
//! - Credit checks when the local budget runs out, with a 15 minute backoff
//!   when the check itself fails
//! - Jittered retry hints for callers turned away

pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod outcome;
pub mod provider;
pub mod pump;

pub use config::Config;
pub use gateway::{RelayStatus, UploadGateway};
pub use limiter::{Clock, RateLimitResult, RateLimitSnapshot, RateLimitState, RateLimiter, SystemClock};
pub use outcome::{FailureReason, UploadOutcome};
pub use provider::{ImageHost, ImgurClient, ProviderError, Upload, UpstreamResponse};
