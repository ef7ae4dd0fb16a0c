// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the upload relay.
//!
//! Every field has a default so the relay starts with nothing but
//! `IMGUR_CLIENT_ID` set. Without a client id the relay still runs, but every
//! upload fails with a configuration error.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the upload relay service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Provider (Imgur) API configuration
    #[serde(default)]
    pub imgur: ImgurConfig,

    /// Rate limit bookkeeping configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Inbound upload configuration
    #[serde(default)]
    pub upload: UploadConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Provider API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImgurConfig {
    /// Application client id sent as `Authorization: Client-ID <id>`
    #[serde(default)]
    pub client_id: Option<String>,

    /// API base URL (default: https://api.imgur.com/3)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Per-request timeout in seconds. Unset means the transport default.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// Rate limit bookkeeping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Backoff before the next credit check after one fails (default: 900)
    #[serde(default = "default_credit_check_cooldown_secs")]
    pub credit_check_cooldown_secs: u64,

    /// Upper bound (exclusive) of the random retry jitter (default: 60)
    #[serde(default = "default_max_retry_jitter_secs")]
    pub max_retry_jitter_secs: u64,

    /// Client/user credits spent by one upload (default: 10)
    #[serde(default = "default_credits_per_upload")]
    pub credits_per_upload: i64,
}

/// Inbound upload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted request body in bytes (default: 20 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Answer CORS preflights for any origin (default: true)
    #[serde(default = "default_true")]
    pub allow_any_origin: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_api_base() -> String {
    "https://api.imgur.com/3".to_string()
}

fn default_credit_check_cooldown_secs() -> u64 {
    15 * 60
}

fn default_max_retry_jitter_secs() -> u64 {
    60
}

fn default_credits_per_upload() -> i64 {
    10 // Imgur charges 10 credits per POST
}

fn default_max_body_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            imgur: ImgurConfig::default(),
            rate_limit: RateLimitConfig::default(),
            upload: UploadConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ImgurConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            api_base: default_api_base(),
            request_timeout_secs: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            credit_check_cooldown_secs: default_credit_check_cooldown_secs(),
            max_retry_jitter_secs: default_max_retry_jitter_secs(),
            credits_per_upload: default_credits_per_upload(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            allow_any_origin: default_true(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    /// Build configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Unparseable values fall back to the default rather than failing.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            imgur: ImgurConfig {
                client_id: lookup("IMGUR_CLIENT_ID")
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty()),
                api_base: lookup("IMGUR_API_BASE")
                    .map(|v| v.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.imgur.api_base),
                request_timeout_secs: parse_var(&lookup, "IMGUR_TIMEOUT_SECS"),
            },
            rate_limit: RateLimitConfig {
                credit_check_cooldown_secs: parse_var(&lookup, "CREDIT_CHECK_COOLDOWN_SECS")
                    .unwrap_or(defaults.rate_limit.credit_check_cooldown_secs),
                max_retry_jitter_secs: parse_var(&lookup, "RETRY_JITTER_SECS")
                    .unwrap_or(defaults.rate_limit.max_retry_jitter_secs),
                credits_per_upload: parse_var(&lookup, "CREDITS_PER_UPLOAD")
                    .filter(|v: &i64| *v > 0)
                    .unwrap_or(defaults.rate_limit.credits_per_upload),
            },
            upload: UploadConfig {
                max_body_bytes: parse_var(&lookup, "MAX_UPLOAD_BYTES")
                    .unwrap_or(defaults.upload.max_body_bytes),
                allow_any_origin: parse_var(&lookup, "CORS_ALLOW_ANY_ORIGIN")
                    .unwrap_or(defaults.upload.allow_any_origin),
            },
            metrics: MetricsConfig {
                enabled: parse_var(&lookup, "METRICS_ENABLED").unwrap_or(defaults.metrics.enabled),
                ..defaults.metrics
            },
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl ImgurConfig {
    /// Get the request timeout, if one is configured
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl RateLimitConfig {
    /// Get the credit check cooldown duration
    pub fn credit_check_cooldown(&self) -> Duration {
        Duration::from_secs(self.credit_check_cooldown_secs)
    }
}
