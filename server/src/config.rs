//! Server Configuration
//!
//! Loads process configuration from environment variables. Authorization
//! policy lives in a separate document, see [`crate::policy`].

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use rw_common::MemberId;

use crate::audit::{BackoffSchedule, DEFAULT_MAX_ENTRY_AGE_SECS};

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Intake/admin HTTP bind address (e.g., "0.0.0.0:8090")
    pub bind_address: String,

    /// Base URL of the chat platform REST API
    pub platform_api_url: String,

    /// Bot credential used for every platform call
    pub platform_bot_token: String,

    /// The engine's own user id. Changes it performs are never re-evaluated.
    /// When unset it is read from the platform at startup.
    pub engine_user_id: Option<MemberId>,

    /// Path to the JSON policy document
    pub policy_path: PathBuf,

    /// Policy file poll interval (None disables hot reload)
    pub policy_reload_interval: Option<Duration>,

    /// Delays between audit lookups (default: 500ms, 1200ms, 2500ms)
    pub audit_retry_delays: BackoffSchedule,

    /// Number of recent audit entries fetched per lookup (default: 25)
    pub audit_lookup_limit: u8,

    /// Audit entries older than the observation minus this age are ignored (default: 10s)
    pub audit_max_entry_age: Duration,

    /// Bearer token for admin endpoints (admin routes disabled if unset)
    pub admin_token: Option<String>,

    /// Capacity of the intake queue (default: 1024)
    pub event_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let audit_retry_delays = match env::var("AUDIT_RETRY_DELAYS_MS") {
            Ok(raw) => BackoffSchedule::parse_millis(&raw)
                .context("AUDIT_RETRY_DELAYS_MS must be a comma-separated list of milliseconds")?,
            Err(_) => BackoffSchedule::default(),
        };

        let engine_user_id = match env::var("ENGINE_USER_ID") {
            Ok(raw) => Some(
                raw.parse()
                    .context("ENGINE_USER_ID must be a numeric user id")?,
            ),
            Err(_) => None,
        };

        let reload_secs: u64 = env::var("POLICY_RELOAD_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8090".into()),
            platform_api_url: env::var("PLATFORM_API_URL")
                .unwrap_or_else(|_| "https://discord.com/api/v10".into()),
            platform_bot_token: env::var("PLATFORM_BOT_TOKEN")
                .context("PLATFORM_BOT_TOKEN must be set")?,
            engine_user_id,
            policy_path: env::var("POLICY_PATH")
                .context("POLICY_PATH must be set")?
                .into(),
            policy_reload_interval: (reload_secs > 0).then(|| Duration::from_secs(reload_secs)),
            audit_retry_delays,
            audit_lookup_limit: env::var("AUDIT_LOOKUP_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| (1..=100).contains(n))
                .unwrap_or(25),
            audit_max_entry_age: Duration::from_secs(
                env::var("AUDIT_MAX_ENTRY_AGE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_MAX_ENTRY_AGE_SECS),
            ),
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            event_queue_capacity: env::var("EVENT_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(1024),
        })
    }

    /// Check if the admin endpoints are enabled.
    #[must_use]
    pub const fn has_admin(&self) -> bool {
        self.admin_token.is_some()
    }

    /// Create a default configuration for testing.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:8090".into(),
            platform_api_url: "http://127.0.0.1:9/api".into(),
            platform_bot_token: "test-token".into(),
            engine_user_id: Some(MemberId::new(999)),
            policy_path: "policy.json".into(),
            policy_reload_interval: None,
            audit_retry_delays: BackoffSchedule::default(),
            audit_lookup_limit: 25,
            audit_max_entry_age: Duration::from_secs(DEFAULT_MAX_ENTRY_AGE_SECS),
            admin_token: Some("admin-secret".into()),
            event_queue_capacity: 16,
        }
    }
}
