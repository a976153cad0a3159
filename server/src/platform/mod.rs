//! Chat platform boundary.
//!
//! The engine consumes three capabilities from the platform: the audit trail
//! (read-only, eventually consistent), member role reads and mutations, and
//! posting log messages. Each is a trait so the reconciler can run against
//! the REST adapter in [`http`] or an in-memory fake in tests.

pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rw_common::{ChannelId, GuildId, MemberId, RoleId, Snowflake};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enforce::LogMessage;

pub use http::HttpPlatform;

/// Audit log action type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditActionType(pub u8);

impl AuditActionType {
    /// Roles were added to or removed from a member.
    pub const MEMBER_ROLE_UPDATE: Self = Self(25);
}

impl Default for AuditActionType {
    fn default() -> Self {
        Self::MEMBER_ROLE_UPDATE
    }
}

/// One audit trail entry, reduced to what attribution needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub id: Snowflake,
    pub target_id: Option<MemberId>,
    pub executor_id: Option<MemberId>,
    pub added_role_ids: Vec<RoleId>,
    pub removed_role_ids: Vec<RoleId>,
    pub created_at: DateTime<Utc>,
}

/// Result of an idempotent role mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The platform changed the member's roles.
    Applied,
    /// The member was already in the requested state.
    AlreadyInState,
}

/// Platform call errors.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Platform returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Member not found")]
    MemberNotFound,

    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// Read access to the platform's audit trail.
#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Most recent entries of `action_type`, newest first. May be empty or stale.
    async fn query_recent_actions(
        &self,
        guild_id: GuildId,
        action_type: AuditActionType,
        limit: u8,
    ) -> Result<Vec<AuditEntry>, PlatformError>;
}

/// Member role reads and mutations.
#[async_trait]
pub trait MemberGateway: Send + Sync {
    /// User id of the account this gateway acts as.
    async fn fetch_current_user(&self) -> Result<MemberId, PlatformError>;

    async fn fetch_member_roles(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
    ) -> Result<Vec<RoleId>, PlatformError>;

    async fn add_role(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
        role_id: RoleId,
        reason: &str,
    ) -> Result<MutationOutcome, PlatformError>;

    async fn remove_role(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
        role_id: RoleId,
        reason: &str,
    ) -> Result<MutationOutcome, PlatformError>;
}

/// Destination for structured enforcement log messages.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn send_log(
        &self,
        channel_id: ChannelId,
        message: &LogMessage,
    ) -> Result<(), PlatformError>;
}
