//! Executor attribution from the audit trail.
//!
//! The platform records who changed a member's roles, but the entry can show
//! up well after the change itself was observed. [`AuditResolver`] re-queries a
//! bounded window of recent entries on a [`BackoffSchedule`] and stops at the
//! first matching entry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rw_common::{GuildId, MemberId, RoleId};
use tracing::{debug, info};

use super::backoff::BackoffSchedule;
use crate::authz::RoleDelta;
use crate::platform::{AuditActionType, AuditEntry, AuditTrail};

/// Default look-back from the observation time, in seconds.
///
/// An entry records when the change happened, not when it became visible, so
/// a lagging entry still falls inside this window. Earlier grants of the same
/// role to the same member fall outside it and cannot be mistaken for the
/// change being attributed.
pub const DEFAULT_MAX_ENTRY_AGE_SECS: u64 = 10;

/// What to look for in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditQuery {
    pub guild_id: GuildId,
    pub member_id: MemberId,
    pub role_id: RoleId,
    pub delta: RoleDelta,
    pub observed_at: DateTime<Utc>,
    pub action_type: AuditActionType,
}

/// Outcome of attribution. Unresolved is a valid result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditResolution {
    pub executor_id: Option<MemberId>,
    pub attempts: u32,
}

impl AuditResolution {
    pub const fn resolved(&self) -> bool {
        self.executor_id.is_some()
    }
}

/// Bounded-retry executor lookup.
pub struct AuditResolver {
    trail: Arc<dyn AuditTrail>,
    schedule: BackoffSchedule,
    lookup_limit: u8,
    max_entry_age: chrono::Duration,
}

impl AuditResolver {
    pub fn new(
        trail: Arc<dyn AuditTrail>,
        schedule: BackoffSchedule,
        lookup_limit: u8,
        max_entry_age: Duration,
    ) -> Self {
        Self {
            trail,
            schedule,
            lookup_limit,
            max_entry_age: chrono::Duration::from_std(max_entry_age)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    pub const fn schedule(&self) -> &BackoffSchedule {
        &self.schedule
    }

    /// Find the executor of the change described by `query`.
    ///
    /// Waits at most [`BackoffSchedule::total_wait`] plus query latency.
    /// Failed queries count as misses.
    pub async fn resolve(&self, query: &AuditQuery) -> AuditResolution {
        let outcome = self
            .schedule
            .retry(|attempt| async move {
                let entries = self
                    .trail
                    .query_recent_actions(query.guild_id, query.action_type, self.lookup_limit)
                    .await?;
                debug!(
                    attempt,
                    entries = entries.len(),
                    role_id = %query.role_id,
                    "Audit entries fetched"
                );
                Ok::<_, crate::platform::PlatformError>(
                    select_entry(&entries, query, self.max_entry_age)
                        .and_then(|entry| entry.executor_id),
                )
            })
            .await;

        if outcome.value.is_none() {
            info!(
                member_id = %query.member_id,
                role_id = %query.role_id,
                attempts = outcome.attempts,
                "Executor unresolved after retry budget"
            );
        }

        AuditResolution {
            executor_id: outcome.value,
            attempts: outcome.attempts,
        }
    }
}

/// Pick the entry attributing `query`, if any.
///
/// Candidates target the member, carry the role in the matching delta, have
/// an executor, and are not older than `observed_at - max_age`. The most
/// recent candidate wins; ties on timestamp go to the higher entry id.
pub fn select_entry<'a>(
    entries: &'a [AuditEntry],
    query: &AuditQuery,
    max_age: chrono::Duration,
) -> Option<&'a AuditEntry> {
    let oldest = query
        .observed_at
        .checked_sub_signed(max_age)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    entries
        .iter()
        .filter(|entry| entry.target_id == Some(query.member_id))
        .filter(|entry| entry.executor_id.is_some())
        .filter(|entry| entry.created_at >= oldest)
        .filter(|entry| {
            let roles = match query.delta {
                RoleDelta::Added => &entry.added_role_ids,
                RoleDelta::Removed => &entry.removed_role_ids,
            };
            roles.contains(&query.role_id)
        })
        .max_by_key(|entry| (entry.created_at, entry.id))
}
