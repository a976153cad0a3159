//! Membership update notifications and the role changes derived from them.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rw_common::{GuildId, MemberId, RoleId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::platform::AuditActionType;

/// A member's role set before and after a change, as delivered by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MemberUpdate {
    pub guild_id: GuildId,
    pub member_id: MemberId,
    /// At most 250 ids per list.
    #[serde(default)]
    #[validate(length(max = 250))]
    pub roles_before: Vec<RoleId>,
    #[validate(length(max = 250))]
    pub roles_after: Vec<RoleId>,
    /// Audit action type to look up; defaults to member role update.
    #[serde(default)]
    pub audit_action_type: Option<AuditActionType>,
}

/// One observed change to a member's roles. Processed once, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChangeEvent {
    /// Correlates log lines and messages for this event.
    pub event_id: Uuid,
    pub guild_id: GuildId,
    pub member_id: MemberId,
    pub added_role_ids: Vec<RoleId>,
    pub removed_role_ids: Vec<RoleId>,
    pub previous_role_ids: Vec<RoleId>,
    pub current_role_ids: Vec<RoleId>,
    pub observed_at: DateTime<Utc>,
    pub action_type: AuditActionType,
}

impl RoleChangeEvent {
    /// Diff the before/after role sets. Order follows the input lists and
    /// duplicates are dropped.
    pub fn from_update(update: MemberUpdate, observed_at: DateTime<Utc>) -> Self {
        let added_role_ids = difference(&update.roles_after, &update.roles_before);
        let removed_role_ids = difference(&update.roles_before, &update.roles_after);

        Self {
            event_id: Uuid::now_v7(),
            guild_id: update.guild_id,
            member_id: update.member_id,
            added_role_ids,
            removed_role_ids,
            previous_role_ids: update.roles_before,
            current_role_ids: update.roles_after,
            observed_at,
            action_type: update.audit_action_type.unwrap_or_default(),
        }
    }

    /// No role was added or removed.
    pub fn is_empty(&self) -> bool {
        self.added_role_ids.is_empty() && self.removed_role_ids.is_empty()
    }
}

fn difference(left: &[RoleId], right: &[RoleId]) -> Vec<RoleId> {
    let exclude: HashSet<RoleId> = right.iter().copied().collect();
    let mut seen = HashSet::new();
    left.iter()
        .copied()
        .filter(|role| !exclude.contains(role) && seen.insert(*role))
        .collect()
}
