//! Policy document schema.
//!
//! The on-disk JSON shape of the authorization policy. Deserialized with
//! serde, then checked with `validator` before a [`super::Policy`] is built.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use rw_common::{ChannelId, MemberId, RoleId};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Authorization policy as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_document"))]
pub struct PolicyDocument {
    /// Monotonic document version, reported by `/health`.
    #[validate(range(min = 1))]
    pub version: u32,

    /// Rank names ordered from least to most senior.
    #[validate(length(min = 1))]
    pub hierarchy_order: Vec<String>,

    /// Rank name -> role backing that rank.
    pub rank_roles: HashMap<String, RoleId>,

    /// First rank considered senior. Ranks below it are junior.
    #[validate(length(min = 1))]
    pub threshold_rank: String,

    /// Named roles with their own grant overrides.
    #[serde(default)]
    pub blocked_roles: HashMap<RoleId, BlockedRole>,

    /// Roles allowed to grant junior ranks.
    #[serde(default)]
    pub leadership_role_ids: Vec<RoleId>,

    /// Area leader role -> area name. Area leaders may also grant senior ranks.
    #[serde(default)]
    pub area_leader_role_ids: HashMap<RoleId, String>,

    /// Roles allowed to grant entry roles and junior ranks.
    #[serde(default)]
    pub recruitment_leader_role_ids: Vec<RoleId>,

    /// Staff and basic-entry roles that recruitment leadership may grant.
    #[serde(default)]
    pub entry_role_ids: Vec<RoleId>,

    /// Users whose actions are always authorized.
    #[validate(length(min = 1))]
    pub owner_ids: Vec<MemberId>,

    /// Roles marking automation accounts (e.g. shop bots).
    #[serde(default)]
    pub bot_actor_role_ids: Vec<RoleId>,

    /// Fixed automation identities treated as bot actors.
    #[serde(default)]
    pub system_actor_ids: Vec<MemberId>,

    /// Role used while migrating members between hierarchies.
    #[serde(default)]
    pub migration_global_role_id: Option<RoleId>,

    /// Rank granted alongside a migration grant when missing.
    #[serde(default)]
    pub migration_fallback_rank: Option<String>,

    /// The most senior role. Only owners may grant it.
    #[serde(default)]
    pub global_lead_role_id: Option<RoleId>,

    /// Role restored when removed by an unauthorized actor.
    #[serde(default)]
    pub protected_role_id: Option<RoleId>,

    #[serde(default)]
    pub purchasable_role_ids: Vec<RoleId>,

    #[serde(default)]
    pub vip_role_ids: Vec<RoleId>,

    #[serde(default)]
    pub permission_role_ids: Vec<RoleId>,

    /// Roles that are only reported, never enforced.
    #[serde(default)]
    pub monitored_role_ids: Vec<RoleId>,

    /// Channel receiving one structured message per enforcement decision.
    pub log_channel_id: ChannelId,

    /// Executors whose actions are never posted to the log channel.
    #[serde(default)]
    pub log_exempt_executor_ids: Vec<MemberId>,

    #[serde(default)]
    pub alert_mentions: AlertMentions,
}

/// Override rules for a named role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedRole {
    pub display_name: String,
    #[serde(default)]
    pub allowed_leader_role: Option<RoleId>,
    #[serde(default)]
    pub allowed_leader_roles: Vec<RoleId>,
}

impl BlockedRole {
    /// Every role that may grant this one through the explicit override.
    pub fn allowed_leaders(&self) -> impl Iterator<Item = RoleId> + '_ {
        self.allowed_leader_role
            .into_iter()
            .chain(self.allowed_leader_roles.iter().copied())
    }

    /// Whether this entry carries its own override list.
    pub fn has_overrides(&self) -> bool {
        self.allowed_leader_role.is_some() || !self.allowed_leader_roles.is_empty()
    }
}

/// Alert targets attached to denial log messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMentions {
    #[serde(default)]
    pub purchasable: MentionList,
    #[serde(default)]
    pub blocked: MentionList,
}

/// Roles and users to mention in a log message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionList {
    #[serde(default)]
    pub roles: Vec<RoleId>,
    #[serde(default)]
    pub users: Vec<MemberId>,
}

impl MentionList {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.users.is_empty()
    }
}

fn invalid(code: &'static str, message: String) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Owned(message))
}

/// Cross-field checks that field attributes cannot express.
fn validate_document(doc: &PolicyDocument) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for rank in &doc.hierarchy_order {
        if rank.trim().is_empty() {
            return Err(invalid("empty_rank", "hierarchy_order contains an empty rank".into()));
        }
        if !seen.insert(rank.as_str()) {
            return Err(invalid(
                "duplicate_rank",
                format!("rank '{rank}' appears more than once in hierarchy_order"),
            ));
        }
    }

    if !seen.contains(doc.threshold_rank.as_str()) {
        return Err(invalid(
            "unknown_threshold_rank",
            format!("threshold_rank '{}' is not in hierarchy_order", doc.threshold_rank),
        ));
    }

    let mut rank_role_ids = HashSet::new();
    for (rank, role_id) in &doc.rank_roles {
        if !seen.contains(rank.as_str()) {
            return Err(invalid(
                "unknown_rank",
                format!("rank_roles key '{rank}' is not in hierarchy_order"),
            ));
        }
        if !rank_role_ids.insert(*role_id) {
            return Err(invalid(
                "shared_rank_role",
                format!("role {role_id} backs more than one rank"),
            ));
        }
    }

    if let Some(fallback) = &doc.migration_fallback_rank {
        if !doc.rank_roles.contains_key(fallback) {
            return Err(invalid(
                "unknown_fallback_rank",
                format!("migration_fallback_rank '{fallback}' has no role in rank_roles"),
            ));
        }
    }

    for (role_id, blocked) in &doc.blocked_roles {
        if blocked.display_name.trim().is_empty() {
            return Err(invalid(
                "blocked_role_name",
                format!("blocked role {role_id} needs a display_name"),
            ));
        }
    }

    Ok(())
}
