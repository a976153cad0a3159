//! Enforcement decision types.

use std::collections::HashSet;

use rw_common::{MemberId, RoleId};
use serde::Serialize;

use crate::policy::ClassLabel;

/// Who performed a change, as far as attribution could tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    /// Executor identified and their current roles fetched.
    Resolved(Executor),
    /// No matching audit entry within the retry budget.
    Unresolved { attempts: u32 },
    /// Executor identified, but their roles could not be read.
    RolesUnavailable { executor_id: MemberId },
}

impl Attribution {
    pub const fn executor_id(&self) -> Option<MemberId> {
        match self {
            Self::Resolved(executor) => Some(executor.id),
            Self::Unresolved { .. } => None,
            Self::RolesUnavailable { executor_id } => Some(*executor_id),
        }
    }
}

/// An identified executor and the roles they hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executor {
    pub id: MemberId,
    pub roles: HashSet<RoleId>,
}

impl Executor {
    pub fn new(id: MemberId, roles: impl IntoIterator<Item = RoleId>) -> Self {
        Self {
            id,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_role(&self, role_id: RoleId) -> bool {
        self.roles.contains(&role_id)
    }

    pub fn has_any(&self, mut pred: impl FnMut(RoleId) -> bool) -> bool {
        self.roles.iter().any(|role| pred(*role))
    }
}

/// Direction of the observed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleDelta {
    Added,
    Removed,
}

/// Outcome of evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny,
    /// Attribution unknown: enforcement skipped (fail-open).
    Suppressed,
}

/// Which rule produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    ExecutorUnresolved,
    ExecutorRolesUnavailable,
    Owner,
    MonitoredRole,
    InformationalRole,
    BotActorPurchase,
    UnauthorizedPurchase,
    GlobalLeadOwnerOnly,
    MigrationGrant,
    BlockedOverride,
    BlockedOverrideMissing,
    RecruitmentLeadership,
    RecruitmentOutOfScope,
    JuniorHierarchyLeadership,
    JuniorHierarchyRequiresLeadership,
    SeniorHierarchyAreaLeader,
    SeniorHierarchyRequiresAreaLeader,
    ProtectedRemovalAuthorized,
    ProtectedRemovalUnauthorized,
}

impl ReasonCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExecutorUnresolved => "executor_unresolved",
            Self::ExecutorRolesUnavailable => "executor_roles_unavailable",
            Self::Owner => "owner",
            Self::MonitoredRole => "monitored_role",
            Self::InformationalRole => "informational_role",
            Self::BotActorPurchase => "bot_actor_purchase",
            Self::UnauthorizedPurchase => "unauthorized_purchase",
            Self::GlobalLeadOwnerOnly => "global_lead_owner_only",
            Self::MigrationGrant => "migration_grant",
            Self::BlockedOverride => "blocked_override",
            Self::BlockedOverrideMissing => "blocked_override_missing",
            Self::RecruitmentLeadership => "recruitment_leadership",
            Self::RecruitmentOutOfScope => "recruitment_out_of_scope",
            Self::JuniorHierarchyLeadership => "junior_hierarchy_leadership",
            Self::JuniorHierarchyRequiresLeadership => "junior_hierarchy_requires_leadership",
            Self::SeniorHierarchyAreaLeader => "senior_hierarchy_area_leader",
            Self::SeniorHierarchyRequiresAreaLeader => "senior_hierarchy_requires_area_leader",
            Self::ProtectedRemovalAuthorized => "protected_removal_authorized",
            Self::ProtectedRemovalUnauthorized => "protected_removal_unauthorized",
        }
    }

    /// Sentence used in log messages.
    pub const fn description(self) -> &'static str {
        match self {
            Self::ExecutorUnresolved => "Executor could not be verified from the audit log",
            Self::ExecutorRolesUnavailable => "Executor's roles could not be read",
            Self::Owner => "Granted by an owner",
            Self::MonitoredRole => "Monitored role, reported only",
            Self::InformationalRole => "Informational role, reported only",
            Self::BotActorPurchase => "Granted by a bot actor",
            Self::UnauthorizedPurchase => "Purchasable roles may only be granted by owners or bot actors",
            Self::GlobalLeadOwnerOnly => "The global lead role may only be granted by an owner",
            Self::MigrationGrant => "Junior rank granted through migration",
            Self::BlockedOverride => "Granted by an allowed leader for this role",
            Self::BlockedOverrideMissing => "Executor is not an allowed leader for this role",
            Self::RecruitmentLeadership => "Granted by recruitment leadership",
            Self::RecruitmentOutOfScope => "Recruitment leadership may only grant entry roles and junior ranks",
            Self::JuniorHierarchyLeadership => "Junior rank granted by leadership",
            Self::JuniorHierarchyRequiresLeadership => "Junior ranks require a leadership role",
            Self::SeniorHierarchyAreaLeader => "Senior rank granted by an area leader",
            Self::SeniorHierarchyRequiresAreaLeader => "Senior ranks require an area leader role",
            Self::ProtectedRemovalAuthorized => "Protected role removed by leadership",
            Self::ProtectedRemovalUnauthorized => "Protected role removed by an unauthorized actor",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision for one changed role; drives side effects and the log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementDecision {
    pub role_id: RoleId,
    pub delta: RoleDelta,
    pub class: ClassLabel,
    /// Policy name for the role, if known.
    pub role_name: Option<String>,
    pub verdict: Verdict,
    pub reason: ReasonCode,
    /// Rank role to grant as a compensating action.
    pub fallback_role_id: Option<RoleId>,
}

impl EnforcementDecision {
    pub const fn allowed(&self) -> bool {
        matches!(self.verdict, Verdict::Allow)
    }
}
