//! Authorization evaluation.
//!
//! Each class has its own strategy function; [`evaluate_grant`] handles the
//! rules shared by all classes (attribution, owners) and dispatches on the
//! classification. Evaluation is pure: all inputs come from the policy
//! snapshot, the attribution, and the member's role set.

use rw_common::RoleId;

use super::decision::{
    Attribution, EnforcementDecision, Executor, ReasonCode, RoleDelta, Verdict,
};
use crate::policy::{ClassLabel, Classification, ManagedRole, Policy};

/// Verdict produced by a class strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ruling {
    verdict: Verdict,
    reason: ReasonCode,
    fallback_role_id: Option<RoleId>,
}

impl Ruling {
    const fn allow(reason: ReasonCode) -> Self {
        Self {
            verdict: Verdict::Allow,
            reason,
            fallback_role_id: None,
        }
    }

    const fn deny(reason: ReasonCode) -> Self {
        Self {
            verdict: Verdict::Deny,
            reason,
            fallback_role_id: None,
        }
    }

    const fn suppressed(reason: ReasonCode) -> Self {
        Self {
            verdict: Verdict::Suppressed,
            reason,
            fallback_role_id: None,
        }
    }
}

/// Decide whether granting `role_id` was authorized.
///
/// Returns `None` for unclassified roles, which are ignored entirely.
/// `member_roles` is the member's role set after the change.
pub fn evaluate_grant(
    policy: &Policy,
    role_id: RoleId,
    class: Classification<'_>,
    attribution: &Attribution,
    member_roles: &[RoleId],
) -> Option<EnforcementDecision> {
    let label = class.label()?;

    let ruling = match attribution {
        Attribution::Unresolved { .. } => Ruling::suppressed(ReasonCode::ExecutorUnresolved),
        Attribution::RolesUnavailable { executor_id } if policy.is_owner(*executor_id) => {
            Ruling::allow(ReasonCode::Owner)
        }
        Attribution::RolesUnavailable { .. } => {
            Ruling::suppressed(ReasonCode::ExecutorRolesUnavailable)
        }
        Attribution::Resolved(executor) if policy.is_owner(executor.id) => {
            Ruling::allow(ReasonCode::Owner)
        }
        Attribution::Resolved(executor) => match class {
            Classification::Monitored => Ruling::allow(ReasonCode::MonitoredRole),
            Classification::Vip | Classification::Permission => {
                Ruling::allow(ReasonCode::InformationalRole)
            }
            Classification::Purchasable => evaluate_purchasable(policy, executor),
            Classification::Managed(managed) => {
                evaluate_managed(policy, role_id, managed, executor, member_roles)
            }
            Classification::Unclassified => return None,
        },
    };

    Some(EnforcementDecision {
        role_id,
        delta: RoleDelta::Added,
        class: label,
        role_name: class.role_name().map(str::to_owned),
        verdict: ruling.verdict,
        reason: ruling.reason,
        fallback_role_id: ruling.fallback_role_id,
    })
}

/// Decide whether removing the protected role was authorized.
pub fn evaluate_protected_removal(
    policy: &Policy,
    role_id: RoleId,
    attribution: &Attribution,
) -> EnforcementDecision {
    let ruling = match attribution {
        Attribution::Unresolved { .. } => Ruling::suppressed(ReasonCode::ExecutorUnresolved),
        Attribution::RolesUnavailable { executor_id } if policy.is_owner(*executor_id) => {
            Ruling::allow(ReasonCode::Owner)
        }
        Attribution::RolesUnavailable { .. } => {
            Ruling::suppressed(ReasonCode::ExecutorRolesUnavailable)
        }
        Attribution::Resolved(executor) if policy.is_owner(executor.id) => {
            Ruling::allow(ReasonCode::Owner)
        }
        Attribution::Resolved(executor)
            if executor.has_any(|r| policy.is_leadership_capable_role(r)) =>
        {
            Ruling::allow(ReasonCode::ProtectedRemovalAuthorized)
        }
        Attribution::Resolved(_) => Ruling::deny(ReasonCode::ProtectedRemovalUnauthorized),
    };

    EnforcementDecision {
        role_id,
        delta: RoleDelta::Removed,
        class: ClassLabel::Protected,
        role_name: None,
        verdict: ruling.verdict,
        reason: ruling.reason,
        fallback_role_id: None,
    }
}

/// Purchasable roles: owners (checked earlier) and bot actors only.
fn evaluate_purchasable(policy: &Policy, executor: &Executor) -> Ruling {
    if policy.is_system_actor(executor.id) || executor.has_any(|r| policy.is_bot_actor_role(r)) {
        Ruling::allow(ReasonCode::BotActorPurchase)
    } else {
        Ruling::deny(ReasonCode::UnauthorizedPurchase)
    }
}

/// Hierarchy ranks and blocked roles. First matching rule wins.
fn evaluate_managed(
    policy: &Policy,
    role_id: RoleId,
    managed: ManagedRole<'_>,
    executor: &Executor,
    member_roles: &[RoleId],
) -> Ruling {
    if policy.global_lead_role_id() == Some(role_id) {
        return Ruling::deny(ReasonCode::GlobalLeadOwnerOnly);
    }

    let junior = managed
        .rank
        .is_some_and(|rank| policy.hierarchy().is_junior_index(rank.index));

    let migrating = policy
        .migration_global_role_id()
        .is_some_and(|r| executor.has_role(r));
    if migrating && junior {
        let fallback_role_id = policy
            .migration_fallback_role_id()
            .filter(|fallback| *fallback != role_id && !member_roles.contains(fallback));
        return Ruling {
            fallback_role_id,
            ..Ruling::allow(ReasonCode::MigrationGrant)
        };
    }

    if let Some(blocked) = managed.blocked.filter(|b| b.has_overrides()) {
        return if blocked.allowed_leaders().any(|r| executor.has_role(r)) {
            Ruling::allow(ReasonCode::BlockedOverride)
        } else {
            Ruling::deny(ReasonCode::BlockedOverrideMissing)
        };
    }

    let leadership = executor.has_any(|r| policy.is_leadership_capable_role(r));

    if executor.has_any(|r| policy.is_recruitment_leader_role(r)) {
        if junior || policy.is_entry_role(role_id) {
            return Ruling::allow(ReasonCode::RecruitmentLeadership);
        }
        // Recruitment leads holding another leadership role fall through
        if !leadership {
            return Ruling::deny(ReasonCode::RecruitmentOutOfScope);
        }
    }

    if junior {
        if leadership {
            Ruling::allow(ReasonCode::JuniorHierarchyLeadership)
        } else {
            Ruling::deny(ReasonCode::JuniorHierarchyRequiresLeadership)
        }
    } else if executor.has_any(|r| policy.is_area_leader_role(r)) {
        Ruling::allow(ReasonCode::SeniorHierarchyAreaLeader)
    } else {
        Ruling::deny(ReasonCode::SeniorHierarchyRequiresAreaLeader)
    }
}
