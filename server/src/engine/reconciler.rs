//! Per-event reconciliation pipeline.
//!
//! classify -> resolve executor -> evaluate -> enforce, sequentially for each
//! changed role of one event, against a single policy snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use rw_common::{GuildId, MemberId, RoleId};
use tracing::{debug, info};
use uuid::Uuid;

use super::events::RoleChangeEvent;
use crate::audit::{AuditQuery, AuditResolution, AuditResolver};
use crate::authz::{
    evaluate_grant, evaluate_protected_removal, Attribution, EnforcementDecision, Executor,
    RoleDelta,
};
use crate::enforce::{EnforcementOutcome, Enforcer, EventContext};
use crate::platform::{MemberGateway, PlatformError};
use crate::policy::{Policy, PolicyStore};

/// What happened to one changed role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The change was made by the engine itself and left alone.
    EngineAction,
    Enforced {
        decision: EnforcementDecision,
        outcome: EnforcementOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleReport {
    pub role_id: RoleId,
    pub delta: RoleDelta,
    pub executor_id: Option<MemberId>,
    pub attempts: u32,
    pub disposition: Disposition,
}

impl RoleReport {
    pub const fn decision(&self) -> Option<&EnforcementDecision> {
        match &self.disposition {
            Disposition::Enforced { decision, .. } => Some(decision),
            Disposition::EngineAction => None,
        }
    }

    pub const fn outcome(&self) -> Option<&EnforcementOutcome> {
        match &self.disposition {
            Disposition::Enforced { outcome, .. } => Some(outcome),
            Disposition::EngineAction => None,
        }
    }
}

/// Summary of one processed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    pub event_id: Uuid,
    pub policy_version: u32,
    /// Only governed roles appear here; unclassified ones are skipped.
    pub roles: Vec<RoleReport>,
}

/// Runs the reconciliation pipeline.
pub struct Reconciler {
    policies: Arc<PolicyStore>,
    resolver: AuditResolver,
    gateway: Arc<dyn MemberGateway>,
    enforcer: Enforcer,
    engine_user_id: MemberId,
}

impl Reconciler {
    pub fn new(
        policies: Arc<PolicyStore>,
        resolver: AuditResolver,
        gateway: Arc<dyn MemberGateway>,
        enforcer: Enforcer,
        engine_user_id: MemberId,
    ) -> Self {
        Self {
            policies,
            resolver,
            gateway,
            enforcer,
            engine_user_id,
        }
    }

    /// Process one event to completion. Never fails; problems are logged.
    #[tracing::instrument(
        skip(self, event),
        fields(
            event_id = %event.event_id,
            guild_id = %event.guild_id,
            member_id = %event.member_id,
        )
    )]
    pub async fn process(&self, event: &RoleChangeEvent) -> EventReport {
        let policy = self.policies.current().await;
        let ctx = EventContext {
            event_id: event.event_id,
            guild_id: event.guild_id,
            member_id: event.member_id,
        };
        let mut executors = HashMap::new();
        let mut roles = Vec::new();

        for &role_id in &event.added_role_ids {
            let class = policy.classify(role_id);
            if class.label().is_none() {
                debug!(role_id = %role_id, "Unclassified role, ignored");
                continue;
            }

            let resolution = self.resolve(event, role_id, RoleDelta::Added).await;
            if self.is_engine(resolution.executor_id) {
                roles.push(engine_report(role_id, RoleDelta::Added, &resolution));
                continue;
            }

            let attribution = self
                .attribute(&mut executors, event.guild_id, &resolution)
                .await;
            let Some(decision) =
                evaluate_grant(&policy, role_id, class, &attribution, &event.current_role_ids)
            else {
                continue;
            };

            roles.push(
                self.enforce(&policy, &ctx, &attribution, &resolution, decision)
                    .await,
            );
        }

        if let Some(protected) = policy
            .protected_role_id()
            .filter(|role| event.removed_role_ids.contains(role))
        {
            let resolution = self.resolve(event, protected, RoleDelta::Removed).await;
            if self.is_engine(resolution.executor_id) {
                roles.push(engine_report(protected, RoleDelta::Removed, &resolution));
            } else {
                let attribution = self
                    .attribute(&mut executors, event.guild_id, &resolution)
                    .await;
                let decision = evaluate_protected_removal(&policy, protected, &attribution);
                roles.push(
                    self.enforce(&policy, &ctx, &attribution, &resolution, decision)
                        .await,
                );
            }
        }

        info!(
            policy_version = policy.version(),
            added = event.added_role_ids.len(),
            removed = event.removed_role_ids.len(),
            governed = roles.len(),
            "Event processed"
        );

        EventReport {
            event_id: event.event_id,
            policy_version: policy.version(),
            roles,
        }
    }

    fn is_engine(&self, executor_id: Option<MemberId>) -> bool {
        executor_id == Some(self.engine_user_id)
    }

    async fn resolve(
        &self,
        event: &RoleChangeEvent,
        role_id: RoleId,
        delta: RoleDelta,
    ) -> AuditResolution {
        let query = AuditQuery {
            guild_id: event.guild_id,
            member_id: event.member_id,
            role_id,
            delta,
            observed_at: event.observed_at,
            action_type: event.action_type,
        };
        self.resolver.resolve(&query).await
    }

    /// Attach the executor's current roles, fetched once per event.
    async fn attribute(
        &self,
        cache: &mut HashMap<MemberId, Attribution>,
        guild_id: GuildId,
        resolution: &AuditResolution,
    ) -> Attribution {
        let Some(executor_id) = resolution.executor_id else {
            return Attribution::Unresolved {
                attempts: resolution.attempts,
            };
        };
        if let Some(cached) = cache.get(&executor_id) {
            return cached.clone();
        }

        let fetched = self
            .resolver
            .schedule()
            .retry(|_| async move {
                self.gateway
                    .fetch_member_roles(guild_id, executor_id)
                    .await
                    .map(Some)
            })
            .await;

        let attribution = match fetched.value {
            Some(roles) => Attribution::Resolved(Executor::new(executor_id, roles)),
            None => {
                info!(
                    executor_id = %executor_id,
                    attempts = fetched.attempts,
                    "Executor roles unavailable"
                );
                Attribution::RolesUnavailable { executor_id }
            }
        };
        cache.insert(executor_id, attribution.clone());
        attribution
    }

    async fn enforce(
        &self,
        policy: &Policy,
        ctx: &EventContext,
        attribution: &Attribution,
        resolution: &AuditResolution,
        decision: EnforcementDecision,
    ) -> RoleReport {
        info!(
            role_id = %decision.role_id,
            executor_id = ?attribution.executor_id(),
            class = %decision.class,
            verdict = ?decision.verdict,
            reason = %decision.reason,
            "Role change evaluated"
        );

        let outcome = self
            .enforcer
            .enforce(policy, ctx, attribution, &decision)
            .await;

        RoleReport {
            role_id: decision.role_id,
            delta: decision.delta,
            executor_id: attribution.executor_id(),
            attempts: resolution.attempts,
            disposition: Disposition::Enforced { decision, outcome },
        }
    }
}

/// The engine's own user id: `configured` when set, otherwise asked from the
/// platform. Without it the engine would re-evaluate its own corrections.
pub async fn resolve_engine_user(
    configured: Option<MemberId>,
    gateway: &dyn MemberGateway,
) -> Result<MemberId, PlatformError> {
    if let Some(id) = configured {
        return Ok(id);
    }
    let id = gateway.fetch_current_user().await?;
    info!(engine_user_id = %id, "Engine user id discovered from platform");
    Ok(id)
}

fn engine_report(role_id: RoleId, delta: RoleDelta, resolution: &AuditResolution) -> RoleReport {
    debug!(role_id = %role_id, "Change made by the engine, skipped");
    RoleReport {
        role_id,
        delta,
        executor_id: resolution.executor_id,
        attempts: resolution.attempts,
        disposition: Disposition::EngineAction,
    }
}
