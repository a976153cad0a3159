//! Applies enforcement decisions and reports them.

use std::sync::Arc;

use rw_common::RoleId;
use tracing::{debug, info, warn};

use super::message::{EnforcementAction, EventContext, LogMessage};
use crate::authz::{Attribution, EnforcementDecision, RoleDelta, Verdict};
use crate::platform::{LogSink, MemberGateway, MutationOutcome, PlatformError};
use crate::policy::Policy;

/// What happened for one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcementOutcome {
    pub action: EnforcementAction,
    /// Result of the platform mutation, if one was attempted.
    pub mutation: Option<Result<MutationOutcome, MutationFailed>>,
    pub logged: bool,
}

/// A role mutation the platform rejected. Logged, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationFailed;

/// Executes decisions against the platform and posts one log line each.
pub struct Enforcer {
    gateway: Arc<dyn MemberGateway>,
    sink: Arc<dyn LogSink>,
}

impl Enforcer {
    pub fn new(gateway: Arc<dyn MemberGateway>, sink: Arc<dyn LogSink>) -> Self {
        Self { gateway, sink }
    }

    /// Apply `decision` and emit its log message.
    ///
    /// Platform failures degrade to warnings; this never fails.
    pub async fn enforce(
        &self,
        policy: &Policy,
        ctx: &EventContext,
        attribution: &Attribution,
        decision: &EnforcementDecision,
    ) -> EnforcementOutcome {
        let (action, mutation) = match (decision.verdict, decision.delta) {
            (Verdict::Suppressed, _) => (EnforcementAction::Skipped, None),
            (Verdict::Allow, _) => match decision.fallback_role_id {
                Some(fallback) => {
                    let result = self.grant(ctx, fallback, decision).await;
                    (EnforcementAction::FallbackGranted, Some(result))
                }
                None => (EnforcementAction::None, None),
            },
            (Verdict::Deny, RoleDelta::Added) => {
                let result = self.revoke(ctx, decision.role_id, decision).await;
                (EnforcementAction::Reverted, Some(result))
            }
            (Verdict::Deny, RoleDelta::Removed) => {
                let result = self.grant(ctx, decision.role_id, decision).await;
                (EnforcementAction::Restored, Some(result))
            }
        };

        let logged = if should_log(decision, action) {
            let exempt = attribution
                .executor_id()
                .is_some_and(|id| policy.is_log_exempt(id));
            if exempt {
                debug!(
                    event_id = %ctx.event_id,
                    role_id = %decision.role_id,
                    "Executor is log-exempt, not posting"
                );
                false
            } else {
                let message = LogMessage::new(
                    policy,
                    ctx,
                    attribution,
                    decision,
                    action,
                    matches!(mutation, Some(Err(_))),
                );
                self.notify(policy, &message).await
            }
        } else {
            false
        };

        EnforcementOutcome {
            action,
            mutation,
            logged,
        }
    }

    async fn grant(
        &self,
        ctx: &EventContext,
        role_id: RoleId,
        decision: &EnforcementDecision,
    ) -> Result<MutationOutcome, MutationFailed> {
        let reason = audit_reason(decision);
        let result = self
            .gateway
            .add_role(ctx.guild_id, ctx.member_id, role_id, &reason)
            .await;
        report_mutation(ctx, role_id, "add", result)
    }

    async fn revoke(
        &self,
        ctx: &EventContext,
        role_id: RoleId,
        decision: &EnforcementDecision,
    ) -> Result<MutationOutcome, MutationFailed> {
        let reason = audit_reason(decision);
        let result = self
            .gateway
            .remove_role(ctx.guild_id, ctx.member_id, role_id, &reason)
            .await;
        report_mutation(ctx, role_id, "remove", result)
    }

    /// Post `message` to the log channel. Returns whether it was delivered.
    async fn notify(&self, policy: &Policy, message: &LogMessage) -> bool {
        match self.sink.send_log(policy.log_channel_id(), message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    event_id = %message.event_id,
                    role_id = %message.role_id,
                    error = %e,
                    "Failed to post enforcement log"
                );
                false
            }
        }
    }
}

/// Allowed grants that changed nothing stay silent unless the class is one
/// that is always reported.
fn should_log(decision: &EnforcementDecision, action: EnforcementAction) -> bool {
    match action {
        EnforcementAction::None => decision.class.is_informational(),
        _ => true,
    }
}

fn audit_reason(decision: &EnforcementDecision) -> String {
    format!("Role integrity: {}", decision.reason.description())
}

fn report_mutation(
    ctx: &EventContext,
    role_id: RoleId,
    op: &'static str,
    result: Result<MutationOutcome, PlatformError>,
) -> Result<MutationOutcome, MutationFailed> {
    match result {
        Ok(outcome) => {
            info!(
                event_id = %ctx.event_id,
                member_id = %ctx.member_id,
                role_id = %role_id,
                op,
                already_in_state = outcome == MutationOutcome::AlreadyInState,
                "Role mutation applied"
            );
            Ok(outcome)
        }
        Err(e) => {
            warn!(
                event_id = %ctx.event_id,
                member_id = %ctx.member_id,
                role_id = %role_id,
                op,
                error = %e,
                "Role mutation failed"
            );
            Err(MutationFailed)
        }
    }
}
