//! Structured enforcement log message.

use chrono::{DateTime, Utc};
use rw_common::{GuildId, MemberId, RoleId};
use serde::Serialize;
use uuid::Uuid;

use crate::authz::{Attribution, EnforcementDecision, ReasonCode, Verdict};
use crate::policy::{ClassLabel, MentionList, Policy};

/// What the enforcer did about a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementAction {
    /// Allowed; nothing changed on the member.
    None,
    /// Allowed, and the compensating rank role was granted.
    FallbackGranted,
    /// Denied grant; the role was removed again.
    Reverted,
    /// Denied removal; the role was added back.
    Restored,
    /// Executor unknown; enforcement skipped.
    Skipped,
}

impl EnforcementAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FallbackGranted => "fallback_granted",
            Self::Reverted => "reverted",
            Self::Restored => "restored",
            Self::Skipped => "skipped",
        }
    }
}

/// Identifies the event a decision belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventContext {
    pub event_id: Uuid,
    pub guild_id: GuildId,
    pub member_id: MemberId,
}

/// One log entry per enforcement event, posted to the policy's log channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogMessage {
    pub event_id: Uuid,
    pub guild_id: GuildId,
    pub member_id: MemberId,
    /// `None` renders as "unknown".
    pub executor_id: Option<MemberId>,
    /// Areas the executor leads, comma separated.
    pub executor_area: Option<String>,
    pub role_id: RoleId,
    pub role_name: Option<String>,
    pub class: ClassLabel,
    pub verdict: Verdict,
    pub action: EnforcementAction,
    /// The platform rejected the mutation this message reports.
    pub action_failed: bool,
    pub reason: ReasonCode,
    pub fallback_role_id: Option<RoleId>,
    pub mentions: MentionList,
    pub timestamp: DateTime<Utc>,
}

impl LogMessage {
    /// Build the message for `decision`, attaching the alert mentions policy
    /// configures for purchasable and blocked denials.
    pub fn new(
        policy: &Policy,
        ctx: &EventContext,
        attribution: &Attribution,
        decision: &EnforcementDecision,
        action: EnforcementAction,
        action_failed: bool,
    ) -> Self {
        let mentions = match (decision.verdict, decision.class) {
            (Verdict::Deny, ClassLabel::Purchasable) => policy.alert_mentions().purchasable.clone(),
            (Verdict::Deny, ClassLabel::Blocked) => policy.alert_mentions().blocked.clone(),
            _ => MentionList::default(),
        };

        Self {
            event_id: ctx.event_id,
            guild_id: ctx.guild_id,
            member_id: ctx.member_id,
            executor_id: attribution.executor_id(),
            executor_area: executor_area(policy, attribution),
            role_id: decision.role_id,
            role_name: decision.role_name.clone(),
            class: decision.class,
            verdict: decision.verdict,
            action,
            action_failed,
            reason: decision.reason,
            fallback_role_id: decision.fallback_role_id,
            mentions,
            timestamp: Utc::now(),
        }
    }

    /// Executor as shown to humans.
    pub fn executor_label(&self) -> String {
        self.executor_id
            .map_or_else(|| "unknown".to_owned(), |id| format!("<@{id}>"))
    }

    /// Short headline for the message.
    pub const fn title(&self) -> &'static str {
        match (self.verdict, self.action) {
            (_, EnforcementAction::Restored) => "Protected role restored",
            (_, EnforcementAction::Reverted) => "Unauthorized role grant reverted",
            (_, EnforcementAction::FallbackGranted) => "Role granted with fallback rank",
            (Verdict::Suppressed, _) => "Role change could not be verified",
            (Verdict::Deny, _) => "Unauthorized role change",
            (Verdict::Allow, _) => "Role change recorded",
        }
    }
}

fn executor_area(policy: &Policy, attribution: &Attribution) -> Option<String> {
    let Attribution::Resolved(executor) = attribution else {
        return None;
    };
    let mut areas: Vec<&str> = executor
        .roles
        .iter()
        .filter_map(|role| policy.area_of(*role))
        .collect();
    areas.sort_unstable();
    areas.dedup();
    (!areas.is_empty()).then(|| areas.join(", "))
}
