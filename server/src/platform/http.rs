//! REST adapter for the chat platform.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rw_common::{ChannelId, GuildId, MemberId, RoleId, Snowflake};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    AuditActionType, AuditEntry, AuditTrail, LogSink, MemberGateway, MutationOutcome,
    PlatformError,
};
use crate::authz::Verdict;
use crate::enforce::LogMessage;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Platform REST client implementing every platform trait.
#[derive(Clone)]
pub struct HttpPlatform {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpPlatform {
    pub fn new(base_url: &str, token: &str) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("rw-server/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn mutate_role(
        &self,
        method: reqwest::Method,
        guild_id: GuildId,
        member_id: MemberId,
        role_id: RoleId,
        reason: &str,
    ) -> Result<Response, PlatformError> {
        let url = self.url(&format!(
            "/guilds/{guild_id}/members/{member_id}/roles/{role_id}"
        ));
        let resp = self
            .client
            .request(method, url)
            .header("Authorization", self.auth())
            .header("X-Audit-Log-Reason", reason)
            .send()
            .await?;
        Ok(resp)
    }
}

#[derive(Debug, Deserialize)]
struct AuditLogResponse {
    #[serde(default)]
    audit_log_entries: Vec<RawAuditEntry>,
}

#[derive(Debug, Deserialize)]
struct RawAuditEntry {
    id: Snowflake,
    #[serde(default)]
    user_id: Option<MemberId>,
    #[serde(default)]
    target_id: Option<MemberId>,
    #[serde(default)]
    changes: Vec<RawChange>,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    key: String,
    #[serde(default)]
    new_value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PartialRole {
    id: RoleId,
}

#[derive(Debug, Deserialize)]
struct MemberResponse {
    #[serde(default)]
    roles: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
struct CurrentUserResponse {
    id: MemberId,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

impl RawAuditEntry {
    fn into_entry(self) -> AuditEntry {
        let mut added_role_ids = Vec::new();
        let mut removed_role_ids = Vec::new();

        for change in self.changes {
            let target = match change.key.as_str() {
                "$add" => &mut added_role_ids,
                "$remove" => &mut removed_role_ids,
                _ => continue,
            };
            let Some(value) = change.new_value else {
                continue;
            };
            match serde_json::from_value::<Vec<PartialRole>>(value) {
                Ok(roles) => target.extend(roles.into_iter().map(|r| r.id)),
                Err(e) => debug!(entry_id = %self.id, error = %e, "Skipping malformed role change"),
            }
        }

        AuditEntry {
            id: self.id,
            target_id: self.target_id,
            executor_id: self.user_id,
            added_role_ids,
            removed_role_ids,
            created_at: self.id.timestamp(),
        }
    }
}

/// Decode an audit log response body into entries.
pub fn parse_audit_log(body: &str) -> Result<Vec<AuditEntry>, PlatformError> {
    let parsed: AuditLogResponse =
        serde_json::from_str(body).map_err(|e| PlatformError::Decode(e.to_string()))?;
    Ok(parsed
        .audit_log_entries
        .into_iter()
        .map(RawAuditEntry::into_entry)
        .collect())
}

/// Map a non-success response to an error; pass successes through.
async fn check_status(resp: Response) -> Result<Response, PlatformError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let header_hint = resp
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());
        let body_hint = resp
            .json::<RateLimitBody>()
            .await
            .ok()
            .map(|b| b.retry_after);
        let retry_after = body_hint
            .or(header_hint)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(DEFAULT_RETRY_AFTER);
        return Err(PlatformError::RateLimited { retry_after });
    }

    let message = resp.text().await.unwrap_or_default();
    Err(PlatformError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Render a log message as a channel message with one embed.
///
/// Only the ids listed in the message's mentions may ping anyone.
pub fn render_log_payload(message: &LogMessage) -> Value {
    let color = match message.verdict {
        Verdict::Allow => 0x2ECC71,
        Verdict::Deny => 0xE74C3C,
        Verdict::Suppressed => 0xF1C40F,
    };

    let role = message.role_name.as_ref().map_or_else(
        || format!("<@&{}>", message.role_id),
        |name| format!("<@&{}> ({name})", message.role_id),
    );

    let mut fields = vec![
        json!({ "name": "Member", "value": format!("<@{}>", message.member_id), "inline": true }),
        json!({ "name": "Executor", "value": message.executor_label(), "inline": true }),
        json!({ "name": "Role", "value": role, "inline": true }),
        json!({ "name": "Class", "value": message.class.as_str(), "inline": true }),
        json!({ "name": "Action", "value": message.action.as_str(), "inline": true }),
        json!({ "name": "Reason", "value": message.reason.description(), "inline": false }),
    ];
    if let Some(area) = &message.executor_area {
        fields.push(json!({ "name": "Executor area", "value": area, "inline": true }));
    }
    if let Some(fallback) = message.fallback_role_id {
        fields.push(json!({ "name": "Fallback rank", "value": format!("<@&{fallback}>"), "inline": true }));
    }
    if message.action_failed {
        fields.push(json!({ "name": "Note", "value": "The platform rejected this action", "inline": false }));
    }

    let content = message
        .mentions
        .roles
        .iter()
        .map(|r| format!("<@&{r}>"))
        .chain(message.mentions.users.iter().map(|u| format!("<@{u}>")))
        .collect::<Vec<_>>()
        .join(" ");

    json!({
        "content": content,
        "embeds": [{
            "title": message.title(),
            "color": color,
            "fields": fields,
            "timestamp": message.timestamp.to_rfc3339(),
            "footer": { "text": format!("event {} | {}", message.event_id, message.reason.as_str()) },
        }],
        "allowed_mentions": {
            "parse": [],
            "roles": message.mentions.roles,
            "users": message.mentions.users,
        },
    })
}

#[async_trait]
impl AuditTrail for HttpPlatform {
    async fn query_recent_actions(
        &self,
        guild_id: GuildId,
        action_type: AuditActionType,
        limit: u8,
    ) -> Result<Vec<AuditEntry>, PlatformError> {
        let resp = self
            .client
            .get(self.url(&format!("/guilds/{guild_id}/audit-logs")))
            .header("Authorization", self.auth())
            .query(&[("action_type", action_type.0), ("limit", limit)])
            .send()
            .await?;
        let body = check_status(resp).await?.text().await?;
        parse_audit_log(&body)
    }
}

#[async_trait]
impl MemberGateway for HttpPlatform {
    async fn fetch_current_user(&self) -> Result<MemberId, PlatformError> {
        let resp = self
            .client
            .get(self.url("/users/@me"))
            .header("Authorization", self.auth())
            .send()
            .await?;
        let user: CurrentUserResponse = check_status(resp).await?.json().await?;
        Ok(user.id)
    }

    async fn fetch_member_roles(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
    ) -> Result<Vec<RoleId>, PlatformError> {
        let resp = self
            .client
            .get(self.url(&format!("/guilds/{guild_id}/members/{member_id}")))
            .header("Authorization", self.auth())
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(PlatformError::MemberNotFound);
        }
        let member: MemberResponse = check_status(resp).await?.json().await?;
        Ok(member.roles)
    }

    async fn add_role(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
        role_id: RoleId,
        reason: &str,
    ) -> Result<MutationOutcome, PlatformError> {
        let resp = self
            .mutate_role(reqwest::Method::PUT, guild_id, member_id, role_id, reason)
            .await?;
        check_status(resp).await?;
        Ok(MutationOutcome::Applied)
    }

    async fn remove_role(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
        role_id: RoleId,
        reason: &str,
    ) -> Result<MutationOutcome, PlatformError> {
        let resp = self
            .mutate_role(reqwest::Method::DELETE, guild_id, member_id, role_id, reason)
            .await?;
        // Member left or role already gone
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(MutationOutcome::AlreadyInState);
        }
        check_status(resp).await?;
        Ok(MutationOutcome::Applied)
    }
}

#[async_trait]
impl LogSink for HttpPlatform {
    async fn send_log(
        &self,
        channel_id: ChannelId,
        message: &LogMessage,
    ) -> Result<(), PlatformError> {
        let resp = self
            .client
            .post(self.url(&format!("/channels/{channel_id}/messages")))
            .header("Authorization", self.auth())
            .json(&render_log_payload(message))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}
