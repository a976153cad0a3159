//! Reusable test helpers for integration tests.
//!
//! Provides [`FakePlatform`], an in-memory implementation of every platform
//! trait, a [`Harness`] wiring it to a real [`Reconciler`], and [`TestApp`]
//! for driving the axum router with `tower::ServiceExt::oneshot`.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use rw_common::{ChannelId, GuildId, MemberId, RoleId, Snowflake};
use rw_server::api::{create_router, AppState};
use rw_server::audit::{AuditResolver, BackoffSchedule, DEFAULT_MAX_ENTRY_AGE_SECS};
use rw_server::config::Config;
use rw_server::enforce::{Enforcer, LogMessage};
use rw_server::engine::{
    event_queue, resolve_engine_user, MemberUpdate, Reconciler, RoleChangeEvent,
};
use rw_server::platform::{
    AuditActionType, AuditEntry, AuditTrail, LogSink, MemberGateway, MutationOutcome,
    PlatformError,
};
use rw_server::policy::{Policy, PolicyStore};
use tokio::sync::mpsc;
use tower::ServiceExt;

// ============================================================================
// Identities used across scenarios
// ============================================================================

pub const GUILD: GuildId = GuildId::new(10);
/// Member whose roles change in every scenario.
pub const TARGET: MemberId = MemberId::new(20);

pub const OWNER: MemberId = MemberId::new(1);
pub const LOG_EXEMPT: MemberId = MemberId::new(6);
pub const REGULAR: MemberId = MemberId::new(77);
pub const LEADER: MemberId = MemberId::new(78);
pub const AREA_LEADER: MemberId = MemberId::new(79);
pub const SHOP_BOT: MemberId = MemberId::new(80);
pub const MIGRATOR: MemberId = MemberId::new(81);
pub const ENGINE: MemberId = MemberId::new(999);

pub const LOG_CHANNEL: ChannelId = ChannelId::new(900);

/// Ranks: recruit(100) < member(101) < sergeant(102, threshold) < officer(103) < commander(104)
pub const POLICY_JSON: &str = r#"{
    "version": 7,
    "hierarchy_order": ["recruit", "member", "sergeant", "officer", "commander"],
    "rank_roles": {
        "recruit": "100",
        "member": "101",
        "sergeant": "102",
        "officer": "103",
        "commander": "104"
    },
    "threshold_rank": "sergeant",
    "blocked_roles": {
        "200": { "display_name": "Event Host", "allowed_leader_roles": ["310"] },
        "210": { "display_name": "Staff" }
    },
    "leadership_role_ids": ["300"],
    "area_leader_role_ids": { "301": "Operations" },
    "recruitment_leader_role_ids": ["302"],
    "entry_role_ids": ["210"],
    "owner_ids": ["1"],
    "bot_actor_role_ids": ["320"],
    "migration_global_role_id": "330",
    "migration_fallback_rank": "recruit",
    "global_lead_role_id": "104",
    "protected_role_id": "400",
    "purchasable_role_ids": ["500"],
    "vip_role_ids": ["510"],
    "permission_role_ids": ["520"],
    "monitored_role_ids": ["530"],
    "log_channel_id": "900",
    "log_exempt_executor_ids": ["6"],
    "alert_mentions": {
        "purchasable": { "roles": ["910"] },
        "blocked": { "users": ["1"] }
    }
}"#;

pub fn roles(ids: &[u64]) -> Vec<RoleId> {
    ids.iter().copied().map(RoleId::new).collect()
}

pub fn test_policy() -> Policy {
    Policy::from_json(POLICY_JSON).expect("test policy is valid")
}

// ============================================================================
// Fake platform
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Add(MemberId, RoleId),
    Remove(MemberId, RoleId),
}

/// In-memory platform. Member role sets are tracked so mutations are
/// idempotent the same way the real platform's are.
#[derive(Default)]
pub struct FakePlatform {
    audit: Mutex<Vec<AuditEntry>>,
    /// Audit queries answered with an empty page before entries appear.
    audit_lag: AtomicU32,
    pub audit_calls: AtomicU32,
    members: Mutex<HashMap<MemberId, HashSet<RoleId>>>,
    pub member_fetches: AtomicU32,
    mutations: Mutex<Vec<Mutation>>,
    logs: Mutex<Vec<(ChannelId, LogMessage)>>,
    failing_roles: Mutex<HashSet<RoleId>>,
    panic_member: Mutex<Option<MemberId>>,
    next_entry_id: AtomicU32,
}

impl FakePlatform {
    pub fn new() -> Self {
        let platform = Self::default();
        platform.with_member(OWNER, &[]);
        platform.with_member(LOG_EXEMPT, &[]);
        platform.with_member(REGULAR, &[]);
        platform.with_member(LEADER, &[300]);
        platform.with_member(AREA_LEADER, &[301]);
        platform.with_member(SHOP_BOT, &[320]);
        platform.with_member(MIGRATOR, &[330]);
        platform.with_member(ENGINE, &[]);
        platform
    }

    pub fn with_member(&self, member: MemberId, role_ids: &[u64]) {
        self.members
            .lock()
            .unwrap()
            .insert(member, roles(role_ids).into_iter().collect());
    }

    pub fn member_roles(&self, member: MemberId) -> HashSet<RoleId> {
        self.members
            .lock()
            .unwrap()
            .get(&member)
            .cloned()
            .unwrap_or_default()
    }

    /// Record that `executor` changed `target`'s roles at `at`.
    pub fn record_change(
        &self,
        executor: MemberId,
        target: MemberId,
        added: &[u64],
        removed: &[u64],
        at: DateTime<Utc>,
    ) {
        let seq = self.next_entry_id.fetch_add(1, Ordering::SeqCst);
        let id = Snowflake(Snowflake::from_timestamp(at).0 + u64::from(seq));
        self.audit.lock().unwrap().push(AuditEntry {
            id,
            target_id: Some(target),
            executor_id: Some(executor),
            added_role_ids: roles(added),
            removed_role_ids: roles(removed),
            created_at: at,
        });
    }

    pub fn set_audit_lag(&self, empty_pages: u32) {
        self.audit_lag.store(empty_pages, Ordering::SeqCst);
    }

    pub fn fail_mutations_for(&self, role: u64) {
        self.failing_roles.lock().unwrap().insert(RoleId::new(role));
    }

    /// Any mutation on `member` panics.
    pub fn panic_on(&self, member: MemberId) {
        *self.panic_member.lock().unwrap() = Some(member);
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn logs(&self) -> Vec<LogMessage> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn log_channels(&self) -> Vec<ChannelId> {
        self.logs.lock().unwrap().iter().map(|(c, _)| *c).collect()
    }

    fn mutate(
        &self,
        mutation: Mutation,
        member: MemberId,
        role: RoleId,
    ) -> Result<MutationOutcome, PlatformError> {
        if *self.panic_member.lock().unwrap() == Some(member) {
            panic!("simulated platform bug for member {member}");
        }
        let adding = matches!(mutation, Mutation::Add(..));
        self.mutations.lock().unwrap().push(mutation);

        if self.failing_roles.lock().unwrap().contains(&role) {
            return Err(PlatformError::Status {
                status: 403,
                message: "Missing Permissions".into(),
            });
        }

        let mut members = self.members.lock().unwrap();
        let held = members.entry(member).or_default();
        let changed = if adding {
            held.insert(role)
        } else {
            held.remove(&role)
        };
        Ok(if changed {
            MutationOutcome::Applied
        } else {
            MutationOutcome::AlreadyInState
        })
    }
}

#[async_trait]
impl AuditTrail for FakePlatform {
    async fn query_recent_actions(
        &self,
        _guild_id: GuildId,
        _action_type: AuditActionType,
        limit: u8,
    ) -> Result<Vec<AuditEntry>, PlatformError> {
        let call = self.audit_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.audit_lag.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        let audit = self.audit.lock().unwrap();
        Ok(audit
            .iter()
            .rev()
            .take(usize::from(limit))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MemberGateway for FakePlatform {
    async fn fetch_current_user(&self) -> Result<MemberId, PlatformError> {
        Ok(ENGINE)
    }

    async fn fetch_member_roles(
        &self,
        _guild_id: GuildId,
        member_id: MemberId,
    ) -> Result<Vec<RoleId>, PlatformError> {
        self.member_fetches.fetch_add(1, Ordering::SeqCst);
        self.members
            .lock()
            .unwrap()
            .get(&member_id)
            .map(|held| held.iter().copied().collect())
            .ok_or(PlatformError::MemberNotFound)
    }

    async fn add_role(
        &self,
        _guild_id: GuildId,
        member_id: MemberId,
        role_id: RoleId,
        _reason: &str,
    ) -> Result<MutationOutcome, PlatformError> {
        self.mutate(Mutation::Add(member_id, role_id), member_id, role_id)
    }

    async fn remove_role(
        &self,
        _guild_id: GuildId,
        member_id: MemberId,
        role_id: RoleId,
        _reason: &str,
    ) -> Result<MutationOutcome, PlatformError> {
        self.mutate(Mutation::Remove(member_id, role_id), member_id, role_id)
    }
}

#[async_trait]
impl LogSink for FakePlatform {
    async fn send_log(
        &self,
        channel_id: ChannelId,
        message: &LogMessage,
    ) -> Result<(), PlatformError> {
        self.logs
            .lock()
            .unwrap()
            .push((channel_id, message.clone()));
        Ok(())
    }
}

// ============================================================================
// Reconciler harness
// ============================================================================

pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub policies: Arc<PolicyStore>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_platform(FakePlatform::new())
    }

    pub fn with_platform(platform: FakePlatform) -> Self {
        Self::build(Arc::new(platform), ENGINE)
    }

    /// Wire the reconciler the way startup does without `ENGINE_USER_ID`:
    /// the engine's id is read from the platform.
    pub async fn with_discovered_engine() -> Self {
        let platform = Arc::new(FakePlatform::new());
        let engine = resolve_engine_user(None, &*platform)
            .await
            .expect("fake platform reports its user");
        Self::build(platform, engine)
    }

    fn build(platform: Arc<FakePlatform>, engine_user_id: MemberId) -> Self {
        let policies = Arc::new(PolicyStore::from_policy(test_policy()));
        let resolver = AuditResolver::new(
            platform.clone(),
            BackoffSchedule::default(),
            25,
            Duration::from_secs(DEFAULT_MAX_ENTRY_AGE_SECS),
        );
        let enforcer = Enforcer::new(platform.clone(), platform.clone());
        let reconciler = Arc::new(Reconciler::new(
            policies.clone(),
            resolver,
            platform.clone(),
            enforcer,
            engine_user_id,
        ));
        Self {
            platform,
            policies,
            reconciler,
        }
    }

    /// Apply a role change to `TARGET` and build the event the platform would
    /// deliver for it. `executor` is recorded in the audit trail when given.
    pub fn change(
        &self,
        executor: Option<MemberId>,
        before: &[u64],
        after: &[u64],
    ) -> RoleChangeEvent {
        let now = Utc::now();
        self.platform.with_member(TARGET, after);

        let update = MemberUpdate {
            guild_id: GUILD,
            member_id: TARGET,
            roles_before: roles(before),
            roles_after: roles(after),
            audit_action_type: None,
        };
        let event = RoleChangeEvent::from_update(update, now);

        if let Some(executor) = executor {
            let added: Vec<u64> = event.added_role_ids.iter().map(|r| r.get()).collect();
            let removed: Vec<u64> = event.removed_role_ids.iter().map(|r| r.get()).collect();
            self.platform.record_change(
                executor,
                TARGET,
                &added,
                &removed,
                now - chrono::Duration::milliseconds(200),
            );
        }
        event
    }
}

// ============================================================================
// HTTP app
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub policies: Arc<PolicyStore>,
    pub events: mpsc::Receiver<RoleChangeEvent>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(
            Config::default_for_test(),
            PolicyStore::from_policy(test_policy()),
        )
    }

    pub fn with_config(config: Config, policies: PolicyStore) -> Self {
        let (tx, rx) = event_queue(config.event_queue_capacity);
        let policies = Arc::new(policies);
        let state = AppState::new(config, policies.clone(), tx);
        Self {
            router: create_router(state),
            policies,
            events: rx,
        }
    }

    pub async fn request(&self, req: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(req)
            .await
            .expect("router is infallible")
    }
}

pub fn json_request(method: Method, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

pub fn empty_request(method: Method, uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("valid request")
}

pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}
