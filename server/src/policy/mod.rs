//! Authorization policy.
//!
//! A [`Policy`] is an immutable, validated view over a [`PolicyDocument`].
//! One value is built per load and shared through [`PolicyStore`]; every
//! event works against the snapshot it took when processing started.

pub mod classify;
pub mod document;
pub mod hierarchy;
pub mod store;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use rw_common::{ChannelId, MemberId, RoleId};
use thiserror::Error;
use validator::Validate;

pub use classify::{ClassLabel, Classification, ManagedRole, SetClass, CLASS_PRECEDENCE};
pub use document::{AlertMentions, BlockedRole, MentionList, PolicyDocument};
pub use hierarchy::{Hierarchy, Rank};
pub use store::PolicyStore;

/// Policy loading errors.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Policy is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Policy failed validation: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("Policy store has no backing file to reload from")]
    NoSource,
}

/// Validated authorization policy.
#[derive(Debug, Clone)]
pub struct Policy {
    version: u32,
    hierarchy: Hierarchy,
    class_table: Vec<(SetClass, HashSet<RoleId>)>,
    blocked_roles: HashMap<RoleId, BlockedRole>,
    leadership_role_ids: HashSet<RoleId>,
    area_leader_role_ids: HashMap<RoleId, String>,
    recruitment_leader_role_ids: HashSet<RoleId>,
    entry_role_ids: HashSet<RoleId>,
    owner_ids: HashSet<MemberId>,
    bot_actor_role_ids: HashSet<RoleId>,
    system_actor_ids: HashSet<MemberId>,
    migration_global_role_id: Option<RoleId>,
    migration_fallback_role_id: Option<RoleId>,
    global_lead_role_id: Option<RoleId>,
    protected_role_id: Option<RoleId>,
    log_channel_id: ChannelId,
    log_exempt_executor_ids: HashSet<MemberId>,
    alert_mentions: AlertMentions,
}

impl Policy {
    /// Validate a document and build the policy from it.
    pub fn from_document(doc: PolicyDocument) -> Result<Self, PolicyError> {
        doc.validate()?;

        let hierarchy = Hierarchy::new(doc.hierarchy_order, &doc.rank_roles, &doc.threshold_rank);
        let migration_fallback_role_id = doc
            .migration_fallback_rank
            .as_deref()
            .and_then(|rank| hierarchy.role_of_rank(rank));

        let class_table = CLASS_PRECEDENCE
            .iter()
            .map(|class| {
                let ids = match class {
                    SetClass::Monitored => &doc.monitored_role_ids,
                    SetClass::Vip => &doc.vip_role_ids,
                    SetClass::Permission => &doc.permission_role_ids,
                    SetClass::Purchasable => &doc.purchasable_role_ids,
                };
                (*class, ids.iter().copied().collect())
            })
            .collect();

        Ok(Self {
            version: doc.version,
            hierarchy,
            class_table,
            blocked_roles: doc.blocked_roles,
            leadership_role_ids: doc.leadership_role_ids.into_iter().collect(),
            area_leader_role_ids: doc.area_leader_role_ids,
            recruitment_leader_role_ids: doc.recruitment_leader_role_ids.into_iter().collect(),
            entry_role_ids: doc.entry_role_ids.into_iter().collect(),
            owner_ids: doc.owner_ids.into_iter().collect(),
            bot_actor_role_ids: doc.bot_actor_role_ids.into_iter().collect(),
            system_actor_ids: doc.system_actor_ids.into_iter().collect(),
            migration_global_role_id: doc.migration_global_role_id,
            migration_fallback_role_id,
            global_lead_role_id: doc.global_lead_role_id,
            protected_role_id: doc.protected_role_id,
            log_channel_id: doc.log_channel_id,
            log_exempt_executor_ids: doc.log_exempt_executor_ids.into_iter().collect(),
            alert_mentions: doc.alert_mentions,
        })
    }

    /// Parse, validate and build from JSON text.
    pub fn from_json(raw: &str) -> Result<Self, PolicyError> {
        let doc: PolicyDocument = serde_json::from_str(raw)?;
        Self::from_document(doc)
    }

    /// Classify a role. Pure and stable for a given policy value.
    pub fn classify(&self, role_id: RoleId) -> Classification<'_> {
        for (class, ids) in &self.class_table {
            if ids.contains(&role_id) {
                return (*class).into();
            }
        }

        let rank = self.hierarchy.rank_of_role(role_id);
        let blocked = self.blocked_roles.get(&role_id);
        if rank.is_some() || blocked.is_some() {
            return Classification::Managed(ManagedRole { rank, blocked });
        }

        Classification::Unclassified
    }

    pub const fn version(&self) -> u32 {
        self.version
    }

    pub const fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub const fn threshold_index(&self) -> usize {
        self.hierarchy.threshold_index()
    }

    pub fn rank_index_of(&self, rank_name: &str) -> Option<usize> {
        self.hierarchy.rank_index_of(rank_name)
    }

    pub fn is_junior(&self, rank_name: &str) -> bool {
        self.hierarchy.is_junior(rank_name)
    }

    pub fn is_owner(&self, user_id: MemberId) -> bool {
        self.owner_ids.contains(&user_id)
    }

    pub fn is_system_actor(&self, user_id: MemberId) -> bool {
        self.system_actor_ids.contains(&user_id)
    }

    pub fn is_log_exempt(&self, user_id: MemberId) -> bool {
        self.log_exempt_executor_ids.contains(&user_id)
    }

    pub fn is_leadership_role(&self, role_id: RoleId) -> bool {
        self.leadership_role_ids.contains(&role_id)
    }

    /// Area name for an area leader role.
    pub fn area_of(&self, role_id: RoleId) -> Option<&str> {
        self.area_leader_role_ids.get(&role_id).map(String::as_str)
    }

    pub fn is_area_leader_role(&self, role_id: RoleId) -> bool {
        self.area_leader_role_ids.contains_key(&role_id)
    }

    /// Leadership and area leader roles both count as leadership-capable.
    pub fn is_leadership_capable_role(&self, role_id: RoleId) -> bool {
        self.is_leadership_role(role_id) || self.is_area_leader_role(role_id)
    }

    pub fn is_recruitment_leader_role(&self, role_id: RoleId) -> bool {
        self.recruitment_leader_role_ids.contains(&role_id)
    }

    pub fn is_entry_role(&self, role_id: RoleId) -> bool {
        self.entry_role_ids.contains(&role_id)
    }

    pub fn is_bot_actor_role(&self, role_id: RoleId) -> bool {
        self.bot_actor_role_ids.contains(&role_id)
    }

    pub const fn migration_global_role_id(&self) -> Option<RoleId> {
        self.migration_global_role_id
    }

    /// Role granted as compensation for a migration grant.
    pub const fn migration_fallback_role_id(&self) -> Option<RoleId> {
        self.migration_fallback_role_id
    }

    pub const fn global_lead_role_id(&self) -> Option<RoleId> {
        self.global_lead_role_id
    }

    pub const fn protected_role_id(&self) -> Option<RoleId> {
        self.protected_role_id
    }

    pub const fn log_channel_id(&self) -> ChannelId {
        self.log_channel_id
    }

    pub const fn alert_mentions(&self) -> &AlertMentions {
        &self.alert_mentions
    }
}
