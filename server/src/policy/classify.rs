//! Role classification.
//!
//! A role id maps to exactly one [`Classification`]. Precedence is fixed by
//! the order of [`CLASS_PRECEDENCE`], followed by the managed (blocked or
//! hierarchy) check; anything else is unclassified and ignored.

use serde::Serialize;

use super::document::BlockedRole;
use super::hierarchy::Rank;

/// Set-backed classes in precedence order.
pub const CLASS_PRECEDENCE: [SetClass; 4] = [
    SetClass::Monitored,
    SetClass::Vip,
    SetClass::Permission,
    SetClass::Purchasable,
];

/// Classes decided by plain membership in a policy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetClass {
    Monitored,
    Vip,
    Permission,
    Purchasable,
}

/// Policy class of a single role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'p> {
    /// Display-only; logged, never reverted.
    Monitored,
    /// Informational trip-wire; logged, never reverted.
    Vip,
    /// Informational trip-wire; logged, never reverted.
    Permission,
    /// Only owners and bot actors may grant.
    Purchasable,
    /// Hierarchy rank, named blocked role, or both.
    Managed(ManagedRole<'p>),
    /// Not governed by policy.
    Unclassified,
}

/// A role governed by hierarchy rules and/or a blocked-role entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedRole<'p> {
    pub rank: Option<Rank<'p>>,
    pub blocked: Option<&'p BlockedRole>,
}

impl From<SetClass> for Classification<'_> {
    fn from(class: SetClass) -> Self {
        match class {
            SetClass::Monitored => Self::Monitored,
            SetClass::Vip => Self::Vip,
            SetClass::Permission => Self::Permission,
            SetClass::Purchasable => Self::Purchasable,
        }
    }
}

impl<'p> Classification<'p> {
    /// Label used in decisions and log messages. `None` for unclassified roles.
    pub fn label(&self) -> Option<ClassLabel> {
        Some(match self {
            Self::Monitored => ClassLabel::Monitored,
            Self::Vip => ClassLabel::Vip,
            Self::Permission => ClassLabel::Permission,
            Self::Purchasable => ClassLabel::Purchasable,
            Self::Managed(ManagedRole {
                blocked: Some(_), ..
            }) => ClassLabel::Blocked,
            Self::Managed(_) => ClassLabel::Hierarchy,
            Self::Unclassified => return None,
        })
    }

    /// Human-readable name for the role, when policy knows one.
    pub fn role_name(&self) -> Option<&'p str> {
        match self {
            Self::Managed(ManagedRole {
                blocked: Some(blocked),
                ..
            }) => Some(blocked.display_name.as_str()),
            Self::Managed(ManagedRole {
                rank: Some(rank), ..
            }) => Some(rank.name),
            _ => None,
        }
    }
}

/// Serializable class tag carried by decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassLabel {
    Monitored,
    Vip,
    Permission,
    Purchasable,
    Hierarchy,
    Blocked,
    Protected,
}

impl ClassLabel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monitored => "monitored",
            Self::Vip => "vip",
            Self::Permission => "permission",
            Self::Purchasable => "purchasable",
            Self::Hierarchy => "hierarchy",
            Self::Blocked => "blocked",
            Self::Protected => "protected",
        }
    }

    /// Classes that are reported on every grant, never enforced.
    pub const fn is_informational(self) -> bool {
        matches!(self, Self::Monitored | Self::Vip | Self::Permission)
    }
}

impl std::fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
