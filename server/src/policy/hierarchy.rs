//! Rank hierarchy and the junior/senior threshold comparison.

use std::collections::HashMap;

use rw_common::RoleId;

/// A rank resolved against the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank<'p> {
    pub name: &'p str,
    /// Seniority, 0 = least senior.
    pub index: usize,
}

/// Ordered ranks and the roles backing them.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    order: Vec<String>,
    index_by_name: HashMap<String, usize>,
    threshold: usize,
    role_by_rank: HashMap<String, RoleId>,
    rank_by_role: HashMap<RoleId, usize>,
}

impl Hierarchy {
    /// Build from a validated document. Unknown names must already be rejected.
    pub(super) fn new(
        order: Vec<String>,
        rank_roles: &HashMap<String, RoleId>,
        threshold_rank: &str,
    ) -> Self {
        let index_by_name: HashMap<String, usize> = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let threshold = index_by_name.get(threshold_rank).copied().unwrap_or(0);
        let rank_by_role = rank_roles
            .iter()
            .filter_map(|(name, role)| index_by_name.get(name).map(|i| (*role, *i)))
            .collect();

        Self {
            order,
            index_by_name,
            threshold,
            role_by_rank: rank_roles.clone(),
            rank_by_role,
        }
    }

    /// Index of the first senior rank.
    pub const fn threshold_index(&self) -> usize {
        self.threshold
    }

    /// Seniority of a rank name, `None` if the rank is unknown.
    pub fn rank_index_of(&self, rank_name: &str) -> Option<usize> {
        self.index_by_name.get(rank_name).copied()
    }

    /// `true` when the rank sits strictly below the threshold. Unknown ranks are never junior.
    pub fn is_junior(&self, rank_name: &str) -> bool {
        self.rank_index_of(rank_name)
            .is_some_and(|index| self.is_junior_index(index))
    }

    pub const fn is_junior_index(&self, index: usize) -> bool {
        index < self.threshold
    }

    /// The rank a role backs, if any.
    pub fn rank_of_role(&self, role_id: RoleId) -> Option<Rank<'_>> {
        let index = *self.rank_by_role.get(&role_id)?;
        Some(Rank {
            name: &self.order[index],
            index,
        })
    }

    /// The role backing a rank, if mapped.
    pub fn role_of_rank(&self, rank_name: &str) -> Option<RoleId> {
        self.role_by_rank.get(rank_name).copied()
    }
}
