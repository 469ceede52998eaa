//! Lineage read models shared by the services and the views.
//!
//! # Responsibility
//! - Define the wire shapes of lineage trees, statistics and leader rollups.
//! - Own the single tier mapping used by both aggregation and display.
//!
//! # Invariants
//! - `LineageNode::count.spiritual_children == spiritual_children.len()`.
//! - `Tier` is derived from `total_downlines` only.

use crate::model::member::{Member, MemberId};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Stable wire error codes surfaced by the lineage services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    InvalidArgument,
    CycleDetected,
    UpstreamUnavailable,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Materialized child count, serialized as `_count.spiritualChildren`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildCount {
    #[serde(rename = "spiritualChildren")]
    pub spiritual_children: usize,
}

/// One member in a lineage tree response, with its materialized children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageNode {
    pub id: MemberId,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub church: String,
    pub membership_category: String,
    pub age_group: String,
    pub spiritual_children: Vec<LineageNode>,
    #[serde(rename = "_count")]
    pub count: ChildCount,
    /// Real children exist but were cut by the depth limit or the cycle guard.
    #[serde(default)]
    pub truncated: bool,
}

impl LineageNode {
    /// Creates a childless node from a member record.
    pub fn from_member(member: &Member) -> Self {
        Self {
            id: member.id.clone(),
            full_name: member.full_name.clone(),
            email: member.email.clone(),
            phone: member.phone.clone(),
            church: member.church.clone(),
            membership_category: member.membership_category.clone(),
            age_group: member.age_group.clone(),
            spiritual_children: Vec::new(),
            count: ChildCount::default(),
            truncated: false,
        }
    }

    /// Copy of this node's fields with no children attached.
    pub fn detached(&self) -> Self {
        Self {
            id: self.id.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            church: self.church.clone(),
            membership_category: self.membership_category.clone(),
            age_group: self.age_group.clone(),
            spiritual_children: Vec::new(),
            count: ChildCount::default(),
            truncated: self.truncated,
        }
    }

    /// Replaces the children and keeps `_count` in sync.
    pub fn set_children(&mut self, children: Vec<LineageNode>) {
        self.count.spiritual_children = children.len();
        self.spiritual_children = children;
    }

    /// Number of materialized direct children.
    pub fn direct_children_count(&self) -> usize {
        self.count.spiritual_children
    }

    /// Whether this node can be expanded in a view.
    pub fn has_children(&self) -> bool {
        self.direct_children_count() > 0
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self
            .spiritual_children
            .iter()
            .map(LineageNode::node_count)
            .sum::<usize>()
    }

    /// Longest edge count from this node down to a materialized leaf.
    pub fn height(&self) -> usize {
        self.spiritual_children
            .iter()
            .map(|child| child.height() + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Population rollup returned next to a lineage tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageStatistics {
    pub total_members: usize,
    /// Members with no parent, including orphans whose parent is gone.
    pub root_members: usize,
    pub members_with_spiritual_parents: usize,
    /// Deepest edge count present in the returned tree.
    pub max_depth: usize,
}

/// One repeated id found on a traversal path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// Node whose child list re-entered the current path.
    pub member_id: MemberId,
    /// Id that was already on the path.
    pub ancestor_id: MemberId,
}

/// Lineage tree response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageTree {
    pub family_tree: Vec<LineageNode>,
    pub statistics: LineageStatistics,
    /// Reported out of band as warnings, not part of `data`.
    #[serde(skip)]
    pub cycles: Vec<CycleReport>,
}

/// Leaderboard ranking tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "New Leader")]
    New,
    #[serde(rename = "Active Leader")]
    Active,
    #[serde(rename = "Team Leader")]
    Team,
    #[serde(rename = "Senior Leader")]
    Senior,
    #[serde(rename = "Master Leader")]
    Master,
}

impl Tier {
    /// Maps a downline total to its tier. Lower bounds are inclusive.
    pub fn from_downlines(total_downlines: usize) -> Self {
        match total_downlines {
            20.. => Self::Master,
            10..=19 => Self::Senior,
            5..=9 => Self::Team,
            2..=4 => Self::Active,
            _ => Self::New,
        }
    }

    /// Smallest downline total that reaches this tier.
    pub fn min_downlines(self) -> usize {
        match self {
            Self::New => 0,
            Self::Active => 2,
            Self::Team => 5,
            Self::Senior => 10,
            Self::Master => 20,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::New => "New Leader",
            Self::Active => "Active Leader",
            Self::Team => "Team Leader",
            Self::Senior => "Senior Leader",
            Self::Master => "Master Leader",
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-leader rollup for the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderSummary {
    pub id: MemberId,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub church: String,
    pub membership_category: String,
    pub age_group: String,
    pub direct_children: usize,
    /// All transitive descendants, unbounded depth.
    pub total_downlines: usize,
    pub tier: Tier,
}

impl LeaderSummary {
    pub fn from_member(member: &Member, direct_children: usize, total_downlines: usize) -> Self {
        Self {
            id: member.id.clone(),
            full_name: member.full_name.clone(),
            email: member.email.clone(),
            phone: member.phone.clone(),
            church: member.church.clone(),
            membership_category: member.membership_category.clone(),
            age_group: member.age_group.clone(),
            direct_children,
            total_downlines,
            tier: Tier::from_downlines(total_downlines),
        }
    }
}

/// Population rollup returned next to a leaderboard page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderStatistics {
    pub total_members: usize,
    pub root_members: usize,
    pub members_with_spiritual_parents: usize,
    pub total_leaders: usize,
    /// Full-depth forest depth, never capped.
    pub max_depth: usize,
}

/// Offset pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 1-indexed.
    pub page: u32,
    /// Applied limit after capping.
    pub limit: u32,
    pub total_count: usize,
    pub total_pages: usize,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total_count: usize) -> Self {
        let limit_items = limit.max(1) as usize;
        let total_pages = total_count.div_ceil(limit_items);
        Self {
            page,
            limit,
            total_count,
            total_pages,
            has_more: (page as usize) < total_pages,
        }
    }

    /// Index of the first item on this page.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.limit as usize)
    }
}

/// Leaderboard page payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderPage {
    pub spiritual_parents: Vec<LeaderSummary>,
    pub statistics: LeaderStatistics,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::{LineageNode, Pagination, Tier};
    use crate::model::member::Member;

    #[test]
    fn tier_boundaries_are_inclusive_lower_bounds() {
        assert_eq!(Tier::from_downlines(0), Tier::New);
        assert_eq!(Tier::from_downlines(1), Tier::New);
        assert_eq!(Tier::from_downlines(2), Tier::Active);
        assert_eq!(Tier::from_downlines(4), Tier::Active);
        assert_eq!(Tier::from_downlines(5), Tier::Team);
        assert_eq!(Tier::from_downlines(9), Tier::Team);
        assert_eq!(Tier::from_downlines(10), Tier::Senior);
        assert_eq!(Tier::from_downlines(19), Tier::Senior);
        assert_eq!(Tier::from_downlines(20), Tier::Master);

        for tier in [Tier::New, Tier::Active, Tier::Team, Tier::Senior, Tier::Master] {
            assert_eq!(Tier::from_downlines(tier.min_downlines()), tier);
        }
    }

    #[test]
    fn tier_serializes_as_display_label() {
        let json = serde_json::to_string(&Tier::Master).unwrap();
        assert_eq!(json, "\"Master Leader\"");
        let parsed: Tier = serde_json::from_str("\"Team Leader\"").unwrap();
        assert_eq!(parsed, Tier::Team);
    }

    #[test]
    fn node_serializes_count_under_underscore_key() {
        let mut parent = LineageNode::from_member(&Member::with_id("p", "Parent"));
        parent.set_children(vec![LineageNode::from_member(&Member::with_id("c", "Child"))]);

        let value = serde_json::to_value(&parent).unwrap();
        assert_eq!(value["_count"]["spiritualChildren"], 1);
        assert_eq!(value["spiritualChildren"][0]["id"], "c");
        assert_eq!(value["fullName"], "Parent");
    }

    #[test]
    fn pagination_reports_has_more_until_last_page() {
        let first = Pagination::new(1, 2, 5);
        assert_eq!(first.total_pages, 3);
        assert!(first.has_more);
        assert_eq!(first.offset(), 0);

        let last = Pagination::new(3, 2, 5);
        assert!(!last.has_more);
        assert_eq!(last.offset(), 4);
    }
}
