//! Core domain logic for the spiritual lineage service.
//! This crate is the single source of truth for lineage invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod view;

pub use logging::{default_log_level, field_value, init_logging, LoggingError};
pub use model::lineage::{
    ChildCount, CycleReport, ErrorCode, LeaderPage, LeaderStatistics, LeaderSummary, LineageNode,
    LineageStatistics, LineageTree, Pagination, Tier,
};
pub use model::member::{Member, MemberId, MemberValidationError, NewMember};
pub use repo::member_repo::{
    MemberListQuery, MemberRepoError, MemberRepoResult, MemberRepository, PopulationCounts,
    SqliteMemberRepository,
};
pub use service::forest::{count_downlines, ForestIndex};
pub use service::leader_service::{
    rank_leaders, LeaderPageRequest, LeaderService, DEFAULT_LEADER_LIMIT, MAX_LEADER_LIMIT,
};
pub use service::lineage_service::{LineageQuery, LineageService, LineageServiceError};
pub use service::member_service::{
    ImportRejection, ImportReport, MemberService, MemberServiceError,
};
pub use view::cache::{CacheKey, LineageCache, NormalizedLineage};
pub use view::leaderboard::{LeaderboardState, TierStyle};
pub use view::org_chart::{
    CardPlacement, Connector, OrgChartLayout, OrgChartOptions, OrgChartState,
};
pub use view::tree_view::{filter_tree, TreeRow, TreeViewState};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
