//! Leaderboard aggregation service.
//!
//! # Responsibility
//! - Roll up direct children and full-depth downlines per leader.
//! - Rank leaders and serve them in deterministic offset pages.
//!
//! # Invariants
//! - A leader has at least one active direct child.
//! - Downlines are always counted at unbounded depth.
//! - Order is `total_downlines DESC, full_name ASC, id ASC`.

use crate::model::lineage::{LeaderPage, LeaderStatistics, LeaderSummary, Pagination};
use crate::repo::member_repo::MemberRepository;
use crate::service::forest::ForestIndex;
use crate::service::lineage_service::LineageServiceError;
use log::{info, warn};
use std::cmp::Ordering;
use std::time::Instant;

/// Page size applied when the caller does not send one.
pub const DEFAULT_LEADER_LIMIT: u32 = 12;
/// Largest page size served; bigger requests are capped.
pub const MAX_LEADER_LIMIT: u32 = 100;

/// Raw leaderboard page request.
///
/// Signed so that zero and negative inputs can be rejected explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderPageRequest {
    /// 1-indexed.
    pub page: i64,
    pub limit: i64,
}

impl LeaderPageRequest {
    pub fn new(page: i64, limit: i64) -> Self {
        Self { page, limit }
    }

    /// Parses raw query-string values; absent values take defaults.
    pub fn parse(
        page: Option<&str>,
        limit: Option<&str>,
        default_limit: u32,
    ) -> Result<Self, LineageServiceError> {
        Ok(Self {
            page: parse_integer("page", page)?.unwrap_or(1),
            limit: parse_integer("limit", limit)?.unwrap_or(i64::from(default_limit)),
        })
    }
}

fn parse_integer(name: &str, raw: Option<&str>) -> Result<Option<i64>, LineageServiceError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse::<i64>().map(Some).map_err(|_| {
            LineageServiceError::InvalidArgument(format!(
                "{name} must be an integer, got `{value}`"
            ))
        }),
    }
}

/// Leaderboard service facade.
pub struct LeaderService<R: MemberRepository> {
    repo: R,
    max_limit: u32,
}

impl<R: MemberRepository> LeaderService<R> {
    /// Creates service with the default page size cap.
    pub fn new(repo: R) -> Self {
        Self::with_max_limit(repo, MAX_LEADER_LIMIT)
    }

    pub fn with_max_limit(repo: R, max_limit: u32) -> Self {
        Self {
            repo,
            max_limit: max_limit.max(1),
        }
    }

    /// Returns one page of ranked leaders plus population statistics.
    pub fn leaders(&self, request: &LeaderPageRequest) -> Result<LeaderPage, LineageServiceError> {
        let started_at = Instant::now();
        let result = self.build_page(request);
        match &result {
            Ok(page) => info!(
                "event=lineage_leaders module=service status=ok page={} limit={} returned={} total_leaders={} duration_ms={}",
                page.pagination.page,
                page.pagination.limit,
                page.spiritual_parents.len(),
                page.pagination.total_count,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=lineage_leaders module=service status=error error_code={} duration_ms={}",
                err.code(),
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    /// Every leader in ranking order, unpaginated.
    pub fn ranked_leaders(&self) -> Result<Vec<LeaderSummary>, LineageServiceError> {
        let snapshot = self.repo.list_active()?;
        Ok(rank_leaders(&ForestIndex::new(&snapshot)))
    }

    /// Population rollup with full-depth `max_depth`.
    pub fn population_statistics(&self) -> Result<LeaderStatistics, LineageServiceError> {
        let snapshot = self.repo.list_active()?;
        let index = ForestIndex::new(&snapshot);
        let leaders = rank_leaders(&index);
        Ok(statistics_for(&index, leaders.len()))
    }

    fn build_page(&self, request: &LeaderPageRequest) -> Result<LeaderPage, LineageServiceError> {
        let (page, limit) = self.validate(request)?;
        let snapshot = self.repo.list_active()?;
        let index = ForestIndex::new(&snapshot);
        let leaders = rank_leaders(&index);
        let statistics = statistics_for(&index, leaders.len());

        let pagination = Pagination::new(page, limit, leaders.len());
        let spiritual_parents = leaders
            .into_iter()
            .skip(pagination.offset())
            .take(limit as usize)
            .collect();

        Ok(LeaderPage {
            spiritual_parents,
            statistics,
            pagination,
        })
    }

    fn validate(&self, request: &LeaderPageRequest) -> Result<(u32, u32), LineageServiceError> {
        if request.page < 1 {
            return Err(LineageServiceError::InvalidArgument(format!(
                "page must be >= 1, got {}",
                request.page
            )));
        }
        if request.limit <= 0 {
            return Err(LineageServiceError::InvalidArgument(format!(
                "limit must be > 0, got {}",
                request.limit
            )));
        }
        let page = u32::try_from(request.page).map_err(|_| {
            LineageServiceError::InvalidArgument(format!("page {} is out of range", request.page))
        })?;
        let limit = request.limit.min(i64::from(self.max_limit)) as u32;
        Ok((page, limit))
    }
}

/// Builds leader summaries for every member with children, in ranking order.
pub fn rank_leaders(index: &ForestIndex<'_>) -> Vec<LeaderSummary> {
    let mut leaders: Vec<LeaderSummary> = index
        .members()
        .filter(|(position, _)| index.direct_children(*position) > 0)
        .map(|(position, member)| {
            LeaderSummary::from_member(
                member,
                index.direct_children(position),
                index.count_downlines(position),
            )
        })
        .collect();
    leaders.sort_by(compare_leaders);
    leaders
}

/// Ranking order: more downlines first, then name, then id.
pub fn compare_leaders(left: &LeaderSummary, right: &LeaderSummary) -> Ordering {
    right
        .total_downlines
        .cmp(&left.total_downlines)
        .then_with(|| left.full_name.cmp(&right.full_name))
        .then_with(|| left.id.cmp(&right.id))
}

fn statistics_for(index: &ForestIndex<'_>, total_leaders: usize) -> LeaderStatistics {
    LeaderStatistics {
        total_members: index.len(),
        root_members: index.root_count(),
        members_with_spiritual_parents: index.with_parent_count(),
        total_leaders,
        max_depth: index.max_depth(),
    }
}
