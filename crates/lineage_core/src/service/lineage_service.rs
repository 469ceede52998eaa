//! Lineage tree query service.
//!
//! # Responsibility
//! - Resolve the parent→children graph into nested `LineageNode` trees.
//! - Attach population statistics to every tree response.
//!
//! # Invariants
//! - Root depth is 0; a node at `max_depth` keeps an empty child list.
//! - A child already on the current path is never re-entered; the branch is
//!   truncated and reported, and the request still succeeds.
//! - `_count.spiritualChildren` always equals the materialized child count.
//! - A whole-forest request reports every parent loop no root reaches, so
//!   members missing from the tree are always accounted for.

use crate::model::lineage::{CycleReport, ErrorCode, LineageNode, LineageStatistics, LineageTree};
use crate::logging::field_value;
use crate::model::member::{Member, MemberId};
use crate::repo::member_repo::{MemberRepoError, MemberRepository};
use crate::service::forest::ForestIndex;
use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors surfaced by the lineage read services.
#[derive(Debug)]
pub enum LineageServiceError {
    /// Malformed depth or pagination input.
    InvalidArgument(String),
    /// Requested root member does not exist or is soft-deleted.
    NotFound(MemberId),
    /// Member store query failed.
    Upstream(MemberRepoError),
}

impl LineageServiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Upstream(_) => ErrorCode::UpstreamUnavailable,
        }
    }
}

impl Display for LineageServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::NotFound(id) => write!(f, "member not found: {id}"),
            Self::Upstream(err) => write!(f, "member store unavailable: {err}"),
        }
    }
}

impl Error for LineageServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Upstream(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MemberRepoError> for LineageServiceError {
    fn from(value: MemberRepoError) -> Self {
        match value {
            MemberRepoError::NotFound(id) => Self::NotFound(id),
            other => Self::Upstream(other),
        }
    }
}

/// Validated lineage tree request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LineageQuery {
    /// `None` expands every root member.
    pub root_id: Option<MemberId>,
    /// `None` expands to unbounded depth.
    pub max_depth: Option<u32>,
}

impl LineageQuery {
    pub fn all_roots() -> Self {
        Self::default()
    }

    pub fn for_root(root_id: impl Into<MemberId>) -> Self {
        Self {
            root_id: Some(root_id.into()),
            max_depth: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Parses raw query-string values.
    ///
    /// Blank values count as absent. `max_depth` must be a non-negative
    /// integer; values beyond `u32::MAX` saturate, which no real tree reaches.
    pub fn parse(
        root_id: Option<&str>,
        max_depth: Option<&str>,
    ) -> Result<Self, LineageServiceError> {
        let root_id = root_id
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let max_depth = match max_depth.map(str::trim).filter(|value| !value.is_empty()) {
            None => None,
            Some(raw) => Some(parse_depth(raw)?),
        };
        Ok(Self {
            root_id,
            max_depth,
        })
    }
}

/// Lineage tree service facade.
pub struct LineageService<R: MemberRepository> {
    repo: R,
}

impl<R: MemberRepository> LineageService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Builds the lineage forest (or one subtree) for `query`.
    pub fn lineage_tree(&self, query: &LineageQuery) -> Result<LineageTree, LineageServiceError> {
        let started_at = Instant::now();
        let result = self.build_tree(query);
        match &result {
            Ok(tree) => info!(
                "event=lineage_tree module=service status=ok scoped={} max_depth={} roots={} nodes={} cycles={} duration_ms={}",
                query.root_id.is_some(),
                depth_label(query.max_depth),
                tree.family_tree.len(),
                tree.family_tree.iter().map(LineageNode::node_count).sum::<usize>(),
                tree.cycles.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=lineage_tree module=service status=error error_code={} duration_ms={}",
                err.code(),
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    /// Global population counts; `max_depth` is left at 0.
    pub fn population_statistics(&self) -> Result<LineageStatistics, LineageServiceError> {
        let counts = self.repo.population_counts()?;
        Ok(LineageStatistics {
            total_members: counts.total,
            root_members: counts.roots,
            members_with_spiritual_parents: counts.with_parents,
            max_depth: 0,
        })
    }

    fn build_tree(&self, query: &LineageQuery) -> Result<LineageTree, LineageServiceError> {
        let roots = match query.root_id.as_deref() {
            Some(root_id) => vec![self
                .repo
                .get_member(root_id, false)?
                .ok_or_else(|| LineageServiceError::NotFound(root_id.to_string()))?],
            None => self.repo.list_roots()?,
        };

        let mut cycles = Vec::new();
        let mut family_tree = Vec::with_capacity(roots.len());
        for root in &roots {
            let mut path = HashSet::new();
            family_tree.push(self.build_node(root, 0, query.max_depth, &mut path, &mut cycles)?);
        }
        if query.root_id.is_none() {
            self.report_unrooted_loops(&mut cycles)?;
        }

        let mut statistics = self.population_statistics()?;
        statistics.max_depth = family_tree
            .iter()
            .map(LineageNode::height)
            .max()
            .unwrap_or(0);

        Ok(LineageTree {
            family_tree,
            statistics,
            cycles,
        })
    }

    /// Loop members have a parent, so no root leads to them.
    fn report_unrooted_loops(
        &self,
        cycles: &mut Vec<CycleReport>,
    ) -> Result<(), LineageServiceError> {
        let snapshot = self.repo.list_active()?;
        let index = ForestIndex::new(&snapshot);
        for members in index.unrooted_loops() {
            // Walking down from the lowest id re-enters it from its parent.
            let ancestor = index.member(members[0]);
            let re_entry = index.member(members[1 % members.len()]);
            warn!(
                "event=lineage_cycle module=service status=unrooted error_code={} member_id={} ancestor_id={} loop_size={}",
                ErrorCode::CycleDetected,
                field_value(&re_entry.id),
                field_value(&ancestor.id),
                members.len()
            );
            cycles.push(CycleReport {
                member_id: re_entry.id.clone(),
                ancestor_id: ancestor.id.clone(),
            });
        }
        Ok(())
    }

    fn build_node(
        &self,
        member: &Member,
        depth: u32,
        max_depth: Option<u32>,
        path: &mut HashSet<MemberId>,
        cycles: &mut Vec<CycleReport>,
    ) -> Result<LineageNode, LineageServiceError> {
        let mut node = LineageNode::from_member(member);
        let children = self.repo.list_children(&member.id)?;
        if children.is_empty() {
            return Ok(node);
        }
        if max_depth.is_some_and(|limit| depth >= limit) {
            node.truncated = true;
            return Ok(node);
        }

        path.insert(member.id.clone());
        let mut built = Vec::with_capacity(children.len());
        for child in &children {
            if path.contains(&child.id) {
                warn!(
                    "event=lineage_cycle module=service status=truncated error_code={} member_id={} ancestor_id={}",
                    ErrorCode::CycleDetected,
                    field_value(&member.id),
                    field_value(&child.id)
                );
                cycles.push(CycleReport {
                    member_id: member.id.clone(),
                    ancestor_id: child.id.clone(),
                });
                node.truncated = true;
                continue;
            }
            built.push(self.build_node(child, depth + 1, max_depth, path, cycles)?);
        }
        path.remove(&member.id);

        node.set_children(built);
        Ok(node)
    }
}

fn parse_depth(raw: &str) -> Result<u32, LineageServiceError> {
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(LineageServiceError::InvalidArgument(format!(
            "maxDepth must be a non-negative integer, got `{raw}`"
        )));
    }
    Ok(digits
        .parse::<u64>()
        .ok()
        .and_then(|depth| u32::try_from(depth).ok())
        .unwrap_or(u32::MAX))
}

fn depth_label(max_depth: Option<u32>) -> String {
    max_depth.map_or_else(|| "unbounded".to_string(), |depth| depth.to_string())
}
