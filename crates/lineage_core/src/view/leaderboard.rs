//! Leaderboard grid with "Load More" paging and local search.
//!
//! # Responsibility
//! - Accumulate leader pages in server order.
//! - Filter already-fetched leaders by name or church without re-fetching.
//! - Map the server-provided tier to card styling.

use crate::model::lineage::{LeaderPage, LeaderStatistics, LeaderSummary, Tier};
use crate::model::member::MemberId;
use std::collections::HashSet;

/// Visual treatment for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierStyle {
    pub tier: Tier,
    pub badge: &'static str,
    /// Accent color as hex.
    pub accent: &'static str,
    pub icon: &'static str,
}

impl TierStyle {
    pub fn for_tier(tier: Tier) -> Self {
        let (accent, icon) = match tier {
            Tier::Master => ("#b45309", "crown"),
            Tier::Senior => ("#7c3aed", "star"),
            Tier::Team => ("#2563eb", "users"),
            Tier::Active => ("#059669", "user-check"),
            Tier::New => ("#6b7280", "user"),
        };
        Self {
            tier,
            badge: tier.label(),
            accent,
            icon,
        }
    }

    /// Styling for one card, keyed by the tier the server computed.
    pub fn for_leader(leader: &LeaderSummary) -> Self {
        Self::for_tier(leader.tier)
    }
}

/// Accumulated leaderboard state of one view instance.
#[derive(Debug, Clone, Default)]
pub struct LeaderboardState {
    entries: Vec<LeaderSummary>,
    seen: HashSet<MemberId>,
    last_page: Option<u32>,
    has_more: bool,
    total_count: usize,
    statistics: Option<LeaderStatistics>,
    query: String,
}

impl LeaderboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a fetched page.
    ///
    /// Page 1 replaces the list (first load or refresh); later pages append,
    /// skipping ids already shown.
    pub fn apply_page(&mut self, page: LeaderPage) {
        if page.pagination.page <= 1 {
            self.entries.clear();
            self.seen.clear();
        }
        for leader in page.spiritual_parents {
            if self.seen.insert(leader.id.clone()) {
                self.entries.push(leader);
            }
        }
        self.last_page = Some(page.pagination.page);
        self.has_more = page.pagination.has_more;
        self.total_count = page.pagination.total_count;
        self.statistics = Some(page.statistics);
    }

    /// Page to request for "Load More", or `None` when everything is loaded.
    pub fn next_page(&self) -> Option<u32> {
        match self.last_page {
            None => Some(1),
            Some(page) if self.has_more => Some(page + 1),
            Some(_) => None,
        }
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn loaded(&self) -> &[LeaderSummary] {
        &self.entries
    }

    pub fn statistics(&self) -> Option<&LeaderStatistics> {
        self.statistics.as_ref()
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Loaded leaders matching the current query by name or church.
    pub fn visible(&self) -> Vec<&LeaderSummary> {
        let needle = self.query.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|leader| {
                needle.is_empty()
                    || leader.full_name.to_lowercase().contains(&needle)
                    || leader.church.to_lowercase().contains(&needle)
            })
            .collect()
    }
}
