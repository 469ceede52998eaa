//! Presentation state for lineage views.
//!
//! # Responsibility
//! - Hold expand/collapse, filter and pagination state per view instance.
//! - Turn lineage responses into rows, card layouts and leaderboard lists
//!   without depending on any UI toolkit.
//!
//! # Invariants
//! - Every recursive walk over response data carries a per-path id set, so a
//!   corrupted response with a repeated id cannot recurse forever.
//! - Tier styling is keyed off the server-provided tier only.

use crate::model::lineage::LineageNode;
use std::collections::HashSet;

pub mod cache;
pub mod leaderboard;
pub mod org_chart;
pub mod tree_view;

/// Finds a node by id, skipping any branch that repeats an id on its path.
pub(crate) fn find_node<'a>(forest: &'a [LineageNode], id: &str) -> Option<&'a LineageNode> {
    fn walk<'a>(
        node: &'a LineageNode,
        id: &str,
        path: &mut HashSet<&'a str>,
    ) -> Option<&'a LineageNode> {
        if !path.insert(node.id.as_str()) {
            return None;
        }
        let found = if node.id == id {
            Some(node)
        } else {
            node.spiritual_children
                .iter()
                .find_map(|child| walk(child, id, path))
        };
        path.remove(node.id.as_str());
        found
    }

    let mut path = HashSet::new();
    forest.iter().find_map(|root| walk(root, id, &mut path))
}

/// Collects every id reachable from `root`, cycle-guarded.
pub(crate) fn reachable_ids(root: &LineageNode) -> HashSet<String> {
    fn walk<'a>(node: &'a LineageNode, path: &mut HashSet<&'a str>, out: &mut HashSet<String>) {
        if !path.insert(node.id.as_str()) {
            return;
        }
        out.insert(node.id.clone());
        for child in &node.spiritual_children {
            walk(child, path, out);
        }
        path.remove(node.id.as_str());
    }

    let mut out = HashSet::new();
    walk(root, &mut HashSet::new(), &mut out);
    out
}
