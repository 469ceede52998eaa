//! Indented, collapsible lineage tree.
//!
//! # Responsibility
//! - Track which nodes are expanded for one tree view instance.
//! - Filter a lineage forest by free text and flatten it into display rows.
//!
//! # Invariants
//! - Only nodes with materialized children can be toggled.
//! - Filtering keeps matches plus the ancestor chain needed to reach them.

use crate::model::lineage::LineageNode;
use crate::model::member::MemberId;
use std::collections::HashSet;

/// Forests with at most this many roots start with every root expanded.
pub const AUTO_EXPAND_ROOT_LIMIT: usize = 5;

/// One flattened row of the indented tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub id: MemberId,
    pub full_name: String,
    pub church: String,
    /// Indentation level; roots are 0.
    pub depth: usize,
    pub child_count: usize,
    /// Whether the expand/collapse toggle is shown.
    pub has_children: bool,
    pub expanded: bool,
    pub truncated: bool,
}

/// Expand/collapse state of one indented tree view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeViewState {
    expanded: HashSet<MemberId>,
}

impl TreeViewState {
    /// Initial state for a freshly loaded forest.
    ///
    /// Small forests expand every root; larger ones start collapsed apart
    /// from `pre_expanded`.
    pub fn new(forest: &[LineageNode], pre_expanded: impl IntoIterator<Item = MemberId>) -> Self {
        let mut expanded: HashSet<MemberId> = pre_expanded.into_iter().collect();
        if forest.len() <= AUTO_EXPAND_ROOT_LIMIT {
            expanded.extend(forest.iter().map(|root| root.id.clone()));
        }
        Self { expanded }
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn expanded_ids(&self) -> &HashSet<MemberId> {
        &self.expanded
    }

    /// Flips one node. Returns the new state, or `None` when the node is
    /// unknown or has no children to show.
    pub fn toggle(&mut self, forest: &[LineageNode], id: &str) -> Option<bool> {
        let node = super::find_node(forest, id)?;
        if !node.has_children() {
            return None;
        }
        if self.expanded.remove(id) {
            Some(false)
        } else {
            self.expanded.insert(id.to_string());
            Some(true)
        }
    }

    /// Flattens the forest into visible rows.
    ///
    /// With a non-blank `query` the filtered tree is shown fully expanded so
    /// every match is on screen; the stored expand state is left untouched.
    pub fn visible_rows(&self, forest: &[LineageNode], query: &str) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        if query.trim().is_empty() {
            let mut path = HashSet::new();
            for root in forest {
                push_rows(root, 0, &|id: &str| self.is_expanded(id), &mut path, &mut rows);
            }
        } else {
            let filtered = filter_tree(forest, query);
            let mut path = HashSet::new();
            for root in &filtered {
                push_rows(root, 0, &|_: &str| true, &mut path, &mut rows);
            }
        }
        rows
    }
}

fn push_rows<'a>(
    node: &'a LineageNode,
    depth: usize,
    is_expanded: &dyn Fn(&str) -> bool,
    path: &mut HashSet<&'a str>,
    rows: &mut Vec<TreeRow>,
) {
    if !path.insert(node.id.as_str()) {
        return;
    }
    let expanded = node.has_children() && is_expanded(&node.id);
    rows.push(TreeRow {
        id: node.id.clone(),
        full_name: node.full_name.clone(),
        church: node.church.clone(),
        depth,
        child_count: node.direct_children_count(),
        has_children: node.has_children(),
        expanded,
        truncated: node.truncated,
    });
    if expanded {
        for child in &node.spiritual_children {
            push_rows(child, depth + 1, is_expanded, path, rows);
        }
    }
    path.remove(node.id.as_str());
}

/// Returns a pruned copy of `forest` containing nodes whose name, church or
/// email contains `query` (case-insensitive), plus their ancestors.
///
/// A blank query returns the forest unchanged.
pub fn filter_tree(forest: &[LineageNode], query: &str) -> Vec<LineageNode> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return forest.to_vec();
    }
    let mut path = HashSet::new();
    forest
        .iter()
        .filter_map(|root| prune(root, &needle, &mut path))
        .collect()
}

fn prune<'a>(
    node: &'a LineageNode,
    needle: &str,
    path: &mut HashSet<&'a str>,
) -> Option<LineageNode> {
    if !path.insert(node.id.as_str()) {
        return None;
    }
    let children: Vec<LineageNode> = node
        .spiritual_children
        .iter()
        .filter_map(|child| prune(child, needle, path))
        .collect();
    path.remove(node.id.as_str());

    if !node_matches(node, needle) && children.is_empty() {
        return None;
    }
    let mut copy = node.detached();
    copy.set_children(children);
    Some(copy)
}

fn node_matches(node: &LineageNode, needle: &str) -> bool {
    let contains = |value: &str| value.to_lowercase().contains(needle);
    contains(&node.full_name)
        || contains(&node.church)
        || node.email.as_deref().is_some_and(contains)
}

#[cfg(test)]
mod tests {
    use super::{filter_tree, TreeViewState};
    use crate::model::lineage::LineageNode;
    use crate::model::member::Member;

    fn node(id: &str, name: &str, children: Vec<LineageNode>) -> LineageNode {
        let mut node = LineageNode::from_member(&Member::with_id(id, name));
        node.set_children(children);
        node
    }

    fn sample() -> Vec<LineageNode> {
        vec![node(
            "root",
            "Root Pastor",
            vec![
                node("a", "Alice", vec![node("a1", "Zebedee", vec![])]),
                node("b", "Bob", vec![]),
            ],
        )]
    }

    #[test]
    fn small_forest_expands_roots_initially() {
        let forest = sample();
        let state = TreeViewState::new(&forest, []);
        assert!(state.is_expanded("root"));
        assert!(!state.is_expanded("a"));

        let rows = state.visible_rows(&forest, "");
        let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, ["root", "a", "b"]);
        assert_eq!(rows[1].depth, 1);
        assert!(rows[1].has_children);
        assert!(!rows[2].has_children);
    }

    #[test]
    fn large_forest_starts_collapsed_except_pre_expanded() {
        let forest: Vec<LineageNode> = (0..6)
            .map(|n| node(&format!("r{n}"), "Root", vec![node(&format!("c{n}"), "Kid", vec![])]))
            .collect();
        let state = TreeViewState::new(&forest, ["r3".to_string()]);
        assert!(state.is_expanded("r3"));
        assert!(!state.is_expanded("r0"));
        assert_eq!(state.visible_rows(&forest, "").len(), 7);
    }

    #[test]
    fn toggle_flips_parents_and_ignores_leaves() {
        let forest = sample();
        let mut state = TreeViewState::new(&forest, []);
        assert_eq!(state.toggle(&forest, "a"), Some(true));
        assert_eq!(state.toggle(&forest, "a"), Some(false));
        assert_eq!(state.toggle(&forest, "b"), None);
        assert_eq!(state.toggle(&forest, "missing"), None);
    }

    #[test]
    fn filter_keeps_ancestor_chain_and_drops_siblings() {
        let filtered = filter_tree(&sample(), "zeb");
        assert_eq!(filtered.len(), 1);
        let root = &filtered[0];
        assert_eq!(root.spiritual_children.len(), 1);
        assert_eq!(root.count.spiritual_children, 1);
        assert_eq!(root.spiritual_children[0].id, "a");
        assert_eq!(root.spiritual_children[0].spiritual_children[0].id, "a1");
    }

    #[test]
    fn filter_matches_church_and_email_case_insensitively() {
        let mut member = Member::with_id("e", "Eve");
        member.email = Some("EVE@Example.org".to_string());
        member.church = "Grace Chapel".to_string();
        let forest = vec![LineageNode::from_member(&member)];

        assert_eq!(filter_tree(&forest, "example.ORG").len(), 1);
        assert_eq!(filter_tree(&forest, "chapel").len(), 1);
        assert!(filter_tree(&forest, "nobody").is_empty());
    }

    #[test]
    fn active_query_shows_filtered_tree_expanded() {
        let forest = sample();
        let state = TreeViewState::new(&forest, []);
        let rows = state.visible_rows(&forest, "zebedee");
        let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, ["root", "a", "a1"]);
    }

    #[test]
    fn repeated_id_on_path_is_cut() {
        let corrupted = vec![node("x", "X", vec![node("y", "Y", vec![node("x", "X", vec![])])])];
        let state = TreeViewState::new(&corrupted, ["y".to_string()]);
        let rows = state.visible_rows(&corrupted, "");
        let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, ["x", "y"]);
    }
}
