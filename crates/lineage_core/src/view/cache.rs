//! Normalized client-side cache of lineage responses.
//!
//! # Responsibility
//! - Store each fetched tree once as an id → node map plus root ids.
//! - Let every view re-materialize its nodes from the same fetch.
//!
//! # Invariants
//! - Entries are keyed by `(root_id, max_depth)` and never invalidated;
//!   lineage data is read-only for views.
//! - The first occurrence of an id wins; repeated ids are not linked twice.

use crate::model::lineage::{LineageNode, LineageStatistics, LineageTree};
use crate::model::member::MemberId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Cache key of one lineage request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub root_id: Option<MemberId>,
    pub max_depth: Option<u32>,
}

impl CacheKey {
    pub fn new(root_id: Option<&str>, max_depth: Option<u32>) -> Self {
        Self {
            root_id: root_id.map(str::to_string),
            max_depth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeRecord {
    /// Fields only; children live in `child_ids`.
    node: LineageNode,
    child_ids: Vec<MemberId>,
}

/// One lineage response flattened into an id → node map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLineage {
    root_ids: Vec<MemberId>,
    nodes: HashMap<MemberId, NodeRecord>,
    statistics: LineageStatistics,
}

impl NormalizedLineage {
    pub fn from_tree(tree: &LineageTree) -> Self {
        let mut nodes = HashMap::new();
        let mut root_ids = Vec::with_capacity(tree.family_tree.len());
        for root in &tree.family_tree {
            if insert_node(root, &mut nodes) {
                root_ids.push(root.id.clone());
            }
        }
        Self {
            root_ids,
            nodes,
            statistics: tree.statistics,
        }
    }

    pub fn root_ids(&self) -> &[MemberId] {
        &self.root_ids
    }

    pub fn statistics(&self) -> LineageStatistics {
        self.statistics
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Child ids of one node in response order.
    pub fn child_ids(&self, id: &str) -> Option<&[MemberId]> {
        self.nodes.get(id).map(|record| record.child_ids.as_slice())
    }

    /// Rebuilds the nested forest.
    pub fn forest(&self) -> Vec<LineageNode> {
        self.root_ids
            .iter()
            .filter_map(|id| self.subtree(id))
            .collect()
    }

    /// Rebuilds the nested subtree under `id`.
    pub fn subtree(&self, id: &str) -> Option<LineageNode> {
        let mut path = HashSet::new();
        self.materialize(id, &mut path)
    }

    fn materialize<'a>(&'a self, id: &'a str, path: &mut HashSet<&'a str>) -> Option<LineageNode> {
        let record = self.nodes.get(id)?;
        if !path.insert(id) {
            return None;
        }
        let children = record
            .child_ids
            .iter()
            .filter_map(|child_id| self.materialize(child_id, path))
            .collect();
        path.remove(id);

        let mut node = record.node.clone();
        node.set_children(children);
        Some(node)
    }
}

/// Returns `false` when the id was already present.
fn insert_node(node: &LineageNode, nodes: &mut HashMap<MemberId, NodeRecord>) -> bool {
    if nodes.contains_key(&node.id) {
        return false;
    }
    nodes.insert(
        node.id.clone(),
        NodeRecord {
            node: node.detached(),
            child_ids: Vec::new(),
        },
    );

    let mut child_ids = Vec::with_capacity(node.spiritual_children.len());
    for child in &node.spiritual_children {
        if insert_node(child, nodes) {
            child_ids.push(child.id.clone());
        }
    }
    if let Some(record) = nodes.get_mut(&node.id) {
        record.child_ids = child_ids;
    }
    true
}

/// Per-client response cache shared by every view of that client.
#[derive(Debug, Default)]
pub struct LineageCache {
    entries: HashMap<CacheKey, Arc<NormalizedLineage>>,
}

impl LineageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<NormalizedLineage>> {
        self.entries.get(key).cloned()
    }

    /// Normalizes and stores `tree`; an existing entry for `key` is kept.
    pub fn insert(&mut self, key: CacheKey, tree: &LineageTree) -> Arc<NormalizedLineage> {
        self.entries
            .entry(key)
            .or_insert_with(|| Arc::new(NormalizedLineage::from_tree(tree)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
