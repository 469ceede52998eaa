//! In-memory index over a member snapshot.
//!
//! # Responsibility
//! - Resolve parent references once and expose parent/children adjacency.
//! - Provide cycle-safe full-depth walks for aggregation.
//!
//! # Invariants
//! - Only active members take part; a reference to a missing or deleted
//!   member makes the child a root.
//! - Every walk tracks visited members, so corrupted parent loops terminate.

use crate::model::member::Member;
use std::collections::{HashMap, HashSet};

/// Adjacency view of the lineage forest built from one snapshot.
#[derive(Debug)]
pub struct ForestIndex<'a> {
    members: Vec<&'a Member>,
    children: Vec<Vec<usize>>,
    parent: Vec<Option<usize>>,
}

impl<'a> ForestIndex<'a> {
    /// Builds the index. Deleted members are skipped.
    ///
    /// Children keep the snapshot order, so a snapshot sorted by name yields
    /// name-ordered children.
    pub fn new(snapshot: &'a [Member]) -> Self {
        let members: Vec<&Member> = snapshot.iter().filter(|member| member.is_active()).collect();
        let positions: HashMap<&str, usize> = members
            .iter()
            .enumerate()
            .map(|(index, member)| (member.id.as_str(), index))
            .collect();

        let mut children = vec![Vec::new(); members.len()];
        let mut parent = vec![None; members.len()];
        for (index, member) in members.iter().enumerate() {
            let resolved = member
                .spiritual_parent_id
                .as_deref()
                .and_then(|parent_id| positions.get(parent_id).copied())
                .filter(|parent_index| *parent_index != index);
            if let Some(parent_index) = resolved {
                parent[index] = Some(parent_index);
                children[parent_index].push(index);
            }
        }

        Self {
            members,
            children,
            parent,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member(&self, index: usize) -> &'a Member {
        self.members[index]
    }

    pub fn members(&self) -> impl Iterator<Item = (usize, &'a Member)> + '_ {
        self.members.iter().copied().enumerate()
    }

    /// Members whose parent reference does not resolve.
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.parent
            .iter()
            .enumerate()
            .filter(|(_, parent)| parent.is_none())
            .map(|(index, _)| index)
    }

    pub fn root_count(&self) -> usize {
        self.roots().count()
    }

    pub fn with_parent_count(&self) -> usize {
        self.len() - self.root_count()
    }

    pub fn direct_children(&self, index: usize) -> usize {
        self.children[index].len()
    }

    /// Counts every transitive descendant once, at unbounded depth.
    pub fn count_downlines(&self, index: usize) -> usize {
        let mut visited = HashSet::from([index]);
        let mut stack = self.children[index].clone();
        let mut total = 0;
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            total += 1;
            stack.extend(self.children[current].iter().copied());
        }
        total
    }

    /// Deepest edge count reachable from any root.
    ///
    /// Members caught in a parent loop are unreachable from roots and do not
    /// contribute.
    pub fn max_depth(&self) -> usize {
        let mut visited = HashSet::new();
        let mut stack: Vec<(usize, usize)> = self.roots().map(|root| (root, 0)).collect();
        let mut deepest = 0;
        while let Some((current, depth)) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            deepest = deepest.max(depth);
            stack.extend(self.children[current].iter().map(|child| (*child, depth + 1)));
        }
        deepest
    }

    /// Walks parent links from `index` and reports whether they loop.
    pub fn parent_chain_loops(&self, index: usize) -> bool {
        let mut visited = HashSet::new();
        let mut cursor = Some(index);
        while let Some(current) = cursor {
            if !visited.insert(current) {
                return true;
            }
            cursor = self.parent[current];
        }
        false
    }

    /// Parent loops that no root reaches, one entry per loop.
    ///
    /// Each entry lists the loop members starting at the smallest id, in
    /// child-to-parent order. Members hanging below a loop are not listed.
    pub fn unrooted_loops(&self) -> Vec<Vec<usize>> {
        let mut in_loop = HashSet::new();
        let mut loops = Vec::new();
        for start in 0..self.len() {
            if in_loop.contains(&start) || !self.parent_chain_loops(start) {
                continue;
            }
            let mut seen = HashSet::new();
            let mut cursor = start;
            while seen.insert(cursor) {
                match self.parent[cursor] {
                    Some(parent) => cursor = parent,
                    None => break,
                }
            }
            if in_loop.contains(&cursor) {
                continue;
            }

            let mut members = vec![cursor];
            let mut next = self.parent[cursor];
            while let Some(current) = next.filter(|current| *current != cursor) {
                members.push(current);
                next = self.parent[current];
            }
            let lowest = members
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| self.members[**a].id.cmp(&self.members[**b].id))
                .map_or(0, |(position, _)| position);
            members.rotate_left(lowest);
            in_loop.extend(members.iter().copied());
            loops.push(members);
        }
        loops
    }
}

/// Counts descendants of `id` inside `snapshot`; `None` when `id` is not an
/// active member.
pub fn count_downlines(snapshot: &[Member], id: &str) -> Option<usize> {
    let index = ForestIndex::new(snapshot);
    let found = index
        .members()
        .find(|(_, member)| member.id == id)
        .map(|(position, _)| index.count_downlines(position));
    found
}
