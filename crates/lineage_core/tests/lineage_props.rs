use lineage_core::db::open_db_in_memory;
use lineage_core::{
    LeaderService, LineageNode, LineageQuery, LineageService, SqliteMemberRepository,
};
use proptest::prelude::*;
use rusqlite::{params, Connection};
use std::collections::HashSet;

/// Arbitrary parent assignments, loops and self-references included.
fn parent_assignments() -> impl Strategy<Value = Vec<Option<usize>>> {
    (1usize..14).prop_flat_map(|size| prop::collection::vec(prop::option::of(0..size), size))
}

fn store_with(parents: &[Option<usize>]) -> Connection {
    let conn = open_db_in_memory().unwrap();
    for (index, parent) in parents.iter().enumerate() {
        conn.execute(
            "INSERT INTO members (id, full_name, spiritual_parent_id) VALUES (?1, ?2, ?3);",
            params![
                format!("m{index:02}"),
                format!("Member {index:02}"),
                parent.map(|parent| format!("m{parent:02}"))
            ],
        )
        .unwrap();
    }
    conn
}

fn chain_returns_to_start(parents: &[Option<usize>], start: usize) -> bool {
    let mut visited = HashSet::new();
    // Self-references are dangling, so the member is a plain root.
    let mut cursor = parents[start].filter(|parent| *parent != start);
    while let Some(current) = cursor {
        if current == start {
            return true;
        }
        if !visited.insert(current) {
            return false;
        }
        cursor = parents[current];
    }
    false
}

fn check_node<'a>(node: &'a LineageNode, path: &mut HashSet<&'a str>) {
    assert_eq!(node.count.spiritual_children, node.spiritual_children.len());
    assert!(path.insert(node.id.as_str()), "id {} repeated on path", node.id);
    for child in &node.spiritual_children {
        check_node(child, path);
    }
    path.remove(node.id.as_str());
}

proptest! {
    #[test]
    fn tree_builder_terminates_and_reports_loops(parents in parent_assignments()) {
        let conn = store_with(&parents);
        let service = LineageService::new(SqliteMemberRepository::try_new(&conn).unwrap());

        let forest = service.lineage_tree(&LineageQuery::all_roots()).unwrap();
        let any_loop = (0..parents.len()).any(|start| chain_returns_to_start(&parents, start));
        prop_assert_eq!(!forest.cycles.is_empty(), any_loop);
        prop_assert_eq!(forest.statistics.total_members, parents.len());
        for root in &forest.family_tree {
            check_node(root, &mut HashSet::new());
        }

        for start in 0..parents.len() {
            let tree = service
                .lineage_tree(&LineageQuery::for_root(format!("m{start:02}")))
                .unwrap();
            let root = &tree.family_tree[0];
            check_node(root, &mut HashSet::new());
            prop_assert!(root.node_count() <= parents.len());
            prop_assert_eq!(!tree.cycles.is_empty(), chain_returns_to_start(&parents, start));
        }
    }

    #[test]
    fn depth_limit_bounds_tree_height(parents in parent_assignments(), max_depth in 0u32..4) {
        let conn = store_with(&parents);
        let service = LineageService::new(SqliteMemberRepository::try_new(&conn).unwrap());

        let tree = service
            .lineage_tree(&LineageQuery::all_roots().with_max_depth(max_depth))
            .unwrap();
        for root in &tree.family_tree {
            prop_assert!(root.height() <= max_depth as usize);
        }
        prop_assert!(tree.statistics.max_depth <= max_depth as usize);
    }

    #[test]
    fn leader_rollup_terminates_on_any_assignment(parents in parent_assignments()) {
        let conn = store_with(&parents);
        let service = LeaderService::new(SqliteMemberRepository::try_new(&conn).unwrap());

        let leaders = service.ranked_leaders().unwrap();
        for leader in &leaders {
            prop_assert!(leader.direct_children >= 1);
            prop_assert!(leader.total_downlines >= leader.direct_children);
            prop_assert!(leader.total_downlines < parents.len());
        }
        for pair in leaders.windows(2) {
            prop_assert!(pair[0].total_downlines >= pair[1].total_downlines);
        }
    }
}
