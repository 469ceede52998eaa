//! Horizontal org-chart view of one lineage subtree.
//!
//! # Responsibility
//! - Track expand/collapse state independently from the indented tree.
//! - Lay out cards top-down with connector lines, and render them as text.
//!
//! # Invariants
//! - The root card is always shown.
//! - A parent is centered over its children; sibling subtrees never overlap.

use crate::model::lineage::LineageNode;
use crate::model::member::MemberId;
use std::collections::HashSet;

/// Expand/collapse state of one org chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgChartState {
    root_id: MemberId,
    expanded: HashSet<MemberId>,
}

impl OrgChartState {
    /// Starts with only the root expanded.
    pub fn new(root: &LineageNode) -> Self {
        Self {
            root_id: root.id.clone(),
            expanded: HashSet::from([root.id.clone()]),
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    /// Flips one node. `None` when the node is unknown or childless.
    pub fn toggle(&mut self, root: &LineageNode, id: &str) -> Option<bool> {
        let node = super::find_node(std::slice::from_ref(root), id)?;
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

    /// Expands every node reachable from the root.
    pub fn expand_all(&mut self, root: &LineageNode) {
        self.expanded = super::reachable_ids(root);
    }

    /// Resets to just the root.
    pub fn collapse_all(&mut self) {
        self.expanded = HashSet::from([self.root_id.clone()]);
    }

    /// Computes card and connector positions for the current state.
    pub fn layout(&self, root: &LineageNode, options: &OrgChartOptions) -> OrgChartLayout {
        let mut builder = LayoutBuilder {
            state: self,
            options,
            cards: Vec::new(),
            connectors: Vec::new(),
        };
        let mut path = HashSet::new();
        let width = builder.place(root, 0, 0, &mut path);
        let height = builder
            .cards
            .iter()
            .map(|card| card.y + card.height)
            .max()
            .unwrap_or(0);
        OrgChartLayout {
            cards: builder.cards,
            connectors: builder.connectors,
            width,
            height,
        }
    }
}

/// Card and spacing sizes in layout units (text cells for `render_text`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgChartOptions {
    pub card_width: usize,
    pub card_height: usize,
    pub horizontal_gap: usize,
    pub vertical_gap: usize,
}

impl Default for OrgChartOptions {
    fn default() -> Self {
        Self {
            card_width: 22,
            card_height: 3,
            horizontal_gap: 2,
            vertical_gap: 2,
        }
    }
}

/// One positioned card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardPlacement {
    pub id: MemberId,
    pub full_name: String,
    pub child_count: usize,
    pub depth: usize,
    /// Left edge.
    pub x: usize,
    /// Top edge.
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub has_children: bool,
    pub expanded: bool,
}

impl CardPlacement {
    pub fn center_x(&self) -> usize {
        self.x + self.width / 2
    }
}

/// Point in layout units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
    /// Parent bottom down to the children bus.
    Stem,
    /// Horizontal line spanning the first to last child.
    Bus,
    /// Bus down to one child's top edge.
    Drop,
}

/// Straight connector segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connector {
    pub kind: ConnectorKind,
    pub from: Point,
    pub to: Point,
}

/// Positioned cards and connectors for one org chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgChartLayout {
    pub cards: Vec<CardPlacement>,
    pub connectors: Vec<Connector>,
    pub width: usize,
    pub height: usize,
}

impl OrgChartLayout {
    pub fn card(&self, id: &str) -> Option<&CardPlacement> {
        self.cards.iter().find(|card| card.id == id)
    }

    /// Draws the layout on a character canvas.
    ///
    /// Cards are boxes with the member name and a `[+n]`/`[-]` marker for
    /// collapsed/expanded parents.
    pub fn render_text(&self) -> String {
        let mut canvas = vec![vec![' '; self.width]; self.height];

        for connector in &self.connectors {
            let glyph = match connector.kind {
                ConnectorKind::Bus => '-',
                ConnectorKind::Stem | ConnectorKind::Drop => '|',
            };
            let (x0, x1) = ordered(connector.from.x, connector.to.x);
            let (y0, y1) = ordered(connector.from.y, connector.to.y);
            for row in canvas.iter_mut().take(y1 + 1).skip(y0) {
                for cell in row.iter_mut().take(x1 + 1).skip(x0) {
                    *cell = if *cell == ' ' || *cell == glyph { glyph } else { '+' };
                }
            }
        }

        for card in &self.cards {
            draw_card(&mut canvas, card);
        }

        canvas
            .into_iter()
            .map(|row| row.into_iter().collect::<String>().trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

struct LayoutBuilder<'s> {
    state: &'s OrgChartState,
    options: &'s OrgChartOptions,
    cards: Vec<CardPlacement>,
    connectors: Vec<Connector>,
}

impl LayoutBuilder<'_> {
    /// Places `node` and its visible subtree starting at column `left`.
    /// Returns the subtree width.
    fn place<'n>(
        &mut self,
        node: &'n LineageNode,
        left: usize,
        depth: usize,
        path: &mut HashSet<&'n str>,
    ) -> usize {
        path.insert(node.id.as_str());
        let options = *self.options;
        let y = depth * (options.card_height + options.vertical_gap);
        let expanded = node.has_children() && self.state.is_expanded(&node.id);

        let children: Vec<&LineageNode> = if expanded {
            node.spiritual_children
                .iter()
                .filter(|child| !path.contains(child.id.as_str()))
                .collect()
        } else {
            Vec::new()
        };

        let card_index = self.cards.len();
        self.cards.push(CardPlacement {
            id: node.id.clone(),
            full_name: node.full_name.clone(),
            child_count: node.direct_children_count(),
            depth,
            x: left,
            y,
            width: options.card_width,
            height: options.card_height,
            has_children: node.has_children(),
            expanded,
        });

        if children.is_empty() {
            path.remove(node.id.as_str());
            return options.card_width;
        }

        let child_widths: Vec<usize> = children
            .iter()
            .map(|&child| self.measure(child, path))
            .collect();
        let row_width = child_widths.iter().sum::<usize>()
            + options.horizontal_gap * (children.len() - 1);
        let width = row_width.max(options.card_width);

        let mut cursor = left + (width - row_width) / 2;
        let mut child_centers = Vec::with_capacity(children.len());
        for (&child, child_width) in children.iter().zip(&child_widths) {
            let first_child = self.cards.len();
            self.place(child, cursor, depth + 1, path);
            child_centers.push(self.cards[first_child].center_x());
            cursor += child_width + options.horizontal_gap;
        }

        let first_center = child_centers[0];
        let last_center = child_centers[child_centers.len() - 1];
        let parent_center = (first_center + last_center) / 2;
        self.cards[card_index].x = parent_center.saturating_sub(options.card_width / 2);

        let parent_bottom = y + options.card_height;
        let bus_y = parent_bottom + options.vertical_gap / 2;
        let child_top = parent_bottom + options.vertical_gap;
        self.connectors.push(Connector {
            kind: ConnectorKind::Stem,
            from: Point {
                x: parent_center,
                y: parent_bottom,
            },
            to: Point {
                x: parent_center,
                y: bus_y,
            },
        });
        if first_center != last_center {
            self.connectors.push(Connector {
                kind: ConnectorKind::Bus,
                from: Point {
                    x: first_center,
                    y: bus_y,
                },
                to: Point {
                    x: last_center,
                    y: bus_y,
                },
            });
        }
        for center in child_centers {
            self.connectors.push(Connector {
                kind: ConnectorKind::Drop,
                from: Point { x: center, y: bus_y },
                to: Point {
                    x: center,
                    y: child_top.saturating_sub(1),
                },
            });
        }

        path.remove(node.id.as_str());
        width
    }

    /// Width of the visible subtree under `node`.
    fn measure<'n>(&self, node: &'n LineageNode, path: &mut HashSet<&'n str>) -> usize {
        let options = self.options;
        if !(node.has_children() && self.state.is_expanded(&node.id)) {
            return options.card_width;
        }
        path.insert(node.id.as_str());
        let widths: Vec<usize> = node
            .spiritual_children
            .iter()
            .filter(|child| !path.contains(child.id.as_str()))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|child| self.measure(child, path))
            .collect();
        path.remove(node.id.as_str());
        if widths.is_empty() {
            return options.card_width;
        }
        let row_width =
            widths.iter().sum::<usize>() + options.horizontal_gap * (widths.len() - 1);
        row_width.max(options.card_width)
    }
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn draw_card(canvas: &mut [Vec<char>], card: &CardPlacement) {
    if card.width < 4 || card.height < 3 {
        return;
    }
    let right = card.x + card.width - 1;
    let bottom = card.y + card.height - 1;
    let mut put = |x: usize, y: usize, glyph: char| {
        if let Some(cell) = canvas.get_mut(y).and_then(|row| row.get_mut(x)) {
            *cell = glyph;
        }
    };

    for x in card.x..=right {
        let glyph = if x == card.x || x == right { '+' } else { '-' };
        put(x, card.y, glyph);
        put(x, bottom, glyph);
    }
    for y in card.y + 1..bottom {
        put(card.x, y, '|');
        put(right, y, '|');
        for x in card.x + 1..right {
            put(x, y, ' ');
        }
    }

    let marker = match (card.has_children, card.expanded) {
        (true, true) => " [-]".to_string(),
        (true, false) => format!(" [+{}]", card.child_count),
        (false, _) => String::new(),
    };
    let inner = card.width - 4;
    let name_room = inner.saturating_sub(marker.chars().count());
    let mut label: String = card.full_name.chars().take(name_room).collect();
    label.push_str(&marker);
    let label_y = card.y + card.height / 2;
    for (offset, glyph) in label.chars().take(inner).enumerate() {
        put(card.x + 2 + offset, label_y, glyph);
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectorKind, OrgChartOptions, OrgChartState};
    use crate::model::lineage::LineageNode;
    use crate::model::member::Member;

    fn node(id: &str, children: Vec<LineageNode>) -> LineageNode {
        let mut node = LineageNode::from_member(&Member::with_id(id, id.to_uppercase()));
        node.set_children(children);
        node
    }

    fn sample() -> LineageNode {
        node(
            "root",
            vec![
                node("a", vec![node("a1", vec![]), node("a2", vec![])]),
                node("b", vec![]),
            ],
        )
    }

    #[test]
    fn starts_with_root_only_and_expand_all_reaches_every_node() {
        let root = sample();
        let mut state = OrgChartState::new(&root);
        assert!(state.is_expanded("root"));
        assert!(!state.is_expanded("a"));

        state.expand_all(&root);
        for id in ["root", "a", "a1", "a2", "b"] {
            assert!(state.is_expanded(id), "{id} should be expanded");
        }

        state.collapse_all();
        assert!(state.is_expanded("root"));
        assert!(!state.is_expanded("a"));
    }

    #[test]
    fn layout_centers_parent_over_children_without_overlap() {
        let root = sample();
        let mut state = OrgChartState::new(&root);
        state.expand_all(&root);
        let options = OrgChartOptions::default();
        let layout = state.layout(&root, &options);

        assert_eq!(layout.cards.len(), 5);
        let a = layout.card("a").unwrap();
        let a1 = layout.card("a1").unwrap();
        let a2 = layout.card("a2").unwrap();
        let b = layout.card("b").unwrap();
        assert_eq!(a1.y, a2.y);
        assert!(a1.x + a1.width <= a2.x);
        assert!(a2.x + a2.width <= b.x);
        assert_eq!(a.center_x(), (a1.center_x() + a2.center_x()) / 2);
        assert!(a1.y > a.y);

        let buses = layout
            .connectors
            .iter()
            .filter(|connector| connector.kind == ConnectorKind::Bus)
            .count();
        assert_eq!(buses, 2);
        assert_eq!(layout.width, 3 * options.card_width + 2 * options.horizontal_gap);
    }

    #[test]
    fn collapsed_children_are_not_laid_out() {
        let root = sample();
        let state = OrgChartState::new(&root);
        let layout = state.layout(&root, &OrgChartOptions::default());
        let ids: Vec<&str> = layout.cards.iter().map(|card| card.id.as_str()).collect();
        assert_eq!(ids, ["root", "a", "b"]);
    }

    #[test]
    fn toggle_ignores_leaves() {
        let root = sample();
        let mut state = OrgChartState::new(&root);
        assert_eq!(state.toggle(&root, "b"), None);
        assert_eq!(state.toggle(&root, "a"), Some(true));
    }

    #[test]
    fn render_text_draws_names_and_markers() {
        let root = sample();
        let state = OrgChartState::new(&root);
        let text = state.layout(&root, &OrgChartOptions::default()).render_text();
        assert!(text.contains("ROOT [-]"));
        assert!(text.contains("A [+2]"));
        assert!(text.lines().count() >= 5);
    }
}
