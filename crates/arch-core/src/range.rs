use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::node::{ArchId, NodeType};
use crate::tree::{ArchTree, Tombstone};

/// A tree coordinate: char offset inside text, child index inside containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchPoint {
    pub id: ArchId,
    pub offset: usize,
}

impl ArchPoint {
    pub fn new(id: ArchId, offset: usize) -> Self {
        Self { id, offset }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchRange {
    pub start: ArchPoint,
    pub end: ArchPoint,
    #[serde(default)]
    pub direction: Direction,
}

impl ArchRange {
    pub fn new(start: ArchPoint, end: ArchPoint, direction: Direction) -> Self {
        Self {
            start,
            end,
            direction,
        }
    }

    pub fn collapsed(point: ArchPoint) -> Self {
        Self::new(point, point, Direction::Forward)
    }

    /// Orders anchor and focus in document order and remembers the gesture
    /// direction.
    pub fn from_points(tree: &ArchTree, anchor: ArchPoint, focus: ArchPoint) -> Self {
        if compare_points(tree, focus, anchor) == Ordering::Less {
            Self::new(focus, anchor, Direction::Backward)
        } else {
            Self::new(anchor, focus, Direction::Forward)
        }
    }

    /// Selects the whole content of a node.
    pub fn select_node(tree: &ArchTree, id: ArchId) -> Self {
        Self::new(
            ArchPoint::new(id, 0),
            ArchPoint::new(id, tree.length(id)),
            Direction::Forward,
        )
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn collapse(&self, to_start: bool) -> Self {
        let point = if to_start { self.start } else { self.end };
        Self::collapsed(point)
    }

    pub fn anchor(&self) -> ArchPoint {
        match self.direction {
            Direction::Forward => self.start,
            Direction::Backward => self.end,
        }
    }

    pub fn focus(&self) -> ArchPoint {
        match self.direction {
            Direction::Forward => self.end,
            Direction::Backward => self.start,
        }
    }

    pub fn from_surface<M: SurfaceMap>(
        tree: &ArchTree,
        map: &M,
        selection: &SurfaceSelection<M::Node>,
    ) -> Option<Self> {
        let anchor = surface_point(tree, map, &selection.anchor_node, selection.anchor_offset)?;
        let focus = surface_point(tree, map, &selection.focus_node, selection.focus_offset)?;
        Some(Self::from_points(tree, anchor, focus))
    }

    pub fn to_surface<M: SurfaceMap>(
        &self,
        tree: &ArchTree,
        map: &M,
    ) -> Option<SurfaceSelection<M::Node>> {
        let to_surface = |point: ArchPoint| -> Option<(M::Node, usize)> {
            let node = map.surface_node(point.id)?;
            // The surface renders the placeholder sentinel as one character.
            let offset = if tree.is_virtual(point.id) {
                1
            } else {
                point.offset
            };
            Some((node, offset))
        };
        let (anchor_node, anchor_offset) = to_surface(self.anchor())?;
        let (focus_node, focus_offset) = to_surface(self.focus())?;
        Some(SurfaceSelection {
            anchor_node,
            anchor_offset,
            focus_node,
            focus_offset,
        })
    }
}

/// Bidirectional mapping between tree ids and presentation-surface nodes,
/// provided by the renderer.
pub trait SurfaceMap {
    type Node: Clone;

    fn arch_id(&self, node: &Self::Node) -> Option<ArchId>;
    fn surface_node(&self, id: ArchId) -> Option<Self::Node>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSelection<N> {
    pub anchor_node: N,
    pub anchor_offset: usize,
    pub focus_node: N,
    pub focus_offset: usize,
}

fn surface_point<M: SurfaceMap>(
    tree: &ArchTree,
    map: &M,
    node: &M::Node,
    offset: usize,
) -> Option<ArchPoint> {
    let Some(id) = map.arch_id(node) else {
        tracing::warn!("surface selection references an unmapped node");
        return None;
    };
    Some(resolve_point(tree, ArchPoint::new(id, offset)))
}

pub fn compare_points(tree: &ArchTree, a: ArchPoint, b: ArchPoint) -> Ordering {
    let key = |point: ArchPoint| {
        let mut path = tree.path(point.id);
        path.push(point.offset);
        path
    };
    key(a).cmp(&key(b))
}

/// Maps a possibly stale coordinate onto the live tree: removed ids fall
/// back through their tombstones, offsets are clamped, and positions on
/// voidoid nodes become positions in their parent.
pub fn resolve_point(tree: &ArchTree, point: ArchPoint) -> ArchPoint {
    let mut current = point;
    let mut hops = 0;
    while !tree.contains(current.id) {
        hops += 1;
        match tree.tombstone(current.id) {
            Some(Tombstone::MergedInto { id, shift }) => {
                current = ArchPoint::new(id, current.offset + shift);
            }
            Some(Tombstone::Removed { parent, index }) => {
                current = ArchPoint::new(parent, index);
            }
            None => return first_caret(tree),
        }
        if hops > 64 {
            return first_caret(tree);
        }
    }
    if !tree.is_active(current.id) {
        return first_caret(tree);
    }

    if tree.is_voidoid(current.id) && tree.node_type(current.id) != Some(NodeType::Root) {
        if let Ok((parent, index)) = tree.position(current.id) {
            let after = usize::from(current.offset > 0);
            return ArchPoint::new(parent, index + after);
        }
    }
    ArchPoint::new(current.id, current.offset.min(tree.length(current.id)))
}

pub fn resolve_range(tree: &ArchTree, range: ArchRange) -> ArchRange {
    let start = resolve_point(tree, range.start);
    let end = resolve_point(tree, range.end);
    if compare_points(tree, end, start) == Ordering::Less {
        ArchRange::new(end, start, range.direction)
    } else {
        ArchRange::new(start, end, range.direction)
    }
}

/// First caret position under the root.
pub fn first_caret(tree: &ArchTree) -> ArchPoint {
    let leaf = tree.first_leaf(tree.root());
    match tree.node(leaf) {
        Some(node) if node.node_type().is_text_like() => ArchPoint::new(leaf, 0),
        Some(node) if node.node_type().is_container() => ArchPoint::new(leaf, 0),
        Some(_) => match tree.position(leaf) {
            Ok((parent, index)) => ArchPoint::new(parent, index),
            Err(_) => ArchPoint::new(tree.root(), 0),
        },
        None => ArchPoint::new(tree.root(), 0),
    }
}

/// Caret at the very start of a node's content.
pub fn start_of(tree: &ArchTree, id: ArchId) -> ArchPoint {
    let leaf = tree.first_leaf(id);
    if tree.is_voidoid(leaf) && leaf != id {
        if let Ok((parent, index)) = tree.position(leaf) {
            return ArchPoint::new(parent, index);
        }
    }
    resolve_point(tree, ArchPoint::new(leaf, 0))
}

/// Caret at the very end of a node's content.
pub fn end_of(tree: &ArchTree, id: ArchId) -> ArchPoint {
    let leaf = tree.last_descendant(id);
    if tree.is_voidoid(leaf) {
        if let Ok((parent, index)) = tree.position(leaf) {
            return ArchPoint::new(parent, index + 1);
        }
    }
    ArchPoint::new(leaf, tree.length(leaf))
}
