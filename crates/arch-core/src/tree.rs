use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::attributes::Attributes;
use crate::error::{ArchError, Result};
use crate::node::{ArchId, ArchJson, ArchNode, NodeSnapshot, NodeType};
use crate::registry::{ArchRegistry, ChildConstraint, NodeRole, NodeSpec};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub keep_virtual: bool,
    pub architectural_space: bool,
    pub show_ids: bool,
}

impl ExportOptions {
    pub fn keep_virtual(mut self, keep: bool) -> Self {
        self.keep_virtual = keep;
        self
    }

    pub fn architectural_space(mut self, space: bool) -> Self {
        self.architectural_space = space;
        self
    }

    pub fn show_ids(mut self, show: bool) -> Self {
        self.show_ids = show;
        self
    }
}

/// Where a removed id went, so stale coordinates can be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tombstone {
    Removed { parent: ArchId, index: usize },
    MergedInto { id: ArchId, shift: usize },
}

/// Arena of nodes addressed by id. Parent links are lookups only; the
/// `children` lists are the ownership edges.
#[derive(Clone)]
pub struct ArchTree {
    nodes: HashMap<ArchId, ArchNode>,
    root: ArchId,
    next_id: u32,
    registry: Arc<ArchRegistry>,
    dirty: BTreeSet<ArchId>,
    /// Tombstones stamped with a burial sequence number, oldest pruned first.
    tombstones: HashMap<ArchId, (u64, Tombstone)>,
    burials: u64,
}

impl ArchTree {
    pub fn new(registry: Arc<ArchRegistry>) -> Self {
        let root = ArchId(1);
        let mut nodes = HashMap::new();
        nodes.insert(root, ArchNode::new(root, NodeType::Root, "ROOT"));
        let mut dirty = BTreeSet::new();
        dirty.insert(root);
        Self {
            nodes,
            root,
            next_id: 2,
            registry,
            dirty,
            tombstones: HashMap::new(),
            burials: 0,
        }
    }

    pub fn root(&self) -> ArchId {
        self.root
    }

    pub fn registry(&self) -> &ArchRegistry {
        &self.registry
    }

    pub(crate) fn registry_arc(&self) -> Arc<ArchRegistry> {
        self.registry.clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    pub fn contains(&self, id: ArchId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: ArchId) -> Option<&ArchNode> {
        self.nodes.get(&id)
    }

    pub fn get(&self, id: ArchId) -> Result<&ArchNode> {
        self.nodes.get(&id).ok_or(ArchError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: ArchId) -> Result<&mut ArchNode> {
        self.nodes.get_mut(&id).ok_or(ArchError::UnknownNode(id))
    }

    pub fn tombstone(&self, id: ArchId) -> Option<Tombstone> {
        self.tombstones.get(&id).map(|(_, tombstone)| *tombstone)
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    fn bury(&mut self, id: ArchId, tombstone: Tombstone) {
        self.burials += 1;
        self.tombstones.insert(id, (self.burials, tombstone));
    }

    /// Forgets the oldest tombstones once there are more than `max`, keeping
    /// the newest half.
    pub(crate) fn prune_tombstones(&mut self, max: usize) {
        if self.tombstones.len() <= max {
            return;
        }
        let keep = max / 2;
        let mut stamps: Vec<u64> = self.tombstones.values().map(|(stamp, _)| *stamp).collect();
        stamps.sort_unstable_by(|a, b| b.cmp(a));
        let Some(&oldest_kept) = keep.checked_sub(1).and_then(|ix| stamps.get(ix)) else {
            self.tombstones.clear();
            return;
        };
        self.tombstones.retain(|_, (stamp, _)| *stamp >= oldest_kept);
        tracing::debug!(kept = self.tombstones.len(), "pruned tombstones");
    }

    pub fn ids(&self) -> impl Iterator<Item = ArchId> + '_ {
        self.nodes.keys().copied()
    }

    // ---- creation & low-level mutation ----

    fn alloc(&mut self, node_type: NodeType, name: &str) -> ArchId {
        let id = ArchId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, ArchNode::new(id, node_type, name));
        self.dirty.insert(id);
        id
    }

    /// Creates a detached element, typed by the registry's node table.
    pub fn create_element(&mut self, name: &str) -> ArchId {
        let spec = self.registry.spec(name);
        let name = name.to_ascii_lowercase();
        self.alloc(spec.node_type, &name)
    }

    pub fn create_text(&mut self, value: &str) -> ArchId {
        let id = self.alloc(NodeType::Text, "TEXT");
        if let Some(node) = self.nodes.get_mut(&id) {
            node.value = value.to_string();
        }
        id
    }

    pub fn create_virtual_text(&mut self) -> ArchId {
        self.alloc(NodeType::VirtualText, "TEXT-VIRTUAL")
    }

    pub fn create_line_break(&mut self) -> ArchId {
        self.alloc(NodeType::LineBreak, "br")
    }

    /// Fresh node with the same type, name and attributes, no children.
    pub fn clone_shallow(&mut self, id: ArchId) -> Result<ArchId> {
        let source = self.get(id)?;
        let (node_type, name, attributes, value) = (
            source.node_type,
            source.name.clone(),
            source.attributes.clone(),
            source.value.clone(),
        );
        let clone = self.alloc(node_type, &name);
        if let Some(node) = self.nodes.get_mut(&clone) {
            node.attributes = attributes;
            node.value = value;
        }
        Ok(clone)
    }

    /// Builds detached nodes from an export record. Fragments are flattened
    /// into their children.
    pub fn build(&mut self, json: &ArchJson) -> Result<Vec<ArchId>> {
        if json.node_type == NodeType::Fragment || json.node_type == NodeType::Root {
            let mut ids = Vec::new();
            for child in json.children() {
                ids.extend(self.build(child)?);
            }
            return Ok(ids);
        }

        let name = json
            .node_name
            .clone()
            .unwrap_or_else(|| json.node_type.default_name().to_string());
        let id = match json.node_type {
            NodeType::Element | NodeType::List | NodeType::ListItem | NodeType::Void => {
                let node_type = self
                    .registry
                    .node_spec(&name)
                    .map(|spec| spec.node_type)
                    .unwrap_or(json.node_type);
                self.alloc(node_type, &name.to_ascii_lowercase())
            }
            other => self.alloc(other, &name),
        };
        {
            let node = self.get_mut(id)?;
            node.attributes = json.attributes.clone();
            if node.node_type == NodeType::Text || node.node_type == NodeType::ArchitecturalSpace {
                node.value = json.node_value.clone().unwrap_or_default();
            }
        }

        let accepts_children = self.get(id)?.node_type.is_container();
        if !json.children().is_empty() && !accepts_children {
            tracing::warn!(id = %id, "dropping children of a childless node");
        }
        if accepts_children {
            for child in json.children() {
                for child_id in self.build(child)? {
                    let at = self.children(id).len();
                    self.insert_child(id, at, child_id)?;
                }
            }
        }
        Ok(vec![id])
    }

    pub fn insert_child(&mut self, parent: ArchId, index: usize, child: ArchId) -> Result<()> {
        if !self.get(parent)?.node_type.is_container() {
            return Err(ArchError::InvalidContent(format!(
                "{parent} cannot contain children"
            )));
        }
        if child == parent || self.is_ancestor(child, parent) {
            return Err(ArchError::InvalidContent(format!(
                "{child} cannot be moved inside itself"
            )));
        }
        let mut index = index;
        if self.get(child)?.parent.is_some() {
            let (old_parent, old_index) = self.detach(child)?;
            if old_parent == parent && old_index < index {
                index -= 1;
            }
        }
        let len = self.children(parent).len();
        if index > len {
            return Err(ArchError::InvalidOffset { id: parent, offset: index });
        }
        self.get_mut(parent)?.children.insert(index, child);
        self.get_mut(child)?.parent = Some(parent);
        self.tombstones.remove(&child);
        self.dirty.insert(parent);
        Ok(())
    }

    pub fn append_child(&mut self, parent: ArchId, child: ArchId) -> Result<()> {
        let at = self.children(parent).len();
        self.insert_child(parent, at, child)
    }

    pub fn insert_before(&mut self, reference: ArchId, node: ArchId) -> Result<()> {
        let (parent, index) = self.position(reference)?;
        self.insert_child(parent, index, node)
    }

    pub fn insert_after(&mut self, reference: ArchId, node: ArchId) -> Result<()> {
        let (parent, index) = self.position(reference)?;
        self.insert_child(parent, index + 1, node)
    }

    /// Detaches a node from its parent and returns where it was.
    pub fn detach(&mut self, id: ArchId) -> Result<(ArchId, usize)> {
        let (parent, index) = self.position(id)?;
        self.get_mut(parent)?.children.remove(index);
        self.get_mut(id)?.parent = None;
        self.dirty.insert(parent);
        Ok((parent, index))
    }

    /// Removes a node and its whole subtree from the arena.
    pub fn delete(&mut self, id: ArchId) -> Result<()> {
        if id == self.root {
            return Err(ArchError::Unbreakable(id));
        }
        let (parent, index) = match self.get(id)?.parent {
            Some(_) => self.detach(id)?,
            None => (self.root, 0),
        };
        self.drop_subtree(id, Tombstone::Removed { parent, index });
        Ok(())
    }

    pub(crate) fn delete_merged(&mut self, id: ArchId, into: ArchId, shift: usize) -> Result<()> {
        if self.get(id)?.parent.is_some() {
            self.detach(id)?;
        }
        self.drop_subtree(id, Tombstone::MergedInto { id: into, shift });
        Ok(())
    }

    fn drop_subtree(&mut self, id: ArchId, tombstone: Tombstone) {
        let mut stack = vec![(id, tombstone)];
        while let Some((id, tombstone)) = stack.pop() {
            let Some(node) = self.nodes.remove(&id) else {
                continue;
            };
            for (index, child) in node.children.iter().enumerate() {
                stack.push((*child, Tombstone::Removed { parent: id, index }));
            }
            self.bury(id, tombstone);
            self.dirty.remove(&id);
        }
    }

    pub fn set_value(&mut self, id: ArchId, value: String) -> Result<()> {
        let node = self.get_mut(id)?;
        if node.node_type != NodeType::Text && node.node_type != NodeType::ArchitecturalSpace {
            return Err(ArchError::InvalidContent(format!("{id} holds no text")));
        }
        if node.value != value {
            node.value = value;
            self.dirty.insert(id);
        }
        Ok(())
    }

    pub fn attributes_mut(&mut self, id: ArchId) -> Result<&mut Attributes> {
        self.get(id)?;
        self.dirty.insert(id);
        Ok(&mut self.get_mut(id)?.attributes)
    }

    /// Changes the type and name of a node in place, keeping its identity.
    pub fn retag(&mut self, id: ArchId, name: &str) -> Result<()> {
        let spec = self.registry.spec(name);
        let node = self.get_mut(id)?;
        if !node.node_type.is_container() || !spec.node_type.is_container() {
            return Err(ArchError::InvalidContent(format!(
                "cannot retag {id} as {name}"
            )));
        }
        node.node_type = spec.node_type;
        node.name = name.to_ascii_lowercase();
        self.dirty.insert(id);
        Ok(())
    }

    pub fn mark_dirty(&mut self, id: ArchId) {
        if self.contains(id) {
            self.dirty.insert(id);
        }
    }

    pub(crate) fn take_dirty(&mut self) -> BTreeSet<ArchId> {
        std::mem::take(&mut self.dirty)
    }

    /// Splits a text node at a char offset; the tail goes to a new sibling.
    pub fn split_text(&mut self, id: ArchId, offset: usize) -> Result<ArchId> {
        let node = self.get(id)?;
        if node.node_type != NodeType::Text {
            return Err(ArchError::InvalidContent(format!("{id} is not a text node")));
        }
        let len = node.length();
        if offset > len {
            return Err(ArchError::InvalidOffset { id, offset });
        }
        let (head, tail) = split_chars(&node.value, offset);
        let (head, tail) = (head.to_string(), tail.to_string());
        let tail_id = self.create_text(&tail);
        self.set_value(id, head)?;
        if self.get(id)?.parent.is_some() {
            self.insert_after(id, tail_id)?;
        }
        Ok(tail_id)
    }

    /// Applies flat snapshots, restoring identities, then drops whatever is
    /// no longer reachable from the root.
    pub fn import_snapshots(&mut self, states: &[NodeSnapshot]) -> Result<()> {
        for state in states {
            if !self.nodes.contains_key(&state.id) {
                let name = state
                    .node_name
                    .clone()
                    .unwrap_or_else(|| state.node_type.default_name().to_string());
                self.nodes
                    .insert(state.id, ArchNode::new(state.id, state.node_type, &name));
                self.next_id = self.next_id.max(state.id.0 + 1);
                self.tombstones.remove(&state.id);
            }
            let node = self.get_mut(state.id)?;
            node.node_type = state.node_type;
            if let Some(name) = &state.node_name {
                node.name = name.clone();
            }
            node.attributes = state.attributes.clone();
            if state.node_type.is_text_like() {
                node.value = state.node_value.clone().unwrap_or_default();
            }
            self.dirty.insert(state.id);
        }

        for state in states {
            let children: Vec<ArchId> = state
                .child_nodes
                .iter()
                .copied()
                .filter(|child| {
                    let known = self.nodes.contains_key(child);
                    if !known {
                        tracing::warn!(id = %child, parent = %state.id, "snapshot references an unknown node");
                    }
                    known
                })
                .collect();

            let previous = std::mem::take(&mut self.get_mut(state.id)?.children);
            for child in previous {
                if let Some(node) = self.nodes.get_mut(&child) {
                    if node.parent == Some(state.id) {
                        node.parent = None;
                    }
                }
            }
            for &child in &children {
                let old_parent = self.nodes.get(&child).and_then(|n| n.parent);
                if let Some(old_parent) = old_parent.filter(|p| *p != state.id) {
                    if let Some(parent) = self.nodes.get_mut(&old_parent) {
                        parent.children.retain(|c| *c != child);
                    }
                    self.dirty.insert(old_parent);
                }
                if let Some(node) = self.nodes.get_mut(&child) {
                    node.parent = Some(state.id);
                }
            }
            self.get_mut(state.id)?.children = children;
        }

        self.collect_unreachable();
        Ok(())
    }

    pub(crate) fn collect_unreachable(&mut self) {
        let reachable: HashSet<ArchId> = self.descendants_inclusive(self.root).into_iter().collect();
        let orphans: Vec<ArchId> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| !reachable.contains(id))
            .collect();
        for id in orphans {
            self.nodes.remove(&id);
            self.dirty.remove(&id);
            self.bury(
                id,
                Tombstone::Removed {
                    parent: self.root,
                    index: 0,
                },
            );
        }
    }

    // ---- navigation ----

    pub fn parent(&self, id: ArchId) -> Option<ArchId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: ArchId) -> &[ArchId] {
        self.nodes.get(&id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn position(&self, id: ArchId) -> Result<(ArchId, usize)> {
        let parent = self
            .get(id)?
            .parent
            .ok_or_else(|| ArchError::InvalidContent(format!("{id} is detached")))?;
        let index = self
            .children(parent)
            .iter()
            .position(|c| *c == id)
            .ok_or(ArchError::UnknownNode(id))?;
        Ok((parent, index))
    }

    pub fn index_of(&self, id: ArchId) -> Option<usize> {
        self.position(id).ok().map(|(_, ix)| ix)
    }

    pub fn prev_sibling(&self, id: ArchId) -> Option<ArchId> {
        let (parent, index) = self.position(id).ok()?;
        index.checked_sub(1).map(|ix| self.children(parent)[ix])
    }

    pub fn next_sibling(&self, id: ArchId) -> Option<ArchId> {
        let (parent, index) = self.position(id).ok()?;
        self.children(parent).get(index + 1).copied()
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, id: ArchId) -> Vec<ArchId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(ancestor) = current {
            out.push(ancestor);
            current = self.parent(ancestor);
        }
        out
    }

    /// Nearest strict ancestor matching the predicate.
    pub fn ancestor(&self, id: ArchId, pred: impl Fn(&ArchTree, ArchId) -> bool) -> Option<ArchId> {
        self.ancestors(id).into_iter().find(|a| pred(self, *a))
    }

    /// Like [`ArchTree::ancestor`] but also tests the node itself.
    pub fn closest(&self, id: ArchId, pred: impl Fn(&ArchTree, ArchId) -> bool) -> Option<ArchId> {
        if self.contains(id) && pred(self, id) {
            return Some(id);
        }
        self.ancestor(id, pred)
    }

    pub fn is_ancestor(&self, ancestor: ArchId, id: ArchId) -> bool {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Preorder descendants of `id` (excluding it) matching the predicate.
    pub fn descendants(&self, id: ArchId, pred: impl Fn(&ArchTree, ArchId) -> bool) -> Vec<ArchId> {
        self.descendants_inclusive(id)
            .into_iter()
            .skip(1)
            .filter(|d| pred(self, *d))
            .collect()
    }

    fn descendants_inclusive(&self, id: ArchId) -> Vec<ArchId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Postorder walk: children before their parent.
    pub fn postorder(&self, id: ArchId) -> Vec<ArchId> {
        let mut out = Vec::new();
        fn walk(tree: &ArchTree, id: ArchId, out: &mut Vec<ArchId>) {
            for child in tree.children(id) {
                walk(tree, *child, out);
            }
            out.push(id);
        }
        walk(self, id, &mut out);
        out
    }

    /// Next node in depth-first document order.
    pub fn next_in_order(&self, id: ArchId) -> Option<ArchId> {
        if let Some(first) = self.children(id).first() {
            return Some(*first);
        }
        let mut current = id;
        loop {
            if let Some(next) = self.next_sibling(current) {
                return Some(next);
            }
            current = self.parent(current)?;
        }
    }

    /// Previous node in depth-first document order.
    pub fn prev_in_order(&self, id: ArchId) -> Option<ArchId> {
        match self.prev_sibling(id) {
            Some(prev) => Some(self.last_descendant(prev)),
            None => self.parent(id),
        }
    }

    pub fn next_matching(&self, id: ArchId, pred: impl Fn(&ArchTree, ArchId) -> bool) -> Option<ArchId> {
        let mut current = self.next_in_order(id);
        while let Some(node) = current {
            if pred(self, node) {
                return Some(node);
            }
            current = self.next_in_order(node);
        }
        None
    }

    pub fn prev_matching(&self, id: ArchId, pred: impl Fn(&ArchTree, ArchId) -> bool) -> Option<ArchId> {
        let mut current = self.prev_in_order(id);
        while let Some(node) = current {
            if pred(self, node) {
                return Some(node);
            }
            current = self.prev_in_order(node);
        }
        None
    }

    pub fn first_leaf(&self, id: ArchId) -> ArchId {
        let mut current = id;
        while let Some(first) = self.children(current).first() {
            current = *first;
        }
        current
    }

    pub fn last_descendant(&self, id: ArchId) -> ArchId {
        let mut current = id;
        while let Some(last) = self.children(current).last() {
            current = *last;
        }
        current
    }

    /// Child indexes from the root down to `id`.
    pub fn path(&self, id: ArchId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = id;
        while let Ok((parent, index)) = self.position(current) {
            path.push(index);
            current = parent;
        }
        path.reverse();
        path
    }

    pub fn is_active(&self, id: ArchId) -> bool {
        id == self.root || (self.contains(id) && self.is_ancestor(self.root, id))
    }

    pub fn common_ancestor(&self, a: ArchId, b: ArchId) -> Option<ArchId> {
        let mut chain_a = vec![a];
        chain_a.extend(self.ancestors(a));
        let mut current = Some(b);
        while let Some(node) = current {
            if chain_a.contains(&node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    pub fn length(&self, id: ArchId) -> usize {
        self.nodes.get(&id).map(ArchNode::length).unwrap_or(0)
    }

    pub fn find(&self, pred: impl Fn(&ArchTree, ArchId) -> bool) -> Option<ArchId> {
        self.descendants_inclusive(self.root)
            .into_iter()
            .find(|id| pred(self, *id))
    }

    pub fn find_all(&self, pred: impl Fn(&ArchTree, ArchId) -> bool) -> Vec<ArchId> {
        self.descendants_inclusive(self.root)
            .into_iter()
            .filter(|id| pred(self, *id))
            .collect()
    }

    /// Plain text with virtual text skipped and line breaks as `\n`.
    pub fn text_content(&self, id: ArchId) -> String {
        let mut out = String::new();
        for node in self.descendants_inclusive(id) {
            let Some(n) = self.node(node) else {
                continue;
            };
            match n.node_type {
                NodeType::Text => out.push_str(&n.value),
                NodeType::LineBreak => out.push('\n'),
                _ => {}
            }
        }
        out
    }

    // ---- predicates ----

    pub fn spec(&self, id: ArchId) -> NodeSpec {
        match self.nodes.get(&id) {
            Some(node) if node.node_type.has_name() => self
                .registry
                .node_spec(&node.name)
                .filter(|spec| spec.node_type == node.node_type)
                .cloned()
                .unwrap_or_else(|| NodeSpec::fallback(&node.name, node.node_type)),
            Some(node) => NodeSpec::fallback(&node.name, node.node_type),
            None => NodeSpec::fallback("", NodeType::Element),
        }
    }

    pub fn node_type(&self, id: ArchId) -> Option<NodeType> {
        self.nodes.get(&id).map(|n| n.node_type)
    }

    pub fn is_block(&self, id: ArchId) -> bool {
        self.spec(id).role == NodeRole::Block
    }

    pub fn is_inline(&self, id: ArchId) -> bool {
        self.contains(id) && !self.is_block(id)
    }

    pub fn is_text(&self, id: ArchId) -> bool {
        self.node(id).is_some_and(ArchNode::is_text)
    }

    pub fn is_virtual(&self, id: ArchId) -> bool {
        self.node(id).is_some_and(ArchNode::is_virtual)
    }

    pub fn is_line_break(&self, id: ArchId) -> bool {
        self.node(id).is_some_and(ArchNode::is_line_break)
    }

    pub fn is_list(&self, id: ArchId) -> bool {
        self.node(id).is_some_and(ArchNode::is_list)
    }

    pub fn is_list_item(&self, id: ArchId) -> bool {
        self.node(id).is_some_and(ArchNode::is_list_item)
    }

    /// Void nodes, line breaks and anything a host check flags as voidoid.
    pub fn is_voidoid(&self, id: ArchId) -> bool {
        match self.node_type(id) {
            Some(NodeType::Void | NodeType::LineBreak) => true,
            Some(_) => self.registry.voidoid_checks().iter().any(|check| check(self, id)),
            None => false,
        }
    }

    /// Containers that may hold children and are not voidoid.
    pub fn is_container(&self, id: ArchId) -> bool {
        self.node_type(id).is_some_and(NodeType::is_container) && !self.is_voidoid(id)
    }

    pub fn accepts_inline(&self, id: ArchId) -> bool {
        self.is_container(id)
            && matches!(
                self.spec(id).children,
                ChildConstraint::InlineOnly | ChildConstraint::Any
            )
    }

    pub fn accepts_blocks(&self, id: ArchId) -> bool {
        self.is_container(id)
            && matches!(
                self.spec(id).children,
                ChildConstraint::BlockOnly | ChildConstraint::Any
            )
    }

    /// The first host check with an opinion wins, walking up from the node;
    /// the root is editable unless a check says otherwise.
    pub fn is_editable(&self, id: ArchId) -> bool {
        if !self.contains(id) {
            return false;
        }
        let mut current = Some(id);
        while let Some(node) = current {
            for check in self.registry.editable_checks() {
                if let Some(verdict) = check(self, node) {
                    return verdict;
                }
            }
            current = self.parent(node);
        }
        true
    }

    /// The root, host-flagged nodes, and the top of a non-editable zone.
    pub fn is_unbreakable(&self, id: ArchId) -> bool {
        if id == self.root {
            return true;
        }
        if !self.contains(id) {
            return false;
        }
        if self.registry.unbreakable_checks().iter().any(|check| check(self, id)) {
            return true;
        }
        match self.parent(id) {
            Some(parent) => self.is_editable(parent) && !self.is_editable(id),
            None => false,
        }
    }

    // ---- export ----

    pub fn snapshot(&self, id: ArchId) -> Option<NodeSnapshot> {
        self.nodes.get(&id).map(ArchNode::snapshot)
    }

    pub fn snapshot_all(&self) -> Vec<NodeSnapshot> {
        self.descendants_inclusive(self.root)
            .into_iter()
            .filter_map(|id| self.snapshot(id))
            .collect()
    }

    pub fn to_json(&self, id: Option<ArchId>, options: ExportOptions) -> Option<ArchJson> {
        let id = id.unwrap_or(self.root);
        self.to_json_at(id, options, 0)
    }

    fn to_json_at(&self, id: ArchId, options: ExportOptions, depth: usize) -> Option<ArchJson> {
        let node = self.nodes.get(&id)?;
        match node.node_type {
            NodeType::VirtualText if !options.keep_virtual => return None,
            NodeType::ArchitecturalSpace if !options.architectural_space => return None,
            _ => {}
        }

        let children = if node.node_type.is_container() {
            let nested = if node.node_type == NodeType::Root || node.node_type == NodeType::Fragment {
                depth
            } else {
                depth + 1
            };
            let mut out: Vec<ArchJson> = Vec::new();
            let pretty = options.architectural_space
                && !node.children.is_empty()
                && node.children.iter().all(|c| self.is_block(*c));
            for child in &node.children {
                if pretty {
                    out.push(architectural_space(nested));
                }
                if let Some(json) = self.to_json_at(*child, options, nested) {
                    out.push(json);
                }
            }
            if pretty {
                out.push(architectural_space(depth));
            }
            Some(out)
        } else {
            None
        };

        let snapshot = node.snapshot();
        Some(ArchJson {
            id: Some(id),
            node_type: node.node_type,
            node_name: snapshot.node_name,
            attributes: snapshot.attributes,
            node_value: snapshot.node_value,
            children,
        })
    }

    pub fn to_string(&self, id: Option<ArchId>, options: ExportOptions) -> String {
        self.to_json(id, options)
            .map(|json| crate::markup::render(&json, options.show_ids))
            .unwrap_or_default()
    }
}

fn architectural_space(depth: usize) -> ArchJson {
    ArchJson {
        node_type: NodeType::ArchitecturalSpace,
        node_value: Some(format!("\n{}", "    ".repeat(depth))),
        ..ArchJson::text("")
    }
}

pub(crate) fn split_chars(s: &str, offset: usize) -> (&str, &str) {
    let byte = s
        .char_indices()
        .nth(offset)
        .map(|(ix, _)| ix)
        .unwrap_or(s.len());
    s.split_at(byte)
}
