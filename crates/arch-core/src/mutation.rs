use serde::{Deserialize, Serialize};

use crate::config::EditorConfig;
use crate::error::{ArchError, Result};
use crate::markup::parse_markup;
use crate::node::{ArchId, ArchJson, NodeType};
use crate::range::{self, ArchPoint, ArchRange};
use crate::registry::NodeRole;
use crate::rules::unwrap_node;
use crate::tree::{ArchTree, split_chars};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDirection {
    Backward,
    Forward,
}

/// Mutation handle for one batch. Constraint checks are skipped while
/// `bypass` is set; the flag lives and dies with the batch.
pub struct Batch<'a> {
    pub(crate) tree: &'a mut ArchTree,
    pub(crate) range: &'a mut ArchRange,
    pub(crate) config: &'a EditorConfig,
    pub(crate) bypass: bool,
}

impl<'a> Batch<'a> {
    pub(crate) fn new(
        tree: &'a mut ArchTree,
        range: &'a mut ArchRange,
        config: &'a EditorConfig,
        bypass: bool,
    ) -> Self {
        Self {
            tree,
            range,
            config,
            bypass,
        }
    }

    pub fn tree(&self) -> &ArchTree {
        self.tree
    }

    /// Raw tree access for trusted rewrites; no constraint checks apply.
    pub fn tree_mut(&mut self) -> &mut ArchTree {
        self.tree
    }

    pub fn range(&self) -> ArchRange {
        *self.range
    }

    pub fn set_range(&mut self, range: ArchRange) {
        *self.range = range::resolve_range(self.tree, range);
    }

    pub fn config(&self) -> &EditorConfig {
        self.config
    }

    pub fn is_bypassing(&self) -> bool {
        self.bypass
    }

    // ---- constraints ----

    pub(crate) fn ensure_editable(&self, id: ArchId) -> Result<()> {
        self.tree.get(id)?;
        if self.bypass || self.tree.is_editable(id) {
            Ok(())
        } else {
            Err(ArchError::NotEditable(id))
        }
    }

    pub(crate) fn ensure_breakable(&self, id: ArchId) -> Result<()> {
        if self.breakable(id) {
            Ok(())
        } else {
            Err(ArchError::Unbreakable(id))
        }
    }

    fn breakable(&self, id: ArchId) -> bool {
        self.bypass || !self.tree.is_unbreakable(id)
    }

    fn removable(&self, id: ArchId) -> bool {
        self.bypass
            || (self.tree.parent(id).is_some_and(|p| self.tree.is_editable(p))
                && !self.tree.is_unbreakable(id))
    }

    // ---- coordinates ----

    pub(crate) fn resolve(&self, point: ArchPoint) -> ArchPoint {
        let resolved = range::resolve_point(self.tree, point);
        if resolved.id != point.id {
            tracing::debug!(from = %point.id, to = %resolved.id, "point moved to a live node");
        }
        resolved
    }

    /// The container a point edits: the parent for text, the node otherwise.
    fn container_of(&self, point: ArchPoint) -> ArchId {
        match self.tree.node_type(point.id) {
            Some(t) if t.is_text_like() => self.tree.parent(point.id).unwrap_or(point.id),
            _ => point.id,
        }
    }

    /// Turns a point into a child position, splitting text when the point
    /// falls inside it.
    pub(crate) fn child_position(&mut self, point: ArchPoint) -> Result<(ArchId, usize)> {
        let node_type = self.tree.get(point.id)?.node_type();
        if !node_type.is_text_like() {
            return Ok((point.id, point.offset.min(self.tree.length(point.id))));
        }
        let (parent, index) = self.tree.position(point.id)?;
        if point.offset == 0 || node_type != NodeType::Text {
            return Ok((parent, index));
        }
        if point.offset >= self.tree.length(point.id) {
            return Ok((parent, index + 1));
        }
        self.tree.split_text(point.id, point.offset)?;
        Ok((parent, index + 1))
    }

    /// Moves a point out of a non-editable zone, right after the zone.
    fn editable_point(&self, at: ArchPoint) -> Result<ArchPoint> {
        let container = self.container_of(at);
        if self.bypass || self.tree.is_editable(container) {
            return Ok(at);
        }
        let mut top = container;
        while let Some(parent) = self.tree.parent(top) {
            if self.tree.is_editable(parent) {
                let index = self.tree.index_of(top).unwrap_or(0);
                tracing::warn!(id = %container, to = %parent, "redirected insertion out of a non-editable zone");
                return Ok(ArchPoint::new(parent, index + 1));
            }
            top = parent;
        }
        Err(ArchError::NotEditable(container))
    }

    /// Nearest enclosing block that can hold text, excluding lists and the
    /// root.
    pub(crate) fn block_of(&self, id: ArchId) -> Option<ArchId> {
        self.tree.closest(id, |tree, n| {
            n != tree.root() && tree.is_block(n) && !tree.is_list(n)
        })
    }

    fn is_blank(&self, id: ArchId) -> bool {
        match self.tree.children(id) {
            [] => true,
            [only] => self.tree.node(*only).is_some_and(|n| n.is_placeholder()),
            _ => false,
        }
    }

    fn drop_if_empty(&mut self, id: ArchId) -> Result<()> {
        if self.tree.contains(id) && self.tree.children(id).is_empty() {
            self.tree.delete(id)?;
        }
        Ok(())
    }

    // ---- insert ----

    /// Inserts content at the range, replacing a non-collapsed selection.
    pub fn insert(&mut self, content: &ArchJson) -> Result<Vec<ArchId>> {
        if !self.range.is_collapsed() {
            self.remove_range()?;
        }
        let at = self.range.start;
        self.insert_at(content, at)
    }

    pub fn insert_markup(&mut self, markup: &str) -> Result<Vec<ArchId>> {
        let content = parse_markup(self.tree.registry(), markup);
        self.insert(&content)
    }

    /// Inserts a node or a fragment's children at a point. Block content
    /// splits the inline ancestry so it lands in a container that accepts
    /// blocks.
    pub fn insert_at(&mut self, content: &ArchJson, at: ArchPoint) -> Result<Vec<ArchId>> {
        let at = self.editable_point(self.resolve(at))?;
        let ids = self.tree.build(content)?;
        let Some(&last) = ids.last() else {
            return Ok(ids);
        };

        let (mut parent, mut index) = self.child_position(at)?;
        let has_blocks = ids.iter().any(|id| self.tree.is_block(*id));
        let mut halves = Vec::new();
        if has_blocks {
            while !self.tree.accepts_blocks(parent) {
                if !self.breakable(parent) {
                    tracing::warn!(id = %parent, "inserting blocks inside an unbreakable node");
                    break;
                }
                let Some(grand) = self.tree.parent(parent) else {
                    break;
                };
                let right = self.split_container(parent, index)?;
                halves.push(parent);
                halves.push(right);
                index = self.tree.index_of(right).unwrap_or(0);
                parent = grand;
            }
        }

        for (offset, id) in ids.iter().enumerate() {
            self.tree.insert_child(parent, index + offset, *id)?;
        }
        for half in halves {
            if self.tree.contains(half) && self.is_blank(half) {
                self.tree.delete(half)?;
            }
        }
        self.consume_placeholders(parent, &ids, has_blocks)?;

        *self.range = ArchRange::collapsed(range::end_of(self.tree, last));
        Ok(ids)
    }

    fn consume_placeholders(&mut self, parent: ArchId, ids: &[ArchId], has_blocks: bool) -> Result<()> {
        let consumes = ids
            .iter()
            .any(|id| !self.tree.is_line_break(*id) && !self.tree.is_virtual(*id));
        if !consumes {
            return Ok(());
        }
        let (first, last) = (ids[0], ids[ids.len() - 1]);
        if let Some(prev) = self.tree.prev_sibling(first).filter(|p| self.tree.is_virtual(*p)) {
            self.tree.delete(prev)?;
        }
        if let Some(next) = self.tree.next_sibling(last).filter(|n| self.tree.is_virtual(*n)) {
            self.tree.delete(next)?;
        }
        if !has_blocks {
            let others: Vec<ArchId> = self
                .tree
                .children(parent)
                .iter()
                .copied()
                .filter(|c| !ids.contains(c))
                .collect();
            if let [only] = others.as_slice() {
                if self.tree.is_line_break(*only) {
                    self.tree.delete(*only)?;
                }
            }
        }
        Ok(())
    }

    pub fn insert_text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        if !self.range.is_collapsed() {
            self.remove_range()?;
        }
        let at = self.editable_point(self.resolve(self.range.start))?;
        let count = text.chars().count();

        if self.tree.is_text(at.id) {
            self.ensure_editable(self.container_of(at))?;
            let value = self.tree.get(at.id)?.value();
            let (head, tail) = split_chars(value, at.offset);
            let joined = format!("{head}{text}{tail}");
            self.tree.set_value(at.id, joined)?;
            *self.range = ArchRange::collapsed(ArchPoint::new(at.id, at.offset + count));
            return Ok(());
        }

        if !self.tree.is_virtual(at.id) && self.tree.is_container(at.id) {
            self.ensure_editable(at.id)?;
            let children = self.tree.children(at.id);
            let before = at.offset.checked_sub(1).and_then(|ix| children.get(ix)).copied();
            let after = children.get(at.offset).copied();
            if let Some(prev) = before.filter(|p| self.tree.is_text(*p)) {
                let value = format!("{}{text}", self.tree.get(prev)?.value());
                self.tree.set_value(prev, value)?;
                let end = self.tree.length(prev);
                *self.range = ArchRange::collapsed(ArchPoint::new(prev, end));
                return Ok(());
            }
            if let Some(next) = after.filter(|n| self.tree.is_text(*n)) {
                let value = format!("{text}{}", self.tree.get(next)?.value());
                self.tree.set_value(next, value)?;
                *self.range = ArchRange::collapsed(ArchPoint::new(next, count));
                return Ok(());
            }
        }

        self.insert_at(&ArchJson::text(text), at)?;
        Ok(())
    }

    // ---- remove ----

    pub fn remove_node(&mut self, id: ArchId) -> Result<()> {
        self.tree.get(id)?;
        let (parent, index) = match self.tree.position(id) {
            Ok(position) => position,
            Err(_) => return Err(ArchError::Unbreakable(id)),
        };
        self.ensure_editable(parent)?;
        self.ensure_breakable(id)?;
        let range_inside = [self.range.start.id, self.range.end.id]
            .iter()
            .any(|p| *p == id || self.tree.is_ancestor(id, *p));
        self.tree.delete(id)?;
        if range_inside {
            *self.range = ArchRange::collapsed(self.caret_near(parent, index));
        }
        Ok(())
    }

    /// Caret for a hole left at `index` of `parent`: the start of the next
    /// sibling, else the end of the previous one.
    fn caret_near(&self, parent: ArchId, index: usize) -> ArchPoint {
        let children = self.tree.children(parent);
        if let Some(&next) = children.get(index) {
            return range::start_of(self.tree, next);
        }
        match index.checked_sub(1).and_then(|ix| children.get(ix)) {
            Some(&prev) => range::end_of(self.tree, prev),
            None => ArchPoint::new(parent, index),
        }
    }

    /// Removes everything the range covers and joins the blocks at its
    /// edges. Protected nodes inside the range are kept.
    pub fn remove_range(&mut self) -> Result<()> {
        let range = *self.range;
        if range.is_collapsed() {
            return Ok(());
        }
        let (start, end) = self.boundaries(range)?;
        let mut kept = false;
        for id in self.covered(start, end) {
            kept |= !self.remove_covered(id)?;
        }

        if let (Some(a), Some(b)) = (self.block_of(start.0), self.block_of(end.0)) {
            let nested = a == b || self.tree.is_ancestor(a, b) || self.tree.is_ancestor(b, a);
            if !nested && !kept {
                if let Err(err) = self.merge_blocks(a, b) {
                    if !err.is_refusal() {
                        return Err(err);
                    }
                    tracing::warn!(%err, "kept the edges of the removed range apart");
                }
            }
        }
        *self.range = ArchRange::collapsed(ArchPoint::new(start.0, start.1));
        Ok(())
    }

    /// Returns false when a protected node had to be kept.
    fn remove_covered(&mut self, id: ArchId) -> Result<bool> {
        if !self.tree.contains(id) {
            return Ok(true);
        }
        if !self.removable(id) {
            tracing::warn!(id = %id, op = "remove", "kept a protected node inside the removed range");
            return Ok(false);
        }
        let protected_inside = !self.bypass
            && !self
                .tree
                .descendants(id, |tree, d| tree.is_unbreakable(d))
                .is_empty();
        if protected_inside {
            let mut removed = true;
            for child in self.tree.children(id).to_vec() {
                removed &= self.remove_covered(child)?;
            }
            return Ok(removed);
        }
        self.tree.delete(id)?;
        Ok(true)
    }

    /// Resolves a range into two child positions, splitting text at both
    /// edges.
    pub(crate) fn boundaries(&mut self, range: ArchRange) -> Result<((ArchId, usize), (ArchId, usize))> {
        let start = self.resolve(range.start);
        let end = self.resolve(range.end);
        let (end_parent, end_index) = self.child_position(end)?;
        let marker = self.tree.children(end_parent).get(end_index).copied();
        let start = self.child_position(start)?;
        let end_index = match marker {
            Some(marker) => self.tree.index_of(marker).unwrap_or(end_index),
            None => self.tree.children(end_parent).len(),
        };
        Ok((start, (end_parent, end_index)))
    }

    /// Maximal nodes lying entirely between two child positions, in
    /// document order.
    pub(crate) fn covered(&self, start: (ArchId, usize), end: (ArchId, usize)) -> Vec<ArchId> {
        let tree = &*self.tree;
        if start.0 == end.0 {
            let children = tree.children(start.0);
            let to = end.1.min(children.len());
            return children.get(start.1..to).map(<[ArchId]>::to_vec).unwrap_or_default();
        }
        let Some(common) = tree.common_ancestor(start.0, end.0) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let (mut node, mut from) = start;
        while node != common {
            out.extend(tree.children(node).iter().skip(from).copied());
            from = tree.index_of(node).map_or(0, |ix| ix + 1);
            match tree.parent(node) {
                Some(parent) => node = parent,
                None => return out,
            }
        }

        let mut right: Vec<Vec<ArchId>> = Vec::new();
        let (mut node, mut to) = end;
        while node != common {
            right.push(tree.children(node).iter().take(to).copied().collect());
            to = tree.index_of(node).unwrap_or(0);
            match tree.parent(node) {
                Some(parent) => node = parent,
                None => break,
            }
        }

        let middle = tree.children(common);
        let to = to.min(middle.len());
        if from < to {
            out.extend(middle[from..to].iter().copied());
        }
        for run in right.into_iter().rev() {
            out.extend(run);
        }
        out
    }

    // ---- split ----

    /// Splits `id` at `offset` (chars for text, children for containers) and
    /// keeps splitting its ancestors until the parent is `until`. Returns
    /// the node that starts the second half.
    pub fn split(&mut self, id: ArchId, offset: usize, until: Option<ArchId>) -> Result<Option<ArchId>> {
        let node_type = self.tree.get(id)?.node_type();
        if self.tree.is_voidoid(id) {
            return Ok(None);
        }
        if node_type == NodeType::VirtualText || node_type == NodeType::ArchitecturalSpace {
            let (parent, index) = self.tree.position(id)?;
            if until == Some(parent) {
                return Ok(None);
            }
            return self.split(parent, index, until);
        }
        self.ensure_breakable(id)?;
        self.ensure_editable(self.container_of(ArchPoint::new(id, 0)))?;

        let mut created = if node_type == NodeType::Text {
            self.tree.split_text(id, offset)?
        } else {
            self.split_container(id, offset)?
        };

        match until.filter(|u| *u != id) {
            Some(until) if self.tree.is_ancestor(until, id) => {
                created = self.split_ancestry(created, until)?;
            }
            Some(until) => {
                tracing::warn!(id = %id, until = %until, "split boundary is not an ancestor");
            }
            None => {}
        }

        *self.range = ArchRange::collapsed(range::start_of(self.tree, created));
        Ok(Some(created))
    }

    /// Splits at the caret up to the enclosing block, or up to the root.
    pub fn split_at_range(&mut self, until_root: bool) -> Result<Option<ArchId>> {
        if !self.range.is_collapsed() {
            self.remove_range()?;
        }
        let at = self.resolve(self.range.start);
        let Some(block) = self.block_of(at.id) else {
            return Ok(None);
        };
        let until = if until_root {
            self.tree.root()
        } else {
            self.tree.parent(block).unwrap_or(self.tree.root())
        };
        if self.tree.is_text(at.id) {
            return self.split(at.id, at.offset, Some(until));
        }
        let (container, index) = self.child_position(at)?;
        self.split(container, index, Some(until))
    }

    /// Splits the ancestors of `node` until its parent is `until`; stops
    /// early at an unbreakable ancestor.
    fn split_ancestry(&mut self, mut node: ArchId, until: ArchId) -> Result<ArchId> {
        while let Some(parent) = self.tree.parent(node) {
            if parent == until {
                break;
            }
            if !self.breakable(parent) {
                tracing::warn!(id = %parent, op = "split", "stopped splitting at an unbreakable ancestor");
                break;
            }
            let index = self.tree.index_of(node).unwrap_or(0);
            node = self.split_container(parent, index)?;
        }
        Ok(node)
    }

    /// Splits `container` at `index` and every ancestor up to `stop`
    /// (exclusive), refusing to cut an unbreakable node.
    fn split_up(&mut self, container: ArchId, index: usize, stop: ArchId) -> Result<ArchId> {
        self.ensure_breakable(container)?;
        let mut created = self.split_container(container, index)?;
        while let Some(parent) = self.tree.parent(created) {
            if parent == stop {
                break;
            }
            self.ensure_breakable(parent)?;
            let index = self.tree.index_of(created).unwrap_or(0);
            created = self.split_container(parent, index)?;
        }
        Ok(created)
    }

    fn split_container(&mut self, id: ArchId, offset: usize) -> Result<ArchId> {
        if !self.tree.is_container(id) || offset > self.tree.children(id).len() {
            return Err(ArchError::InvalidOffset { id, offset });
        }
        let clone = self.tree.clone_shallow(id)?;
        self.tree.insert_after(id, clone)?;
        for child in self.tree.children(id)[offset..].to_vec() {
            self.tree.append_child(clone, child)?;
        }
        Ok(clone)
    }

    // ---- merge ----

    /// Joins the block holding `id` with its neighbour. Returns whether a
    /// merge happened.
    pub fn merge(&mut self, id: ArchId, direction: MergeDirection) -> Result<bool> {
        self.tree.get(id)?;
        let Some(block) = self.block_of(id) else {
            return Ok(false);
        };
        let pair = match direction {
            MergeDirection::Backward => self.neighbour_block(block, false)?.map(|prev| (prev, block)),
            MergeDirection::Forward => self.neighbour_block(block, true)?.map(|next| (block, next)),
        };
        let Some((target, source)) = pair else {
            return Ok(false);
        };
        self.merge_blocks(target, source)?;
        Ok(true)
    }

    /// The block just before (or after) `block` in document order, refusing
    /// to cross an unbreakable boundary on the way.
    fn neighbour_block(&self, block: ArchId, forward: bool) -> Result<Option<ArchId>> {
        let mut node = block;
        loop {
            let sibling = if forward {
                self.tree.next_sibling(node)
            } else {
                self.tree.prev_sibling(node)
            };
            if let Some(sibling) = sibling {
                return self.deepest_block(sibling, forward);
            }
            let Some(parent) = self.tree.parent(node) else {
                return Ok(None);
            };
            if parent == self.tree.root() {
                return Ok(None);
            }
            self.ensure_breakable(parent)?;
            node = parent;
        }
    }

    fn deepest_block(&self, node: ArchId, first: bool) -> Result<Option<ArchId>> {
        let mut current = node;
        loop {
            if !self.tree.is_block(current) {
                return Ok(None);
            }
            self.ensure_breakable(current)?;
            let children = self.tree.children(current);
            let child = if first { children.first() } else { children.last() };
            match child {
                Some(child) if self.tree.is_block(*child) && !self.tree.is_voidoid(current) => {
                    current = *child;
                }
                _ => return Ok(Some(current)),
            }
        }
    }

    fn merge_blocks(&mut self, target: ArchId, source: ArchId) -> Result<()> {
        self.ensure_breakable(target)?;
        self.ensure_breakable(source)?;
        if self.tree.is_voidoid(target) {
            let parent = self.tree.parent(target).ok_or(ArchError::Unbreakable(target))?;
            self.ensure_editable(parent)?;
            self.tree.delete(target)?;
            *self.range = ArchRange::collapsed(range::start_of(self.tree, source));
            return Ok(());
        }
        if self.tree.is_voidoid(source) {
            let parent = self.tree.parent(source).ok_or(ArchError::Unbreakable(source))?;
            self.ensure_editable(parent)?;
            self.tree.delete(source)?;
            *self.range = ArchRange::collapsed(range::end_of(self.tree, target));
            return Ok(());
        }
        self.ensure_editable(target)?;
        self.ensure_editable(source)?;

        for block in [target, source] {
            if self.is_blank(block) {
                for child in self.tree.children(block).to_vec() {
                    self.tree.delete(child)?;
                }
            }
        }
        let caret = range::end_of(self.tree, target);
        let accepts_blocks = self.tree.accepts_blocks(target);
        let mut after = target;
        for child in self.tree.children(source).to_vec() {
            if self.tree.is_block(child) && !accepts_blocks {
                self.tree.insert_after(after, child)?;
                after = child;
            } else {
                self.tree.append_child(target, child)?;
            }
        }
        self.remove_emptied(source, target)?;
        *self.range = ArchRange::collapsed(caret);
        Ok(())
    }

    /// Deletes an emptied node and the ancestors it leaves empty.
    fn remove_emptied(&mut self, node: ArchId, keep: ArchId) -> Result<()> {
        let mut node = node;
        loop {
            let parent = self.tree.parent(node);
            self.tree.delete(node)?;
            match parent {
                Some(p)
                    if p != self.tree.root()
                        && p != keep
                        && !self.tree.is_ancestor(p, keep)
                        && self.tree.children(p).is_empty()
                        && self.breakable(p) =>
                {
                    node = p;
                }
                _ => return Ok(()),
            }
        }
    }

    // ---- deletion at the caret ----

    pub fn delete_backward(&mut self) -> Result<()> {
        if !self.range.is_collapsed() {
            return self.remove_range();
        }
        let at = self.resolve(self.range.start);
        if self.tree.is_text(at.id) && at.offset > 0 {
            return self.remove_chars(at.id, at.offset - 1);
        }
        let Some(block) = self.block_of(at.id) else {
            return Ok(());
        };
        match self.leaf_before(at, block) {
            Some(leaf) if self.tree.is_text(leaf) => {
                let len = self.tree.length(leaf);
                self.remove_chars(leaf, len - 1)
            }
            Some(leaf) => self.remove_leaf(leaf),
            None => self.merge(block, MergeDirection::Backward).map(|_| ()),
        }
    }

    pub fn delete_forward(&mut self) -> Result<()> {
        if !self.range.is_collapsed() {
            return self.remove_range();
        }
        let at = self.resolve(self.range.start);
        if self.tree.is_text(at.id) && at.offset < self.tree.length(at.id) {
            return self.remove_chars(at.id, at.offset);
        }
        let Some(block) = self.block_of(at.id) else {
            return Ok(());
        };
        match self.leaf_after(at, block) {
            Some(leaf) if self.tree.is_text(leaf) => {
                self.remove_chars(leaf, 0)?;
                *self.range = ArchRange::collapsed(at);
                Ok(())
            }
            Some(leaf) => {
                self.remove_leaf(leaf)?;
                *self.range = ArchRange::collapsed(at);
                Ok(())
            }
            None => self.merge(block, MergeDirection::Forward).map(|_| ()),
        }
    }

    fn remove_chars(&mut self, id: ArchId, offset: usize) -> Result<()> {
        self.ensure_editable(self.container_of(ArchPoint::new(id, offset)))?;
        let value = self.tree.get(id)?.value();
        let (head, rest) = split_chars(value, offset);
        let (_, tail) = split_chars(rest, 1);
        let joined = format!("{head}{tail}");
        self.tree.set_value(id, joined)?;
        *self.range = ArchRange::collapsed(ArchPoint::new(id, offset));
        Ok(())
    }

    fn remove_leaf(&mut self, leaf: ArchId) -> Result<()> {
        let (parent, index) = self.tree.position(leaf)?;
        self.ensure_editable(parent)?;
        self.ensure_breakable(leaf)?;
        self.tree.delete(leaf)?;
        *self.range = ArchRange::collapsed(ArchPoint::new(parent, index));
        Ok(())
    }

    fn is_content_leaf(&self, id: ArchId) -> bool {
        (self.tree.is_text(id) && self.tree.length(id) > 0) || self.tree.is_voidoid(id)
    }

    /// Last visible leaf before the point inside `block`.
    fn leaf_before(&self, at: ArchPoint, block: ArchId) -> Option<ArchId> {
        let mut current = if self.tree.is_container(at.id) && at.offset > 0 {
            self.tree
                .children(at.id)
                .get(at.offset - 1)
                .map(|c| self.tree.last_descendant(*c))
        } else {
            self.tree.prev_in_order(at.id)
        };
        while let Some(id) = current {
            if id == block || !self.tree.is_ancestor(block, id) {
                return None;
            }
            if self.is_content_leaf(id) {
                return Some(id);
            }
            current = self.tree.prev_in_order(id);
        }
        None
    }

    /// First visible leaf after the point inside `block`.
    fn leaf_after(&self, at: ArchPoint, block: ArchId) -> Option<ArchId> {
        let inside = self.tree.is_container(at.id) && at.offset < self.tree.children(at.id).len();
        let mut current = if inside {
            self.tree.children(at.id).get(at.offset).copied()
        } else {
            self.next_after(at.id)
        };
        while let Some(id) = current {
            if id == block || !self.tree.is_ancestor(block, id) {
                return None;
            }
            if self.is_content_leaf(id) {
                return Some(id);
            }
            current = self.tree.next_in_order(id);
        }
        None
    }

    fn next_after(&self, id: ArchId) -> Option<ArchId> {
        let mut current = id;
        loop {
            if let Some(next) = self.tree.next_sibling(current) {
                return Some(next);
            }
            current = self.tree.parent(current)?;
        }
    }

    // ---- wrap / unwrap ----

    /// Wraps the range in a new `name` element. Inline wrappers descend into
    /// the covered blocks; block wrappers take whole blocks.
    pub fn wrap(&mut self, name: &str) -> Result<Vec<ArchId>> {
        let range = *self.range;
        if range.is_collapsed() {
            let at = self.editable_point(self.resolve(range.start))?;
            let (parent, index) = self.child_position(at)?;
            self.ensure_editable(parent)?;
            let wrapper = self.tree.create_element(name);
            let placeholder = self.tree.create_virtual_text();
            self.tree.insert_child(parent, index, wrapper)?;
            self.tree.append_child(wrapper, placeholder)?;
            *self.range = ArchRange::collapsed(ArchPoint::new(placeholder, 0));
            return Ok(vec![wrapper]);
        }

        let (start, end) = self.boundaries(range)?;
        let block_wrapper = self.tree.registry().spec(name).role == NodeRole::Block;
        let mut targets: Vec<ArchId> = Vec::new();
        for id in self.covered(start, end) {
            if block_wrapper {
                let block = if self.tree.is_block(id) {
                    id
                } else {
                    self.tree
                        .ancestor(id, |tree, a| a != tree.root() && tree.is_block(a))
                        .unwrap_or(id)
                };
                if !targets.contains(&block) {
                    targets.push(block);
                }
            } else {
                self.inline_targets(id, &mut targets);
            }
        }
        let nested: Vec<ArchId> = targets
            .iter()
            .copied()
            .filter(|t| targets.iter().any(|o| self.tree.is_ancestor(*o, *t)))
            .collect();
        targets.retain(|t| !nested.contains(t));

        let wrappers = self.wrap_nodes(&targets, name)?;
        if let (Some(first), Some(last)) = (wrappers.first(), wrappers.last()) {
            *self.range = ArchRange::new(
                range::start_of(self.tree, *first),
                range::end_of(self.tree, *last),
                range.direction,
            );
        }
        Ok(wrappers)
    }

    fn inline_targets(&self, id: ArchId, out: &mut Vec<ArchId>) {
        if self.tree.is_block(id) && self.tree.is_container(id) {
            for child in self.tree.children(id) {
                self.inline_targets(*child, out);
            }
        } else {
            out.push(id);
        }
    }

    /// Wraps each run of contiguous siblings among `ids` in a new element.
    pub fn wrap_nodes(&mut self, ids: &[ArchId], name: &str) -> Result<Vec<ArchId>> {
        let root = self.tree.root();
        let mut ordered: Vec<ArchId> = ids
            .iter()
            .copied()
            .filter(|id| *id != root && self.tree.is_active(*id))
            .collect();
        ordered.sort_by_cached_key(|id| self.tree.path(*id));
        ordered.dedup();

        let mut runs: Vec<Vec<ArchId>> = Vec::new();
        for id in ordered {
            match runs.last_mut() {
                Some(run) if run.last().and_then(|last| self.tree.next_sibling(*last)) == Some(id) => {
                    run.push(id);
                }
                _ => runs.push(vec![id]),
            }
        }

        let mut wrappers = Vec::new();
        for run in runs {
            let (parent, index) = self.tree.position(run[0])?;
            if !self.bypass && !self.tree.is_editable(parent) {
                tracing::warn!(id = %parent, op = "wrap", "skipped nodes in a non-editable container");
                continue;
            }
            let wrapper = self.tree.create_element(name);
            self.tree.insert_child(parent, index, wrapper)?;
            for id in run {
                self.tree.append_child(wrapper, id)?;
            }
            wrappers.push(wrapper);
        }
        Ok(wrappers)
    }

    /// Removes the ancestors matching `pred` from the range, splitting them
    /// so content outside the range keeps its wrapper. Returns how many
    /// wrappers were removed.
    pub fn unwrap(&mut self, pred: &dyn Fn(&ArchTree, ArchId) -> bool) -> Result<usize> {
        let matches = |tree: &ArchTree, id: ArchId| id != tree.root() && pred(tree, id);
        let range = *self.range;

        if range.is_collapsed() {
            let at = self.resolve(range.start);
            let Some(target) = self.tree.closest(self.container_of(at), matches) else {
                return Ok(0);
            };
            let parent = self.tree.parent(target).ok_or(ArchError::Unbreakable(target))?;
            self.ensure_editable(parent)?;
            self.ensure_breakable(target)?;
            let (container, index) = self.child_position(at)?;
            let right = self.split_up(container, index, parent)?;
            let placeholder = self.tree.create_virtual_text();
            self.tree.insert_before(right, placeholder)?;
            self.drop_if_empty(target)?;
            self.drop_if_empty(right)?;
            *self.range = ArchRange::collapsed(ArchPoint::new(placeholder, 0));
            return Ok(1);
        }

        let (start, end) = self.boundaries(range)?;
        let covered = self.covered(start, end);
        let (Some(&first_node), Some(&last_node)) = (covered.first(), covered.last()) else {
            return Ok(0);
        };
        let first = self.tree.first_leaf(first_node);
        let last = self.tree.last_descendant(last_node);
        let mut count = 0;

        let mut inside = Vec::new();
        for id in &covered {
            if matches(self.tree, *id) {
                inside.push(*id);
            }
            inside.extend(self.tree.descendants(*id, matches));
        }
        for id in inside {
            if self.unwrappable(id) {
                unwrap_node(self.tree, id)?;
                count += 1;
            }
        }

        let mut around: Vec<ArchId> = Vec::new();
        for leaf in [first, last] {
            for ancestor in self.tree.ancestors(leaf) {
                if matches(self.tree, ancestor) && !around.contains(&ancestor) {
                    around.push(ancestor);
                }
            }
        }
        for target in around {
            if !self.tree.contains(target) || !self.unwrappable(target) {
                continue;
            }
            let Some(parent) = self.tree.parent(target) else {
                continue;
            };
            if self.tree.is_ancestor(target, last) {
                let (container, index) = self.tree.position(last)?;
                let right = self.split_up(container, index + 1, parent)?;
                self.drop_if_empty(right)?;
            }
            let middle = if self.tree.is_ancestor(target, first) {
                let (container, index) = self.tree.position(first)?;
                let middle = self.split_up(container, index, parent)?;
                self.drop_if_empty(target)?;
                middle
            } else {
                target
            };
            unwrap_node(self.tree, middle)?;
            count += 1;
        }

        *self.range = ArchRange::new(
            range::start_of(self.tree, first),
            range::end_of(self.tree, last),
            range.direction,
        );
        Ok(count)
    }

    fn unwrappable(&self, id: ArchId) -> bool {
        let allowed = self.removable(id);
        if !allowed {
            tracing::warn!(id = %id, op = "unwrap", "kept a protected wrapper");
        }
        allowed
    }

    // ---- attributes ----

    pub fn set_attribute(&mut self, id: ArchId, name: &str, value: &str) -> Result<()> {
        self.ensure_editable(id)?;
        self.tree.attributes_mut(id)?.set(name, value);
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: ArchId, name: &str) -> Result<Option<String>> {
        self.ensure_editable(id)?;
        Ok(self.tree.attributes_mut(id)?.remove(name))
    }

    pub fn add_class(&mut self, id: ArchId, class: &str) -> Result<bool> {
        self.ensure_editable(id)?;
        Ok(self.tree.attributes_mut(id)?.add_class(class))
    }

    pub fn remove_class(&mut self, id: ArchId, class: &str) -> Result<bool> {
        self.ensure_editable(id)?;
        Ok(self.tree.attributes_mut(id)?.remove_class(class))
    }

    /// Returns whether the class is present afterwards.
    pub fn toggle_class(&mut self, id: ArchId, class: &str) -> Result<bool> {
        self.ensure_editable(id)?;
        Ok(self.tree.attributes_mut(id)?.toggle_class(class))
    }

    pub fn set_style(&mut self, id: ArchId, property: &str, value: &str) -> Result<()> {
        self.ensure_editable(id)?;
        self.tree.attributes_mut(id)?.set_style(property, value);
        Ok(())
    }
}
