use crate::error::Result;
use crate::mutation::Batch;
use crate::node::ArchId;

/// Indentation level of a non-list block.
pub const INDENT_ATTRIBUTE: &str = "data-indent";

impl Batch<'_> {
    /// Nests the selected list items one level deeper; other selected
    /// blocks get their indentation level raised.
    pub fn indent(&mut self) -> Result<()> {
        let (items, blocks) = self.selected_blocks();
        for group in self.sibling_runs(&items) {
            self.indent_items(&group)?;
        }
        for block in blocks {
            self.shift_indent(block, true)?;
        }
        Ok(())
    }

    /// Lifts the selected list items one level; top-level items become
    /// paragraphs and split their list.
    pub fn outdent(&mut self) -> Result<()> {
        let (items, blocks) = self.selected_blocks();
        for group in self.sibling_runs(&items) {
            self.outdent_items(&group)?;
        }
        for block in blocks {
            self.shift_indent(block, false)?;
        }
        Ok(())
    }

    /// Flips the checked state of an item in a checklist. Returns whether
    /// the item ends up checked.
    pub fn toggle_checked(&mut self, item: ArchId) -> Result<bool> {
        let tree = self.tree();
        let list = &self.config().list;
        let in_checklist = tree.is_list_item(item)
            && tree
                .parent(item)
                .and_then(|parent| tree.node(parent))
                .is_some_and(|parent| parent.is_list() && parent.attributes().has_class(&list.checklist_class));
        if !in_checklist {
            tracing::warn!(id = %item, op = "toggle_checked", "not a checklist item");
            return Ok(false);
        }
        let class = list.checked_class.clone();
        self.toggle_class(item, &class)
    }

    /// List items and plain blocks touched by the range, in document order.
    fn selected_blocks(&self) -> (Vec<ArchId>, Vec<ArchId>) {
        let tree = self.tree();
        let range = self.range();
        let start = self.resolve(range.start);
        let end = self.resolve(range.end);
        let end_leaf = match tree.children(end.id) {
            children if end.offset > 0 && !children.is_empty() => {
                tree.last_descendant(children[(end.offset - 1).min(children.len() - 1)])
            }
            _ => end.id,
        };
        let end_path = tree.path(end_leaf);

        let mut nodes = vec![start.id];
        let mut current = start.id;
        while current != end_leaf {
            match tree.next_in_order(current) {
                Some(next) if tree.path(next) <= end_path => {
                    nodes.push(next);
                    current = next;
                }
                _ => break,
            }
        }

        let mut items = Vec::new();
        let mut blocks = Vec::new();
        for node in nodes {
            if let Some(item) = tree.closest(node, |tree, n| tree.is_list_item(n)) {
                if !items.contains(&item) && !self.is_indent_wrapper(item) {
                    items.push(item);
                }
            } else if let Some(block) = self.block_of(node) {
                if !blocks.contains(&block) && !tree.is_list(block) {
                    blocks.push(block);
                }
            }
        }
        (items, blocks)
    }

    fn sibling_runs(&self, ids: &[ArchId]) -> Vec<Vec<ArchId>> {
        let mut runs: Vec<Vec<ArchId>> = Vec::new();
        for id in ids {
            match runs.last_mut() {
                Some(run) if run.last().and_then(|last| self.tree().next_sibling(*last)) == Some(*id) => {
                    run.push(*id);
                }
                _ => runs.push(vec![*id]),
            }
        }
        runs
    }

    /// A list item holding nothing but a nested list, marked with the
    /// configured indent class.
    fn is_indent_wrapper(&self, id: ArchId) -> bool {
        let tree = self.tree();
        let class = &self.config().list.indent_class;
        tree.node(id)
            .is_some_and(|node| node.is_list_item() && node.attributes().has_class(class))
            && matches!(tree.children(id), [only] if tree.is_list(*only))
    }

    fn nested_list_of(&self, wrapper: ArchId, list: ArchId) -> Option<ArchId> {
        if !self.is_indent_wrapper(wrapper) {
            return None;
        }
        let tree = self.tree();
        let nested = *tree.children(wrapper).first()?;
        let same_name = tree.node(nested)?.name() == tree.node(list)?.name();
        same_name.then_some(nested)
    }

    fn indent_items(&mut self, group: &[ArchId]) -> Result<()> {
        let Some(&first) = group.first() else {
            return Ok(());
        };
        let Some(list) = self.tree().parent(first) else {
            return Ok(());
        };
        self.ensure_editable(list)?;

        let previous = self
            .tree()
            .prev_sibling(first)
            .and_then(|prev| self.nested_list_of(prev, list));
        let nested = match previous {
            Some(nested) => nested,
            None => {
                let class = self.config().list.indent_class.clone();
                let tree = self.tree_mut();
                let wrapper = tree.create_element("li");
                tree.attributes_mut(wrapper)?.add_class(&class);
                let nested = tree.clone_shallow(list)?;
                tree.append_child(wrapper, nested)?;
                tree.insert_before(first, wrapper)?;
                nested
            }
        };
        for item in group {
            self.tree_mut().append_child(nested, *item)?;
        }

        let wrapper = self.tree().parent(nested);
        let following = wrapper
            .and_then(|w| self.tree().next_sibling(w))
            .and_then(|next| self.nested_list_of(next, list).map(|l| (next, l)));
        if let Some((next_wrapper, next_list)) = following {
            let tree = self.tree_mut();
            for child in tree.children(next_list).to_vec() {
                tree.append_child(nested, child)?;
            }
            tree.delete(next_wrapper)?;
        }
        Ok(())
    }

    fn outdent_items(&mut self, group: &[ArchId]) -> Result<()> {
        let (Some(&first), Some(&last)) = (group.first(), group.last()) else {
            return Ok(());
        };
        let Some(list) = self.tree().parent(first) else {
            return Ok(());
        };
        self.ensure_editable(list)?;

        let tree = self.tree();
        let following: Vec<ArchId> = tree
            .index_of(last)
            .map(|ix| tree.children(list)[ix + 1..].to_vec())
            .unwrap_or_default();
        let wrapper = tree
            .parent(list)
            .filter(|w| tree.is_list_item(*w) && tree.parent(*w).is_some_and(|o| tree.is_list(o)));

        match wrapper {
            Some(wrapper) => {
                self.ensure_editable(wrapper)?;
                let tree = self.tree_mut();
                if !following.is_empty() {
                    let rest_wrapper = tree.clone_shallow(wrapper)?;
                    let rest_list = tree.clone_shallow(list)?;
                    tree.append_child(rest_wrapper, rest_list)?;
                    for item in following {
                        tree.append_child(rest_list, item)?;
                    }
                    tree.insert_after(wrapper, rest_wrapper)?;
                }
                let mut anchor = wrapper;
                for item in group {
                    tree.insert_after(anchor, *item)?;
                    anchor = *item;
                }
                if tree.children(list).is_empty() {
                    tree.delete(list)?;
                    if tree.children(wrapper).is_empty() {
                        tree.delete(wrapper)?;
                    }
                }
            }
            None => {
                let tree = self.tree_mut();
                if !following.is_empty() {
                    let rest = tree.clone_shallow(list)?;
                    for item in following {
                        tree.append_child(rest, item)?;
                    }
                    tree.insert_after(list, rest)?;
                }
                let mut anchor = list;
                for item in group {
                    anchor = self.unlist_item(*item, anchor)?;
                }
                let tree = self.tree_mut();
                if tree.children(list).is_empty() {
                    tree.delete(list)?;
                }
            }
        }
        Ok(())
    }

    /// Replaces a list item by plain blocks placed after `anchor`; loose
    /// inline content is gathered into paragraphs. Returns the last block.
    fn unlist_item(&mut self, item: ArchId, anchor: ArchId) -> Result<ArchId> {
        let tree = self.tree_mut();
        let mut anchor = anchor;
        let mut paragraph: Option<ArchId> = None;
        let children = tree.children(item).to_vec();
        if children.is_empty() {
            let p = tree.create_element("p");
            tree.insert_after(anchor, p)?;
            anchor = p;
        }
        for child in children {
            if tree.is_block(child) {
                tree.insert_after(anchor, child)?;
                anchor = child;
                paragraph = None;
                continue;
            }
            let target = match paragraph {
                Some(p) => p,
                None => {
                    let p = tree.create_element("p");
                    tree.insert_after(anchor, p)?;
                    anchor = p;
                    paragraph = Some(p);
                    p
                }
            };
            tree.append_child(target, child)?;
        }
        tree.delete(item)?;
        Ok(anchor)
    }

    fn shift_indent(&mut self, block: ArchId, deeper: bool) -> Result<()> {
        self.ensure_editable(block)?;
        let max = self.config().max_indent_level;
        let tree = self.tree_mut();
        let current: usize = tree
            .get(block)?
            .attributes()
            .get(INDENT_ATTRIBUTE)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let next = if deeper {
            (current + 1).min(max)
        } else {
            current.saturating_sub(1)
        };
        if next == current {
            return Ok(());
        }
        let attributes = tree.attributes_mut(block)?;
        if next == 0 {
            attributes.remove(INDENT_ATTRIBUTE);
        } else {
            attributes.set(INDENT_ATTRIBUTE, &next.to_string());
        }
        Ok(())
    }
}
