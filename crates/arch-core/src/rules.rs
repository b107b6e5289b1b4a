use std::sync::Arc;

use crate::error::{ArchError, Result};
use crate::node::{ArchId, NodeType};
use crate::registry::{ArchPlugin, NodeCheck};
use crate::tree::ArchTree;

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    /// Rewrites the tree in place; returns whether anything changed.
    fn run(&self, tree: &mut ArchTree) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementFix {
    /// Wrap each contiguous run of offending siblings in a new element.
    WrapIn(String),
    /// Replace the offending node by its children.
    Unwrap,
    Remove,
}

/// "Nodes matching `child` may only be children of nodes matching `parent`."
#[derive(Clone)]
pub struct PlacementRule {
    pub name: String,
    pub child: NodeCheck,
    pub parent: NodeCheck,
    pub fix: PlacementFix,
}

impl PlacementRule {
    pub fn new(
        name: impl Into<String>,
        child: impl Fn(&ArchTree, ArchId) -> bool + Send + Sync + 'static,
        parent: impl Fn(&ArchTree, ArchId) -> bool + Send + Sync + 'static,
        fix: PlacementFix,
    ) -> Self {
        Self {
            name: name.into(),
            child: Arc::new(child),
            parent: Arc::new(parent),
            fix,
        }
    }

    pub fn is_violated(&self, tree: &ArchTree, id: ArchId) -> bool {
        let Some(parent) = tree.parent(id) else {
            return false;
        };
        (self.child)(tree, id) && !(self.parent)(tree, parent)
    }
}

/// Runs every registered pass until none reports a change.
pub fn normalize(tree: &mut ArchTree, max_iterations: usize) -> Result<()> {
    let registry = tree.registry_arc();
    for _ in 0..max_iterations.max(1) {
        let mut changed = false;
        for pass in registry.normalize_passes() {
            if pass.run(tree)? {
                tracing::trace!(pass = pass.id(), "normalize pass changed the tree");
                changed = true;
            }
        }
        if !changed {
            return Ok(());
        }
    }
    Err(ArchError::NormalizeDidNotConverge)
}

pub(crate) struct CoreRulesPlugin;

impl ArchPlugin for CoreRulesPlugin {
    fn id(&self) -> &'static str {
        "core.rules"
    }

    fn placement_rules(&self) -> Vec<PlacementRule> {
        vec![
            PlacementRule::new(
                "list-item-in-list",
                |tree, id| tree.is_list_item(id),
                |tree, parent| tree.is_list(parent) || !tree.accepts_blocks(parent),
                PlacementFix::WrapIn("ul".into()),
            ),
            PlacementRule::new(
                "list-holds-items",
                |tree, id| !tree.is_list_item(id),
                |tree, parent| !tree.is_list(parent),
                PlacementFix::WrapIn("li".into()),
            ),
            PlacementRule::new(
                "inline-in-block",
                |tree, id| tree.is_inline(id),
                |tree, parent| tree.accepts_inline(parent),
                PlacementFix::WrapIn("p".into()),
            ),
            PlacementRule::new(
                "block-in-inline",
                |tree, id| tree.is_block(id),
                |tree, parent| tree.accepts_blocks(parent),
                PlacementFix::Unwrap,
            ),
        ]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(StripArchitecturalSpace),
            Box::new(ApplyPlacementRules),
            Box::new(DropEmptyText),
            Box::new(MergeAdjacentText),
            Box::new(CollapseVirtualText),
            Box::new(RemoveEmptyInline),
            Box::new(RemoveEmptyList),
            Box::new(MergeAdjacentInline),
            Box::new(EnsurePlaceholder),
        ]
    }
}

struct StripArchitecturalSpace;

impl NormalizePass for StripArchitecturalSpace {
    fn id(&self) -> &'static str {
        "core.strip_architectural_space"
    }

    fn run(&self, tree: &mut ArchTree) -> Result<bool> {
        let spaces = tree.find_all(|tree, id| {
            tree.node_type(id) == Some(NodeType::ArchitecturalSpace)
        });
        for id in &spaces {
            tree.delete(*id)?;
        }
        Ok(!spaces.is_empty())
    }
}

struct ApplyPlacementRules;

impl NormalizePass for ApplyPlacementRules {
    fn id(&self) -> &'static str {
        "core.placement_rules"
    }

    fn run(&self, tree: &mut ArchTree) -> Result<bool> {
        let registry = tree.registry_arc();
        let mut changed = false;
        for id in tree.postorder(tree.root()) {
            if !tree.is_active(id) {
                continue;
            }
            let Some(rule) = registry
                .placement_rules()
                .iter()
                .find(|rule| rule.is_violated(tree, id))
            else {
                continue;
            };
            tracing::trace!(rule = %rule.name, id = %id, "placement rule violated");
            match &rule.fix {
                PlacementFix::WrapIn(name) => {
                    let (parent, index) = tree.position(id)?;
                    let mut run = vec![id];
                    for sibling in tree.children(parent)[index + 1..].iter() {
                        if !rule.is_violated(tree, *sibling) {
                            break;
                        }
                        run.push(*sibling);
                    }
                    let wrapper = tree.create_element(name);
                    tree.insert_child(parent, index, wrapper)?;
                    for node in run {
                        tree.append_child(wrapper, node)?;
                    }
                }
                PlacementFix::Unwrap if tree.is_voidoid(id) => lift_out(tree, id)?,
                PlacementFix::Unwrap => unwrap_node(tree, id)?,
                PlacementFix::Remove => {
                    tracing::warn!(rule = %rule.name, id = %id, "dropping misplaced node");
                    tree.delete(id)?;
                }
            }
            changed = true;
        }
        Ok(changed)
    }
}

/// Replaces a node by its children.
pub(crate) fn unwrap_node(tree: &mut ArchTree, id: ArchId) -> Result<()> {
    let (parent, index) = tree.position(id)?;
    let children = tree.children(id).to_vec();
    for (offset, child) in children.into_iter().enumerate() {
        tree.insert_child(parent, index + offset, child)?;
    }
    tree.delete(id)
}

/// Moves a voidoid node out of its parent, splitting the parent around it.
/// The parent goes away if nothing was on either side.
fn lift_out(tree: &mut ArchTree, id: ArchId) -> Result<()> {
    let (parent, index) = tree.position(id)?;
    let (grandparent, parent_index) = tree.position(parent)?;
    let trailing = tree.children(parent)[index + 1..].to_vec();
    tree.insert_child(grandparent, parent_index + 1, id)?;
    if !trailing.is_empty() {
        let tail = tree.clone_shallow(parent)?;
        tree.insert_child(grandparent, parent_index + 2, tail)?;
        for child in trailing {
            tree.append_child(tail, child)?;
        }
    }
    if tree.children(parent).is_empty() {
        tree.delete(parent)?;
    }
    Ok(())
}

struct DropEmptyText;

impl NormalizePass for DropEmptyText {
    fn id(&self) -> &'static str {
        "core.drop_empty_text"
    }

    fn run(&self, tree: &mut ArchTree) -> Result<bool> {
        let empty = tree.find_all(|tree, id| {
            tree.node(id)
                .is_some_and(|node| node.is_text() && node.value().is_empty())
        });
        for id in &empty {
            tree.delete(*id)?;
        }
        Ok(!empty.is_empty())
    }
}

struct MergeAdjacentText;

impl NormalizePass for MergeAdjacentText {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text"
    }

    fn run(&self, tree: &mut ArchTree) -> Result<bool> {
        let mut changed = false;
        for parent in tree.postorder(tree.root()) {
            let children = tree.children(parent).to_vec();
            let mut ix = 0;
            while ix < children.len() {
                let first = children[ix];
                ix += 1;
                if !tree.is_text(first) {
                    continue;
                }
                while ix < children.len() && tree.is_text(children[ix]) {
                    let next = children[ix];
                    let head = tree.get(first)?.value().to_string();
                    let shift = tree.length(first);
                    let tail = tree.get(next)?.value().to_string();
                    tree.set_value(first, head + &tail)?;
                    tree.delete_merged(next, first, shift)?;
                    changed = true;
                    ix += 1;
                }
            }
        }
        Ok(changed)
    }
}

struct CollapseVirtualText;

impl NormalizePass for CollapseVirtualText {
    fn id(&self) -> &'static str {
        "core.collapse_virtual_text"
    }

    fn run(&self, tree: &mut ArchTree) -> Result<bool> {
        let mut changed = false;
        for id in tree.find_all(|tree, id| tree.is_virtual(id)) {
            let is_real_text = |sibling: ArchId| {
                tree.node(sibling)
                    .is_some_and(|n| n.is_text() && !n.value().is_empty())
            };
            let redundant = tree
                .prev_sibling(id)
                .is_some_and(|prev| tree.is_virtual(prev) || is_real_text(prev))
                || tree.next_sibling(id).is_some_and(is_real_text);
            if redundant {
                tree.delete(id)?;
                changed = true;
            }
        }
        Ok(changed)
    }
}

struct RemoveEmptyInline;

impl NormalizePass for RemoveEmptyInline {
    fn id(&self) -> &'static str {
        "core.remove_empty_inline"
    }

    fn run(&self, tree: &mut ArchTree) -> Result<bool> {
        let empty = tree.find_all(|tree, id| {
            tree.node_type(id) == Some(NodeType::Element)
                && tree.is_inline(id)
                && !tree.is_voidoid(id)
                && tree.children(id).is_empty()
        });
        for id in &empty {
            tree.delete(*id)?;
        }
        Ok(!empty.is_empty())
    }
}

struct RemoveEmptyList;

impl NormalizePass for RemoveEmptyList {
    fn id(&self) -> &'static str {
        "core.remove_empty_list"
    }

    fn run(&self, tree: &mut ArchTree) -> Result<bool> {
        let empty = tree.find_all(|tree, id| tree.is_list(id) && tree.children(id).is_empty());
        for id in &empty {
            tree.delete(*id)?;
        }
        Ok(!empty.is_empty())
    }
}

struct MergeAdjacentInline;

impl NormalizePass for MergeAdjacentInline {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_inline"
    }

    fn run(&self, tree: &mut ArchTree) -> Result<bool> {
        let mut changed = false;
        for id in tree.postorder(tree.root()) {
            if !tree.contains(id) || !is_format_element(tree, id) {
                continue;
            }
            let Some(next) = tree.next_sibling(id) else {
                continue;
            };
            if !is_format_element(tree, next) {
                continue;
            }
            let (a, b) = (tree.get(id)?, tree.get(next)?);
            if a.name() != b.name() || !a.attributes().equivalent(b.attributes()) {
                continue;
            }
            for child in tree.children(next).to_vec() {
                tree.append_child(id, child)?;
            }
            tree.delete(next)?;
            changed = true;
        }
        Ok(changed)
    }
}

fn is_format_element(tree: &ArchTree, id: ArchId) -> bool {
    tree.node_type(id) == Some(NodeType::Element) && tree.is_inline(id) && !tree.is_voidoid(id)
}

struct EnsurePlaceholder;

impl NormalizePass for EnsurePlaceholder {
    fn id(&self) -> &'static str {
        "core.ensure_placeholder"
    }

    fn run(&self, tree: &mut ArchTree) -> Result<bool> {
        let root = tree.root();
        if tree.children(root).is_empty() {
            let paragraph = tree.create_element("p");
            tree.append_child(root, paragraph)?;
            return Ok(true);
        }

        let mut changed = false;
        for id in tree.postorder(root) {
            if id == root || !tree.is_block(id) || !tree.is_container(id) || tree.is_list(id) {
                continue;
            }
            let children = tree.children(id).to_vec();
            if children.is_empty() {
                let placeholder = tree.create_line_break();
                tree.append_child(id, placeholder)?;
                changed = true;
                continue;
            }
            if tree.accepts_inline(id) && children.iter().all(|c| tree.is_virtual(*c)) {
                for child in children {
                    tree.delete(child)?;
                }
                let placeholder = tree.create_line_break();
                tree.append_child(id, placeholder)?;
                changed = true;
            }
        }
        Ok(changed)
    }
}
