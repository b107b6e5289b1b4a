use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::Editor;
use crate::error::{ArchError, Result};
use crate::node::{ArchId, NodeType};
use crate::rules::{NormalizePass, PlacementRule};
use crate::tree::ArchTree;

pub type EditableCheck = Arc<dyn Fn(&ArchTree, ArchId) -> Option<bool> + Send + Sync>;
pub type NodeCheck = Arc<dyn Fn(&ArchTree, ArchId) -> bool + Send + Sync>;
pub type CommandHandler = Arc<dyn Fn(&mut Editor, Option<Value>) -> Result<()> + Send + Sync>;
pub type QueryHandler = Arc<dyn Fn(&Editor, Option<Value>) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub handler: CommandHandler,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: QueryHandler,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&Editor, Option<Value>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Block,
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    None,
    BlockOnly,
    InlineOnly,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub node_type: NodeType,
    pub role: NodeRole,
    pub children: ChildConstraint,
}

impl NodeSpec {
    pub fn text_block(name: &str) -> Self {
        Self::new(name, NodeType::Element, NodeRole::Block, ChildConstraint::InlineOnly)
    }

    pub fn block_container(name: &str) -> Self {
        Self::new(name, NodeType::Element, NodeRole::Block, ChildConstraint::Any)
    }

    pub fn inline(name: &str) -> Self {
        Self::new(name, NodeType::Element, NodeRole::Inline, ChildConstraint::InlineOnly)
    }

    pub fn list(name: &str) -> Self {
        Self::new(name, NodeType::List, NodeRole::Block, ChildConstraint::BlockOnly)
    }

    pub fn list_item(name: &str) -> Self {
        Self::new(name, NodeType::ListItem, NodeRole::Block, ChildConstraint::Any)
    }

    pub fn void(name: &str, role: NodeRole) -> Self {
        Self::new(name, NodeType::Void, role, ChildConstraint::None)
    }

    fn new(name: &str, node_type: NodeType, role: NodeRole, children: ChildConstraint) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            node_type,
            role,
            children,
        }
    }

    /// Spec for names the registry does not know, derived from the node type.
    pub fn fallback(name: &str, node_type: NodeType) -> Self {
        let (role, children) = match node_type {
            NodeType::Root => (NodeRole::Block, ChildConstraint::BlockOnly),
            NodeType::Fragment => (NodeRole::Block, ChildConstraint::Any),
            NodeType::List => (NodeRole::Block, ChildConstraint::BlockOnly),
            NodeType::ListItem => (NodeRole::Block, ChildConstraint::Any),
            NodeType::Element => (NodeRole::Inline, ChildConstraint::Any),
            NodeType::Text
            | NodeType::VirtualText
            | NodeType::ArchitecturalSpace
            | NodeType::LineBreak
            | NodeType::Void => (NodeRole::Inline, ChildConstraint::None),
        };
        Self::new(name, node_type, role, children)
    }
}

pub trait ArchPlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn node_specs(&self) -> Vec<NodeSpec> {
        Vec::new()
    }
    fn placement_rules(&self) -> Vec<PlacementRule> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn editable_checks(&self) -> Vec<EditableCheck> {
        Vec::new()
    }
    fn unbreakable_checks(&self) -> Vec<NodeCheck> {
        Vec::new()
    }
    fn voidoid_checks(&self) -> Vec<NodeCheck> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

/// Per-session registry of node kinds, host predicates, rules and commands.
#[derive(Default)]
pub struct ArchRegistry {
    node_specs: HashMap<String, NodeSpec>,
    placement_rules: Vec<PlacementRule>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    editable_checks: Vec<EditableCheck>,
    unbreakable_checks: Vec<NodeCheck>,
    voidoid_checks: Vec<NodeCheck>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl ArchRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn ArchPlugin>>) -> Result<Self> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    pub fn core() -> Self {
        Self::new(core_plugins()).expect("core registry must be valid")
    }

    /// Core plugins followed by the host's own.
    pub fn with_plugins(plugins: impl IntoIterator<Item = Box<dyn ArchPlugin>>) -> Result<Self> {
        Self::new(core_plugins().into_iter().chain(plugins))
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn ArchPlugin>) -> Result<()> {
        for spec in plugin.node_specs() {
            if self.node_specs.contains_key(&spec.name) {
                return Err(ArchError::DuplicateRegistration(format!(
                    "node spec {} ({})",
                    spec.name,
                    plugin.id()
                )));
            }
            self.node_specs.insert(spec.name.clone(), spec);
        }

        self.placement_rules.extend(plugin.placement_rules());
        self.normalize_passes.extend(plugin.normalize_passes());
        self.editable_checks.extend(plugin.editable_checks());
        self.unbreakable_checks.extend(plugin.unbreakable_checks());
        self.voidoid_checks.extend(plugin.voidoid_checks());

        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(ArchError::DuplicateRegistration(format!("command {}", cmd.id)));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(ArchError::DuplicateRegistration(format!("query {}", query.id)));
            }
            self.queries.insert(query.id.clone(), query);
        }

        Ok(())
    }

    pub fn node_spec(&self, name: &str) -> Option<&NodeSpec> {
        self.node_specs.get(&name.to_ascii_lowercase())
    }

    pub fn spec(&self, name: &str) -> NodeSpec {
        self.node_spec(name)
            .cloned()
            .unwrap_or_else(|| NodeSpec::fallback(name, NodeType::Element))
    }

    pub fn node_specs(&self) -> &HashMap<String, NodeSpec> {
        &self.node_specs
    }

    pub fn placement_rules(&self) -> &[PlacementRule] {
        &self.placement_rules
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn editable_checks(&self) -> &[EditableCheck] {
        &self.editable_checks
    }

    pub fn unbreakable_checks(&self) -> &[NodeCheck] {
        &self.unbreakable_checks
    }

    pub fn voidoid_checks(&self) -> &[NodeCheck] {
        &self.voidoid_checks
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }
}

fn core_plugins() -> Vec<Box<dyn ArchPlugin>> {
    vec![
        Box::new(CoreNodesPlugin),
        Box::new(CoreConstraintsPlugin),
        Box::new(crate::rules::CoreRulesPlugin),
        Box::new(crate::commands::CoreCommandsPlugin),
    ]
}

struct CoreNodesPlugin;

impl ArchPlugin for CoreNodesPlugin {
    fn id(&self) -> &'static str {
        "core.nodes"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        let mut specs = Vec::new();
        for name in ["p", "h1", "h2", "h3", "h4", "h5", "h6", "pre"] {
            specs.push(NodeSpec::text_block(name));
        }
        for name in ["blockquote", "div"] {
            specs.push(NodeSpec::block_container(name));
        }
        for name in [
            "b", "strong", "i", "em", "u", "s", "code", "span", "a", "font", "sub", "sup",
        ] {
            specs.push(NodeSpec::inline(name));
        }
        specs.push(NodeSpec::list("ul"));
        specs.push(NodeSpec::list("ol"));
        specs.push(NodeSpec::list_item("li"));
        specs.push(NodeSpec::fallback("br", NodeType::LineBreak));
        for name in ["img", "input", "iframe", "video"] {
            specs.push(NodeSpec::void(name, NodeRole::Inline));
        }
        specs.push(NodeSpec::void("hr", NodeRole::Block));
        specs
    }
}

struct CoreConstraintsPlugin;

impl ArchPlugin for CoreConstraintsPlugin {
    fn id(&self) -> &'static str {
        "core.constraints"
    }

    fn editable_checks(&self) -> Vec<EditableCheck> {
        vec![Arc::new(|tree, id| {
            let value = tree.node(id)?.attributes().get("contenteditable")?;
            match value.as_str() {
                "false" => Some(false),
                "true" | "" => Some(true),
                _ => None,
            }
        })]
    }

    fn unbreakable_checks(&self) -> Vec<NodeCheck> {
        vec![Arc::new(|tree, id| {
            tree.node(id).is_some_and(|node| {
                node.attributes().has_class("unbreakable")
                    || node.attributes().contains("data-unbreakable")
            })
        })]
    }
}
