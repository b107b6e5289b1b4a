use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;

pub const VIRTUAL_TEXT: char = '\u{FEFF}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchId(pub u32);

impl fmt::Display for ArchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Root,
    Fragment,
    Text,
    VirtualText,
    ArchitecturalSpace,
    LineBreak,
    Element,
    List,
    ListItem,
    Void,
}

impl NodeType {
    pub fn is_text_like(self) -> bool {
        matches!(
            self,
            NodeType::Text | NodeType::VirtualText | NodeType::ArchitecturalSpace
        )
    }

    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeType::Root
                | NodeType::Fragment
                | NodeType::Element
                | NodeType::List
                | NodeType::ListItem
        )
    }

    pub fn has_name(self) -> bool {
        matches!(
            self,
            NodeType::Element | NodeType::List | NodeType::ListItem | NodeType::Void
        )
    }

    pub fn default_name(self) -> &'static str {
        match self {
            NodeType::Root => "ROOT",
            NodeType::Fragment => "FRAGMENT",
            NodeType::Text => "TEXT",
            NodeType::VirtualText => "TEXT-VIRTUAL",
            NodeType::ArchitecturalSpace => "TEXT-ARCH",
            NodeType::LineBreak => "br",
            NodeType::Element => "span",
            NodeType::List => "ul",
            NodeType::ListItem => "li",
            NodeType::Void => "img",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchNode {
    pub(crate) id: ArchId,
    pub(crate) parent: Option<ArchId>,
    pub(crate) children: Vec<ArchId>,
    pub(crate) node_type: NodeType,
    pub(crate) name: String,
    pub(crate) attributes: Attributes,
    pub(crate) value: String,
}

impl ArchNode {
    pub(crate) fn new(id: ArchId, node_type: NodeType, name: &str) -> Self {
        let value = match node_type {
            NodeType::VirtualText => VIRTUAL_TEXT.to_string(),
            _ => String::new(),
        };
        Self {
            id,
            parent: None,
            children: Vec::new(),
            node_type,
            name: name.to_string(),
            attributes: Attributes::default(),
            value,
        }
    }

    pub fn id(&self) -> ArchId {
        self.id
    }

    pub fn parent(&self) -> Option<ArchId> {
        self.parent
    }

    pub fn children(&self) -> &[ArchId] {
        &self.children
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Text content for text nodes; the sentinel for virtual text.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_root(&self) -> bool {
        self.node_type == NodeType::Root
    }

    pub fn is_text(&self) -> bool {
        self.node_type == NodeType::Text
    }

    pub fn is_virtual(&self) -> bool {
        self.node_type == NodeType::VirtualText
    }

    pub fn is_line_break(&self) -> bool {
        self.node_type == NodeType::LineBreak
    }

    pub fn is_list(&self) -> bool {
        self.node_type == NodeType::List
    }

    pub fn is_list_item(&self) -> bool {
        self.node_type == NodeType::ListItem
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.node_type, NodeType::VirtualText | NodeType::LineBreak)
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.node_type.has_name() && self.name.eq_ignore_ascii_case(name)
    }

    /// Caret-addressable length: chars for text, children for containers.
    pub fn length(&self) -> usize {
        match self.node_type {
            NodeType::Text | NodeType::ArchitecturalSpace => self.value.chars().count(),
            NodeType::VirtualText => 0,
            NodeType::LineBreak | NodeType::Void => 0,
            _ => self.children.len(),
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            node_type: self.node_type,
            node_name: self.node_type.has_name().then(|| self.name.clone()),
            attributes: self.attributes.clone(),
            node_value: self.node_type.is_text_like().then(|| self.value.clone()),
            child_nodes: self.children.clone(),
        }
    }
}

/// Nested export record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ArchId>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ArchJson>>,
}

impl ArchJson {
    pub fn element(name: &str, children: Vec<ArchJson>) -> Self {
        Self {
            id: None,
            node_type: NodeType::Element,
            node_name: Some(name.to_string()),
            attributes: Attributes::default(),
            node_value: None,
            children: Some(children),
        }
    }

    pub fn text(value: &str) -> Self {
        Self {
            id: None,
            node_type: NodeType::Text,
            node_name: None,
            attributes: Attributes::default(),
            node_value: Some(value.to_string()),
            children: None,
        }
    }

    pub fn virtual_text() -> Self {
        Self {
            node_value: Some(VIRTUAL_TEXT.to_string()),
            node_type: NodeType::VirtualText,
            ..Self::text("")
        }
    }

    pub fn line_break() -> Self {
        Self {
            id: None,
            node_type: NodeType::LineBreak,
            node_name: Some("br".to_string()),
            attributes: Attributes::default(),
            node_value: None,
            children: None,
        }
    }

    pub fn fragment(children: Vec<ArchJson>) -> Self {
        Self {
            id: None,
            node_type: NodeType::Fragment,
            node_name: None,
            attributes: Attributes::default(),
            node_value: None,
            children: Some(children),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn children(&self) -> &[ArchJson] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Same shape, ignoring ids.
    pub fn same_shape(&self, other: &ArchJson) -> bool {
        self.node_type == other.node_type
            && self.node_name == other.node_name
            && self.attributes == other.attributes
            && self.node_value == other.node_value
            && self.children().len() == other.children().len()
            && self
                .children()
                .iter()
                .zip(other.children())
                .all(|(a, b)| a.same_shape(b))
    }
}

/// Flat per-node state, keyed by id, used by history and `import_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub id: ArchId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_value: Option<String>,
    #[serde(default)]
    pub child_nodes: Vec<ArchId>,
}
