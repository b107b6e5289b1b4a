use html5ever::tendril::TendrilSink;
use html5ever::{Attribute, parse_document};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::attributes::Attributes;
use crate::node::{ArchId, ArchJson, NodeType, VIRTUAL_TEXT};
use crate::registry::{ArchRegistry, ChildConstraint, NodeRole};

const ID_ATTRIBUTE: &str = "data-arch-id";

/// Elements HTML parses without a closing tag.
const HTML_VOIDS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Serializes an export record as markup.
pub(crate) fn render(json: &ArchJson, show_ids: bool) -> String {
    let mut out = String::new();
    write_node(&mut out, json, show_ids);
    out
}

fn write_node(out: &mut String, json: &ArchJson, show_ids: bool) {
    match json.node_type {
        NodeType::Root | NodeType::Fragment => {
            for child in json.children() {
                write_node(out, child, show_ids);
            }
        }
        NodeType::Text | NodeType::ArchitecturalSpace => {
            out.push_str(&escape(json.node_value.as_deref().unwrap_or_default(), false));
        }
        NodeType::VirtualText => out.push(VIRTUAL_TEXT),
        NodeType::LineBreak | NodeType::Void if is_html_void(tag_name(json)) => {
            write_open_tag(out, json, show_ids);
            out.push_str("/>");
        }
        NodeType::LineBreak | NodeType::Void => {
            write_open_tag(out, json, show_ids);
            out.push_str("></");
            out.push_str(tag_name(json));
            out.push('>');
        }
        NodeType::Element | NodeType::List | NodeType::ListItem => {
            write_open_tag(out, json, show_ids);
            out.push('>');
            // The parser eats one newline right after these start tags.
            let leading_newline = json
                .children()
                .first()
                .and_then(|child| child.node_value.as_deref())
                .is_some_and(|value| value.starts_with('\n'));
            if leading_newline && matches!(tag_name(json), "pre" | "textarea" | "listing") {
                out.push('\n');
            }
            for child in json.children() {
                write_node(out, child, show_ids);
            }
            out.push_str("</");
            out.push_str(tag_name(json));
            out.push('>');
        }
    }
}

fn is_html_void(name: &str) -> bool {
    HTML_VOIDS.iter().any(|void| void.eq_ignore_ascii_case(name))
}

fn tag_name(json: &ArchJson) -> &str {
    json.node_name
        .as_deref()
        .unwrap_or_else(|| json.node_type.default_name())
}

fn write_open_tag(out: &mut String, json: &ArchJson, show_ids: bool) {
    out.push('<');
    out.push_str(tag_name(json));
    if show_ids {
        if let Some(id) = json.id {
            out.push_str(&format!(" {ID_ATTRIBUTE}=\"{}\"", id.0));
        }
    }
    for (name, value) in json.attributes.iter() {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(&value, true));
        out.push('"');
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Parses markup into a detached fragment record with the HTML5 tree
/// builder, so malformed input is recovered the way a browser would.
/// Element names are typed with the registry's node table; the placeholder
/// sentinel becomes virtual text and newline whitespace laid out between
/// blocks becomes architectural space.
pub fn parse_markup(registry: &ArchRegistry, text: &str) -> ArchJson {
    // An explicit body start keeps leading whitespace the prologue would drop.
    let dom = parse_document(RcDom::default(), Default::default()).one(format!("<body>{text}"));
    let reader = Reader { registry };
    let children = find_body(&dom.document)
        .map(|body| reader.children(&body, true))
        .unwrap_or_default();
    ArchJson::fragment(children)
}

fn find_body(handle: &Handle) -> Option<Handle> {
    handle
        .children
        .borrow()
        .iter()
        .find_map(|child| match &child.data {
            NodeData::Element { name, .. } if name.local.as_ref() == "body" => Some(child.clone()),
            NodeData::Element { .. } => find_body(child),
            _ => None,
        })
}

struct Reader<'a> {
    registry: &'a ArchRegistry,
}

impl Reader<'_> {
    fn children(&self, handle: &Handle, accepts_blocks: bool) -> Vec<ArchJson> {
        let children = handle.children.borrow();
        let block_layout = accepts_blocks && self.is_block_layout(&children);
        let mut nodes = Vec::new();
        for child in children.iter() {
            match &child.data {
                NodeData::Text { contents } => {
                    push_text(&mut nodes, &contents.borrow(), block_layout);
                }
                NodeData::Element { name, attrs, .. } => {
                    nodes.push(self.element(child, &name.local, &attrs.borrow()));
                }
                _ => {}
            }
        }
        nodes
    }

    /// Blocks separated by nothing but whitespace.
    fn is_block_layout(&self, children: &[Handle]) -> bool {
        let mut blocks = 0;
        for child in children {
            match &child.data {
                NodeData::Element { name, .. } => {
                    if self.registry.spec(&name.local).role != NodeRole::Block {
                        return false;
                    }
                    blocks += 1;
                }
                NodeData::Text { contents } => {
                    if !contents.borrow().chars().all(char::is_whitespace) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        blocks > 0
    }

    fn element(&self, handle: &Handle, name: &str, attrs: &[Attribute]) -> ArchJson {
        let name = name.to_ascii_lowercase();
        let mut id = None;
        let mut attributes = Vec::new();
        for attr in attrs {
            let value = attr.value.to_string();
            if attr.name.local.as_ref() == ID_ATTRIBUTE {
                id = value.parse().ok().map(ArchId);
            } else {
                attributes.push((attr.name.local.to_string(), value));
            }
        }

        let spec = self.registry.spec(&name);
        let children = match spec.node_type {
            NodeType::LineBreak | NodeType::Void => None,
            _ => {
                let accepts_blocks =
                    matches!(spec.children, ChildConstraint::BlockOnly | ChildConstraint::Any);
                Some(self.children(handle, accepts_blocks))
            }
        };

        ArchJson {
            id,
            node_type: spec.node_type,
            node_name: Some(name),
            attributes: Attributes::from(attributes),
            node_value: None,
            children,
        }
    }
}

fn push_text(nodes: &mut Vec<ArchJson>, text: &str, block_layout: bool) {
    if block_layout && text.contains('\n') {
        nodes.push(ArchJson {
            node_type: NodeType::ArchitecturalSpace,
            ..ArchJson::text(text)
        });
        return;
    }
    for (ix, segment) in text.split(VIRTUAL_TEXT).enumerate() {
        if ix > 0 {
            nodes.push(ArchJson::virtual_text());
        }
        if !segment.is_empty() {
            nodes.push(ArchJson::text(segment));
        }
    }
}
