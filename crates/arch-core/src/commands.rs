use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::core::{BatchOptions, Editor};
use crate::error::{ArchError, Result};
use crate::mutation::MergeDirection;
use crate::node::ArchId;
use crate::registry::{ArchPlugin, CommandSpec, QuerySpec};
use crate::tree::ExportOptions;

/// Decodes a command's JSON arguments; missing arguments decode as `{}`.
fn parse_args<T: DeserializeOwned>(command: &str, args: Option<Value>) -> Result<T> {
    let value = args.unwrap_or_else(|| json!({}));
    serde_json::from_value(value).map_err(|e| ArchError::invalid_args(command, e.to_string()))
}

#[derive(Deserialize)]
struct TextArgs {
    text: String,
}

#[derive(Deserialize)]
struct MarkupArgs {
    markup: String,
}

#[derive(Deserialize)]
struct SplitArgs {
    #[serde(default)]
    until_root: bool,
}

#[derive(Deserialize)]
struct MergeArgs {
    direction: MergeDirection,
}

#[derive(Deserialize)]
struct NameArgs {
    name: String,
}

#[derive(Deserialize)]
struct AttributeArgs {
    id: ArchId,
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct ClassArgs {
    id: ArchId,
    class: String,
}

#[derive(Deserialize)]
struct NodeArgs {
    id: ArchId,
}

pub(crate) struct CoreCommandsPlugin;

impl ArchPlugin for CoreCommandsPlugin {
    fn id(&self) -> &'static str {
        "core.commands"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("core.insert_text", "Insert text", |editor, args| {
                let args: TextArgs = parse_args("core.insert_text", args)?;
                editor.insert_text(&args.text).map(drop)
            })
            .description("Insert plain text at the range, replacing any selection."),
            CommandSpec::new("core.insert_markup", "Insert markup", |editor, args| {
                let args: MarkupArgs = parse_args("core.insert_markup", args)?;
                editor.insert_markup(&args.markup).map(drop)
            })
            .description("Parse markup and insert it at the range."),
            CommandSpec::new("core.remove", "Remove selection", |editor, _args| {
                editor.remove_range().map(drop)
            }),
            CommandSpec::new("core.split", "Split block", |editor, args| {
                let args: SplitArgs = parse_args("core.split", args)?;
                editor
                    .batch(BatchOptions::default(), |batch| batch.split_at_range(args.until_root))
                    .map(drop)
            })
            .description("Split the block at the caret, or every ancestor up to the root."),
            CommandSpec::new("core.merge", "Merge block", |editor, args| {
                let args: MergeArgs = parse_args("core.merge", args)?;
                let at = editor.range().start.id;
                editor.merge(at, args.direction).map(drop)
            })
            .description("Join the block at the range start with its neighbour."),
            CommandSpec::new("core.wrap", "Wrap selection", |editor, args| {
                let args: NameArgs = parse_args("core.wrap", args)?;
                editor.wrap(&args.name).map(drop)
            }),
            CommandSpec::new("core.unwrap", "Unwrap selection", |editor, args| {
                let args: NameArgs = parse_args("core.unwrap", args)?;
                editor
                    .unwrap_matching(|tree, id| {
                        tree.node(id).is_some_and(|node| node.is_named(&args.name))
                    })
                    .map(drop)
            }),
            CommandSpec::new("core.indent", "Indent", |editor, _args| {
                editor.indent().map(drop)
            }),
            CommandSpec::new("core.outdent", "Outdent", |editor, _args| {
                editor.outdent().map(drop)
            }),
            CommandSpec::new("core.undo", "Undo", |editor, _args| {
                editor.undo();
                Ok(())
            }),
            CommandSpec::new("core.redo", "Redo", |editor, _args| {
                editor.redo();
                Ok(())
            }),
            CommandSpec::new("core.set_attribute", "Set attribute", |editor, args| {
                let args: AttributeArgs = parse_args("core.set_attribute", args)?;
                editor
                    .batch(BatchOptions::default(), |batch| {
                        batch.set_attribute(args.id, &args.name, &args.value)
                    })
                    .map(drop)
            }),
            CommandSpec::new("core.toggle_class", "Toggle class", |editor, args| {
                let args: ClassArgs = parse_args("core.toggle_class", args)?;
                editor
                    .batch(BatchOptions::default(), |batch| {
                        batch.toggle_class(args.id, &args.class)
                    })
                    .map(drop)
            }),
            CommandSpec::new("core.toggle_checked", "Toggle checked", |editor, args| {
                let args: NodeArgs = parse_args("core.toggle_checked", args)?;
                editor
                    .batch(BatchOptions::default(), |batch| batch.toggle_checked(args.id))
                    .map(drop)
            })
            .description("Flip the checked state of a checklist item."),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("core.can_undo", |editor: &Editor, _args| {
                Ok(Value::Bool(editor.can_undo()))
            }),
            QuerySpec::new("core.can_redo", |editor: &Editor, _args| {
                Ok(Value::Bool(editor.can_redo()))
            }),
            QuerySpec::new("core.range", |editor: &Editor, _args| {
                Ok(serde_json::to_value(editor.range())?)
            }),
            QuerySpec::new("core.value", |editor: &Editor, _args| {
                let json = editor.to_json(None, ExportOptions::default());
                Ok(serde_json::to_value(json)?)
            }),
            QuerySpec::new("core.text", |editor: &Editor, _args| {
                let tree = editor.tree();
                Ok(Value::String(tree.text_content(tree.root())))
            }),
        ]
    }
}
