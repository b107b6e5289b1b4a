use arch_core::{
    ArchError, ArchJson, ArchPoint, ArchRange, ArchRegistry, BatchOptions, Editor, EditorConfig,
    ExportOptions,
};
use serde_json::json;

fn editor(markup: &str) -> Editor {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Editor::from_markup(markup, ArchRegistry::core(), EditorConfig::default()).unwrap()
}

fn html(editor: &Editor) -> String {
    editor.to_string(None, ExportOptions::default())
}

#[test]
fn unknown_commands_and_queries_are_errors() {
    let mut editor = editor("<p>ab</p>");
    assert!(matches!(
        editor.run_command("core.nope", None),
        Err(ArchError::UnknownCommand(name)) if name == "core.nope"
    ));
    assert!(matches!(
        editor.run_query_json("core.nope", None),
        Err(ArchError::UnknownQuery(_))
    ));
}

#[test]
fn missing_arguments_are_reported() {
    let mut editor = editor("<p>ab</p>");
    let err = editor.run_command("core.insert_text", None).unwrap_err();
    assert!(matches!(err, ArchError::InvalidArgs { ref command, .. } if command == "core.insert_text"));
    assert_eq!(html(&editor), "<p>ab</p>");
}

#[test]
fn text_query_reads_plain_text() -> anyhow::Result<()> {
    let editor = editor("<p>a<br/>b</p><p>c</p>");
    let text: String = editor.run_query("core.text", None)?;
    assert_eq!(text, "a\nbc");
    Ok(())
}

#[test]
fn history_queries_follow_edits() -> anyhow::Result<()> {
    let mut editor = editor("<p>ab</p>");
    assert!(!editor.run_query::<bool>("core.can_undo", None)?);
    editor.run_command("core.insert_text", Some(json!({ "text": "x" })))?;
    assert!(editor.run_query::<bool>("core.can_undo", None)?);
    editor.run_command("core.undo", None)?;
    assert!(editor.run_query::<bool>("core.can_redo", None)?);
    assert_eq!(html(&editor), "<p>ab</p>");
    editor.run_command("core.redo", None)?;
    assert_eq!(html(&editor), "<p>xab</p>");
    Ok(())
}

#[test]
fn range_and_value_queries_mirror_the_editor() -> anyhow::Result<()> {
    let mut editor = editor("<p>abc</p>");
    let t = editor.find(|tree, id| tree.is_text(id)).unwrap();
    editor.set_range(ArchRange::collapsed(ArchPoint::new(t, 2)));

    let range: ArchRange = editor.run_query("core.range", None)?;
    assert_eq!(range, editor.range());

    let value: ArchJson = editor.run_query("core.value", None)?;
    assert!(value.same_shape(&editor.to_json(None, ExportOptions::default()).unwrap()));
    Ok(())
}

#[test]
fn attribute_commands_edit_nodes() -> anyhow::Result<()> {
    let mut editor = editor("<p>ab</p>");
    let p = editor.find(|tree, id| tree.is_block(id)).unwrap();
    editor.run_command(
        "core.set_attribute",
        Some(json!({ "id": p, "name": "title", "value": "t" })),
    )?;
    editor.run_command("core.toggle_class", Some(json!({ "id": p, "class": "lead" })))?;
    assert_eq!(html(&editor), r#"<p title="t" class="lead">ab</p>"#);
    editor.run_command("core.toggle_class", Some(json!({ "id": p, "class": "lead" })))?;
    assert_eq!(html(&editor), r#"<p title="t">ab</p>"#);
    Ok(())
}

#[test]
fn structural_commands_take_json_arguments() -> anyhow::Result<()> {
    let mut editor = editor("<p>abcd</p>");
    let t = editor.find(|tree, id| tree.is_text(id)).unwrap();
    editor.set_range(ArchRange::collapsed(ArchPoint::new(t, 2)));
    editor.run_command("core.split", None)?;
    assert_eq!(html(&editor), "<p>ab</p><p>cd</p>");

    editor.run_command("core.merge", Some(json!({ "direction": "backward" })))?;
    assert_eq!(html(&editor), "<p>abcd</p>");

    editor.run_command("core.insert_markup", Some(json!({ "markup": "<b>x</b>" })))?;
    assert_eq!(html(&editor), "<p>ab<b>x</b>cd</p>");
    Ok(())
}

#[test]
fn registry_lists_core_commands() {
    let registry = ArchRegistry::core();
    let command = registry.command("core.toggle_checked").unwrap();
    assert_eq!(command.id, "core.toggle_checked");
    assert!(registry.query("core.text").is_some());
}

#[test]
fn batch_attribute_edits_respect_locked_zones() {
    let mut editor = editor(r#"<p>ab</p><div contenteditable="false"><p>x</p></div>"#);
    let blocks = editor.find_all(|tree, id| tree.node(id).is_some_and(|n| n.is_named("p")));
    let (open, locked) = (blocks[0], blocks[1]);

    editor
        .batch(BatchOptions::default(), |batch| {
            batch.set_style(open, "color", "red")?;
            batch.add_class(open, "lead")?;
            batch.remove_attribute(open, "class").map(drop)
        })
        .unwrap();
    assert!(html(&editor).starts_with(r#"<p style="color: red">ab</p>"#));

    let refused = editor
        .batch(BatchOptions::default(), |batch| batch.set_style(locked, "color", "red"))
        .unwrap();
    assert_eq!(refused, None);
    assert!(html(&editor).ends_with(r#"<div contenteditable="false"><p>x</p></div>"#));
}
