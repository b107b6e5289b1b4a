use arch_core::{
    ArchError, ArchId, ArchPoint, ArchRange, ArchRegistry, BatchOptions, Direction, Editor,
    EditorConfig, ExportOptions,
};

fn editor(markup: &str) -> Editor {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Editor::from_markup(markup, ArchRegistry::core(), EditorConfig::default()).unwrap()
}

fn html(editor: &Editor) -> String {
    editor.to_string(None, ExportOptions::default())
}

fn text(editor: &Editor, value: &str) -> ArchId {
    editor
        .find(|tree, id| tree.node(id).is_some_and(|n| n.is_text() && n.value() == value))
        .unwrap()
}

fn caret(editor: &mut Editor, id: ArchId, offset: usize) {
    editor.set_range(ArchRange::collapsed(ArchPoint::new(id, offset)));
}

#[test]
fn removing_an_unbreakable_node_is_refused_without_changes() {
    let mut editor = editor(r#"<p>ab</p><p class="unbreakable">cd</p>"#);
    let before = html(&editor);
    let cd = text(&editor, "cd");
    let p = editor.tree().parent(cd).unwrap();

    assert_eq!(editor.remove_node(p).unwrap(), None);
    assert_eq!(html(&editor), before);
    assert!(editor.history().is_empty());
}

#[test]
fn merging_into_an_unbreakable_block_is_refused() {
    let mut editor = editor(r#"<p>ab</p><p data-unbreakable="">cd</p>"#);
    let before = html(&editor);
    let cd = text(&editor, "cd");
    caret(&mut editor, cd, 0);
    assert_eq!(editor.delete_backward().unwrap(), None);
    assert_eq!(html(&editor), before);
}

#[test]
fn bypass_batches_skip_the_checks() {
    let mut editor = editor(r#"<p>ab</p><p class="unbreakable">cd</p>"#);
    let cd = text(&editor, "cd");
    let p = editor.tree().parent(cd).unwrap();
    let removed = editor
        .batch(BatchOptions::bypass(), |batch| {
            assert!(batch.is_bypassing());
            batch.remove_node(p)
        })
        .unwrap();
    assert_eq!(removed, Some(()));
    assert_eq!(html(&editor), "<p>ab</p>");
}

#[test]
fn protected_blocks_survive_a_range_removal() {
    let mut editor = editor(r#"<p>ab</p><p class="unbreakable">xy</p><p>cd</p>"#);
    let ab = text(&editor, "ab");
    let cd = text(&editor, "cd");
    editor.set_range(ArchRange::new(
        ArchPoint::new(ab, 1),
        ArchPoint::new(cd, 1),
        Direction::Forward,
    ));
    editor.remove_range().unwrap();
    assert_eq!(
        html(&editor),
        r#"<p>a</p><p class="unbreakable">xy</p><p>d</p>"#
    );
}

#[test]
fn typing_is_refused_inside_a_non_editable_zone() {
    let mut editor = editor(r#"<div contenteditable="false"><p>locked</p></div>"#);
    let before = html(&editor);
    let locked = text(&editor, "locked");
    caret(&mut editor, locked, 3);
    assert_eq!(editor.delete_backward().unwrap(), None);
    assert_eq!(html(&editor), before);
}

#[test]
fn insertion_in_a_non_editable_zone_is_redirected_after_it() {
    let mut editor = editor(r#"<p>ab</p><div contenteditable="false"><p>locked</p></div>"#);
    let locked = text(&editor, "locked");
    caret(&mut editor, locked, 3);
    editor.insert_text("x").unwrap();
    assert_eq!(
        html(&editor),
        r#"<p>ab</p><div contenteditable="false"><p>locked</p></div><p>x</p>"#
    );
}

#[test]
fn editable_islands_inside_locked_zones_accept_edits() {
    let mut editor = editor(
        r#"<div contenteditable="false"><p contenteditable="true">ok</p></div>"#,
    );
    let ok = text(&editor, "ok");
    caret(&mut editor, ok, 2);
    editor.insert_text("!").unwrap();
    assert!(html(&editor).contains("ok!"));
}

#[test]
fn the_root_cannot_be_removed() {
    let mut editor = editor("<p>ab</p>");
    let root = editor.tree().root();
    assert_eq!(editor.remove_node(root).unwrap(), None);
    assert_eq!(html(&editor), "<p>ab</p>");
}

#[test]
fn unknown_ids_are_refusals() {
    let mut editor = editor("<p>ab</p>");
    assert_eq!(editor.remove_node(ArchId(999)).unwrap(), None);
    let err = editor
        .batch(BatchOptions::default(), |batch| batch.tree().get(ArchId(999)).map(drop))
        .unwrap();
    assert_eq!(err, None);
}

#[test]
fn failed_batches_roll_back_and_report() {
    let mut editor = editor("<p>ab</p>");
    let result = editor.batch(BatchOptions::default(), |batch| {
        batch.insert_text("zz")?;
        Err::<(), _>(ArchError::InvalidContent("boom".into()))
    });
    assert!(matches!(result, Err(ArchError::InvalidContent(_))));
    assert_eq!(html(&editor), "<p>ab</p>");
    assert!(!editor.can_undo());
}
