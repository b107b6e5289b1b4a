use arch_core::{
    ArchId, ArchPoint, ArchRange, ArchRegistry, Direction, Editor, EditorConfig, ExportOptions,
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

fn select(editor: &mut Editor, from: (ArchId, usize), to: (ArchId, usize)) {
    editor.set_range(ArchRange::new(
        ArchPoint::new(from.0, from.1),
        ArchPoint::new(to.0, to.1),
        Direction::Forward,
    ));
}

#[test]
fn empty_editor_holds_a_placeholder_paragraph() {
    let editor = Editor::with_core().unwrap();
    assert_eq!(html(&editor), "<p><br/></p>");
}

#[test]
fn typing_into_an_empty_paragraph_replaces_the_placeholder() {
    let mut editor = Editor::with_core().unwrap();
    editor.insert_text("hi").unwrap();
    assert_eq!(html(&editor), "<p>hi</p>");
    let hi = text(&editor, "hi");
    assert_eq!(editor.range(), ArchRange::collapsed(ArchPoint::new(hi, 2)));
}

#[test]
fn typing_inside_text_moves_the_caret() {
    let mut editor = editor("<p>ad</p>");
    let ad = text(&editor, "ad");
    caret(&mut editor, ad, 1);
    editor.insert_text("bc").unwrap();
    assert_eq!(html(&editor), "<p>abcd</p>");
    assert_eq!(editor.range().start, ArchPoint::new(ad, 3));
}

#[test]
fn typing_replaces_a_selection() {
    let mut editor = editor("<p>abcd</p>");
    let t = text(&editor, "abcd");
    select(&mut editor, (t, 1), (t, 3));
    editor.insert_text("X").unwrap();
    assert_eq!(html(&editor), "<p>aXd</p>");
}

#[test]
fn inline_markup_lands_inside_the_paragraph() {
    let mut editor = editor("<p>abcd</p>");
    let t = text(&editor, "abcd");
    caret(&mut editor, t, 2);
    editor.insert_markup("<b>X</b>").unwrap();
    assert_eq!(html(&editor), "<p>ab<b>X</b>cd</p>");
}

#[test]
fn block_markup_splits_the_paragraph() {
    let mut editor = editor("<p>abcd</p>");
    let t = text(&editor, "abcd");
    caret(&mut editor, t, 2);
    let ids = editor.insert_markup("<h1>X</h1>").unwrap().unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(html(&editor), "<p>ab</p><h1>X</h1><p>cd</p>");
    assert_eq!(editor.range().start, ArchPoint::new(text(&editor, "X"), 1));
}

#[test]
fn block_markup_at_a_paragraph_edge_leaves_no_empty_half() {
    let mut editor = editor("<p>ab</p>");
    let t = text(&editor, "ab");
    caret(&mut editor, t, 2);
    editor.insert_markup("<h2>X</h2>").unwrap();
    assert_eq!(html(&editor), "<p>ab</p><h2>X</h2>");
}

#[test]
fn split_at_the_caret_makes_two_paragraphs() {
    let mut editor = editor("<p>abcd</p>");
    let t = text(&editor, "abcd");
    caret(&mut editor, t, 2);
    editor.run_command("core.split", None).unwrap();
    assert_eq!(html(&editor), "<p>ab</p><p>cd</p>");
    assert_eq!(editor.range().start, ArchPoint::new(text(&editor, "cd"), 0));
}

#[test]
fn split_at_the_end_leaves_an_empty_paragraph_to_type_in() {
    let mut editor = editor("<p>ab</p>");
    let t = text(&editor, "ab");
    caret(&mut editor, t, 2);
    editor.run_command("core.split", None).unwrap();
    assert_eq!(html(&editor), "<p>ab</p><p><br/></p>");
    editor.insert_text("x").unwrap();
    assert_eq!(html(&editor), "<p>ab</p><p>x</p>");
}

#[test]
fn split_until_an_ancestor_splits_every_level() {
    let mut editor = editor("<div><p>ab</p></div>");
    let t = text(&editor, "ab");
    let root = editor.tree().root();
    let created = editor.split(t, 1, Some(root)).unwrap().unwrap();
    assert!(created.is_some());
    assert_eq!(html(&editor), "<div><p>a</p></div><div><p>b</p></div>");
}

#[test]
fn split_without_a_boundary_splits_only_the_node() {
    let mut editor = editor("<p>ab</p>");
    let t = text(&editor, "ab");
    let tail = editor.split(t, 1, None).unwrap().unwrap().unwrap();
    // Adjacent text merges back once the batch is normalized.
    assert!(!editor.tree().contains(tail));
    assert_eq!(html(&editor), "<p>ab</p>");
}

#[test]
fn delete_backward_removes_one_char() {
    let mut editor = editor("<p>abc</p>");
    let t = text(&editor, "abc");
    caret(&mut editor, t, 3);
    editor.delete_backward().unwrap();
    assert_eq!(html(&editor), "<p>ab</p>");
    assert_eq!(editor.range().start, ArchPoint::new(t, 2));
}

#[test]
fn delete_backward_at_block_start_merges_into_previous() {
    let mut editor = editor("<p>ab</p><p>cd</p>");
    let ab = text(&editor, "ab");
    let cd = text(&editor, "cd");
    caret(&mut editor, cd, 0);
    editor.delete_backward().unwrap();
    assert_eq!(html(&editor), "<p>abcd</p>");
    assert_eq!(editor.range().start, ArchPoint::new(ab, 2));
}

#[test]
fn delete_forward_at_block_end_merges_the_next_block() {
    let mut editor = editor("<p>ab</p><p>cd</p>");
    let ab = text(&editor, "ab");
    caret(&mut editor, ab, 2);
    editor.delete_forward().unwrap();
    assert_eq!(html(&editor), "<p>abcd</p>");
}

#[test]
fn delete_backward_removes_a_line_break() {
    let mut editor = editor("<p>a<br/>b</p>");
    let b = text(&editor, "b");
    caret(&mut editor, b, 0);
    editor.delete_backward().unwrap();
    assert_eq!(html(&editor), "<p>ab</p>");
}

#[test]
fn merge_into_an_empty_paragraph_drops_its_placeholder() {
    let mut editor = editor("<p><br/></p><p>cd</p>");
    let cd = text(&editor, "cd");
    caret(&mut editor, cd, 0);
    editor.delete_backward().unwrap();
    assert_eq!(html(&editor), "<p>cd</p>");
}

#[test]
fn merge_at_the_document_start_does_nothing() {
    let mut editor = editor("<p>ab</p>");
    let ab = text(&editor, "ab");
    let merged = editor
        .merge(ab, arch_core::MergeDirection::Backward)
        .unwrap();
    assert_eq!(merged, Some(false));
    assert_eq!(html(&editor), "<p>ab</p>");
}

#[test]
fn removing_a_range_across_blocks_joins_the_edges() {
    let mut editor = editor("<p>abc</p><p>def</p>");
    let abc = text(&editor, "abc");
    let def = text(&editor, "def");
    select(&mut editor, (abc, 1), (def, 2));
    editor.remove_range().unwrap();
    assert_eq!(html(&editor), "<p>af</p>");
    assert!(editor.range().is_collapsed());
}

#[test]
fn removing_a_range_inside_one_text_node() {
    let mut editor = editor("<p>abcdef</p>");
    let t = text(&editor, "abcdef");
    select(&mut editor, (t, 1), (t, 3));
    editor.remove_range().unwrap();
    assert_eq!(html(&editor), "<p>adef</p>");
}

#[test]
fn removing_a_whole_paragraph_node() {
    let mut editor = editor("<p>ab</p><p>cd</p>");
    let cd = text(&editor, "cd");
    let p = editor.tree().parent(cd).unwrap();
    editor.remove_node(p).unwrap();
    assert_eq!(html(&editor), "<p>ab</p>");
    assert!(editor.tree().tombstone(p).is_some());
}

#[test]
fn removing_the_caret_block_moves_the_caret_to_the_next_block() {
    let mut editor = editor("<p>ab</p><p>cd</p>");
    let ab = text(&editor, "ab");
    caret(&mut editor, ab, 1);
    let p = editor.tree().parent(ab).unwrap();
    editor.remove_node(p).unwrap();
    editor.insert_text("X").unwrap();
    assert_eq!(html(&editor), "<p>Xcd</p>");
}

#[test]
fn removing_the_last_caret_block_moves_the_caret_to_the_previous_block() {
    let mut editor = editor("<p>ab</p><p>cd</p>");
    let cd = text(&editor, "cd");
    caret(&mut editor, cd, 1);
    let p = editor.tree().parent(cd).unwrap();
    editor.remove_node(p).unwrap();
    editor.insert_text("X").unwrap();
    assert_eq!(html(&editor), "<p>abX</p>");
}

#[test]
fn removing_everything_leaves_a_placeholder() {
    let mut editor = editor("<p>ab</p>");
    let ab = text(&editor, "ab");
    select(&mut editor, (ab, 0), (ab, 2));
    editor.remove_range().unwrap();
    assert_eq!(html(&editor), "<p><br/></p>");
}
