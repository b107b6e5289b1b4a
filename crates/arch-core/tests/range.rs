use std::cmp::Ordering;
use std::collections::HashMap;

use arch_core::{
    compare_points, resolve_point, ArchId, ArchPoint, ArchRange, ArchRegistry, Direction, Editor,
    EditorConfig, SurfaceMap, SurfaceSelection,
};

fn editor(markup: &str) -> Editor {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Editor::from_markup(markup, ArchRegistry::core(), EditorConfig::default()).unwrap()
}

fn text(editor: &Editor, value: &str) -> ArchId {
    editor
        .find(|tree, id| tree.node(id).is_some_and(|n| n.is_text() && n.value() == value))
        .unwrap()
}

/// Surface nodes are string handles, as a renderer might hand out.
struct Handles {
    by_handle: HashMap<String, ArchId>,
}

impl Handles {
    fn for_editor(editor: &Editor) -> Self {
        let by_handle = editor
            .find_all(|_, _| true)
            .into_iter()
            .map(|id| (format!("n{}", id.0), id))
            .collect();
        Self { by_handle }
    }
}

impl SurfaceMap for Handles {
    type Node = String;

    fn arch_id(&self, node: &String) -> Option<ArchId> {
        self.by_handle.get(node).copied()
    }

    fn surface_node(&self, id: ArchId) -> Option<String> {
        let handle = format!("n{}", id.0);
        self.by_handle.contains_key(&handle).then_some(handle)
    }
}

#[test]
fn backward_surface_selections_keep_their_direction() {
    let mut editor = editor("<p>abcd</p>");
    let t = text(&editor, "abcd");
    let map = Handles::for_editor(&editor);
    let handle = map.surface_node(t).unwrap();

    let applied = editor.set_range_from_surface(
        &map,
        &SurfaceSelection {
            anchor_node: handle.clone(),
            anchor_offset: 3,
            focus_node: handle.clone(),
            focus_offset: 1,
        },
    );
    assert!(applied);
    let range = editor.range();
    assert_eq!(range.direction, Direction::Backward);
    assert_eq!(range.start, ArchPoint::new(t, 1));
    assert_eq!(range.end, ArchPoint::new(t, 3));

    let surface = editor.range_to_surface(&map).unwrap();
    assert_eq!(surface.anchor_offset, 3);
    assert_eq!(surface.focus_offset, 1);
    assert_eq!(surface.anchor_node, handle);
}

#[test]
fn unmapped_surface_nodes_leave_the_range_alone() {
    let mut editor = editor("<p>ab</p>");
    let before = editor.range();
    let map = Handles::for_editor(&editor);
    let applied = editor.set_range_from_surface(
        &map,
        &SurfaceSelection {
            anchor_node: "nowhere".to_string(),
            anchor_offset: 0,
            focus_node: "nowhere".to_string(),
            focus_offset: 0,
        },
    );
    assert!(!applied);
    assert_eq!(editor.range(), before);
}

#[test]
fn placeholder_carets_map_after_the_sentinel() {
    let mut editor = editor("<p>ab</p>");
    let t = text(&editor, "ab");
    editor.set_range(ArchRange::collapsed(ArchPoint::new(t, 1)));
    editor.wrap("b").unwrap();
    let placeholder = editor.range().start.id;
    assert!(editor.tree().is_virtual(placeholder));

    let map = Handles::for_editor(&editor);
    let surface = editor.range_to_surface(&map).unwrap();
    assert_eq!(surface.anchor_node, format!("n{}", placeholder.0));
    assert_eq!(surface.anchor_offset, 1);
}

#[test]
fn out_of_bounds_offsets_are_clamped() {
    let mut editor = editor("<p>ab</p>");
    let t = text(&editor, "ab");
    editor.set_range(ArchRange::collapsed(ArchPoint::new(t, 40)));
    assert_eq!(editor.range().start, ArchPoint::new(t, 2));
}

#[test]
fn points_in_merged_text_follow_the_merge() {
    let mut editor = editor("<p>ab</p><p>cd</p>");
    let ab = text(&editor, "ab");
    let cd = text(&editor, "cd");
    editor.set_range(ArchRange::collapsed(ArchPoint::new(cd, 0)));
    editor.delete_backward().unwrap();
    assert!(!editor.tree().contains(cd));
    assert_eq!(
        resolve_point(editor.tree(), ArchPoint::new(cd, 1)),
        ArchPoint::new(ab, 3)
    );
}

#[test]
fn points_in_removed_nodes_fall_back_to_the_parent() {
    let mut editor = editor("<p>ab</p><p>cd</p>");
    let cd = text(&editor, "cd");
    let p = editor.tree().parent(cd).unwrap();
    editor.remove_node(p).unwrap();
    let root = editor.tree().root();
    assert_eq!(
        resolve_point(editor.tree(), ArchPoint::new(cd, 1)),
        ArchPoint::new(root, 1)
    );
}

#[test]
fn carets_on_line_breaks_move_to_the_parent() {
    let editor = editor("<p>a<br/>b</p>");
    let br = editor.find(|tree, id| tree.is_line_break(id)).unwrap();
    let p = editor.tree().parent(br).unwrap();
    assert_eq!(resolve_point(editor.tree(), ArchPoint::new(br, 0)), ArchPoint::new(p, 1));
    assert_eq!(resolve_point(editor.tree(), ArchPoint::new(br, 1)), ArchPoint::new(p, 2));
}

#[test]
fn points_compare_in_document_order() {
    let editor = editor("<p>ab</p><p>cd</p>");
    let ab = text(&editor, "ab");
    let cd = text(&editor, "cd");
    let tree = editor.tree();
    assert_eq!(
        compare_points(tree, ArchPoint::new(ab, 2), ArchPoint::new(cd, 0)),
        Ordering::Less
    );
    assert_eq!(
        compare_points(tree, ArchPoint::new(cd, 1), ArchPoint::new(cd, 1)),
        Ordering::Equal
    );
    let range = ArchRange::from_points(tree, ArchPoint::new(cd, 1), ArchPoint::new(ab, 0));
    assert_eq!(range.anchor(), ArchPoint::new(cd, 1));
    assert_eq!(range.focus(), ArchPoint::new(ab, 0));
}

#[test]
fn removed_node_trails_are_capped() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let config = EditorConfig {
        max_tombstones: 4,
        ..EditorConfig::default()
    };
    let mut editor = Editor::from_markup(
        "<p>a</p><p>b</p><p>c</p><p>d</p><p>e</p><p>f</p>",
        ArchRegistry::core(),
        config,
    )
    .unwrap();
    let removed: Vec<ArchId> = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|value| editor.tree().parent(text(&editor, value)).unwrap())
        .collect();
    for p in &removed {
        editor.remove_node(*p).unwrap();
    }
    assert_eq!(editor.to_string(None, Default::default()), "<p>f</p>");
    assert!(editor.tree().tombstone_count() <= 4);
    assert!(editor.tree().tombstone(removed[4]).is_some());
    assert!(editor.tree().tombstone(removed[0]).is_none());
}
