use arch_core::{
    ArchError, ArchJson, ArchPlugin, ArchRegistry, ArchTree, Editor, EditorConfig, ExportOptions,
    NodeSpec, NormalizePass, PlacementFix, PlacementRule,
};

fn editor(markup: &str) -> Editor {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Editor::from_markup(markup, ArchRegistry::core(), EditorConfig::default()).unwrap()
}

fn html(editor: &Editor) -> String {
    editor.to_string(None, ExportOptions::default())
}

#[test]
fn empty_documents_get_a_placeholder_paragraph() {
    assert_eq!(html(&editor("")), "<p><br/></p>");
    assert_eq!(html(&editor("<h1></h1>")), "<h1><br/></h1>");
}

#[test]
fn loose_inline_content_is_wrapped_in_paragraphs() {
    assert_eq!(html(&editor("ab<b>c</b>")), "<p>ab<b>c</b></p>");
}

#[test]
fn list_children_become_items() {
    assert_eq!(html(&editor("<ul>x</ul>")), "<ul><li>x</li></ul>");
}

#[test]
fn stray_list_items_get_a_list() {
    assert_eq!(html(&editor("<li>a</li><li>b</li>")), "<ul><li>a</li><li>b</li></ul>");
}

#[test]
fn blocks_inside_text_blocks_are_unwrapped() {
    assert_eq!(html(&editor("<h1>a<div>b</div></h1>")), "<h1>ab</h1>");
}

fn from_json(children: Vec<ArchJson>) -> Editor {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let json = ArchJson::fragment(children);
    Editor::from_json(&json, ArchRegistry::core(), EditorConfig::default()).unwrap()
}

#[test]
fn block_voids_inside_text_blocks_split_them() {
    let hr = || ArchJson::element("hr", Vec::new());
    let split = from_json(vec![ArchJson::element(
        "p",
        vec![ArchJson::text("a"), hr(), ArchJson::text("b")],
    )]);
    assert_eq!(html(&split), "<p>a</p><hr/><p>b</p>");

    let alone = from_json(vec![ArchJson::element("p", vec![hr()])]);
    assert_eq!(html(&alone), "<hr/>");
}

#[test]
fn empty_inline_elements_and_lists_are_dropped() {
    assert_eq!(html(&editor("<p>a<b></b></p><ul></ul>")), "<p>a</p>");
}

#[test]
fn architectural_whitespace_is_stripped() {
    let editor = editor("<div>\n    <p>a</p>\n</div>");
    assert_eq!(html(&editor), "<div><p>a</p></div>");
}

#[test]
fn pretty_export_reimports_to_the_same_tree() {
    let first = editor("<div><p>a</p><p>b</p></div>");
    let pretty = first.to_string(None, ExportOptions::default().architectural_space(true));
    assert!(pretty.contains('\n'));
    let second = editor(&pretty);
    assert_eq!(html(&second), html(&first));
}

#[test]
fn normalizing_twice_changes_nothing() {
    let mut editor = editor("<p>a<b>b</b><b>c</b></p><li>x</li>");
    let before = editor.to_json(None, ExportOptions::default());
    editor.apply_rules().unwrap();
    assert_eq!(editor.to_json(None, ExportOptions::default()), before);
    assert!(editor.history().is_empty());
}

struct Flip;

impl NormalizePass for Flip {
    fn id(&self) -> &'static str {
        "test.flip"
    }

    fn run(&self, _tree: &mut ArchTree) -> arch_core::Result<bool> {
        Ok(true)
    }
}

struct Restless;

impl ArchPlugin for Restless {
    fn id(&self) -> &'static str {
        "test.restless"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(Flip)]
    }
}

#[test]
fn passes_that_never_settle_are_reported() {
    let registry = ArchRegistry::with_plugins([Box::new(Restless) as Box<dyn ArchPlugin>]).unwrap();
    let config = EditorConfig {
        max_normalize_iterations: 3,
        ..EditorConfig::default()
    };
    let err = Editor::from_markup("<p>a</p>", registry, config).err().unwrap();
    assert!(matches!(err, ArchError::NormalizeDidNotConverge));
}

struct Figures;

impl ArchPlugin for Figures {
    fn id(&self) -> &'static str {
        "test.figures"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::block_container("figure"), NodeSpec::text_block("figcaption")]
    }

    fn placement_rules(&self) -> Vec<PlacementRule> {
        vec![PlacementRule::new(
            "caption-in-figure",
            |tree, id| tree.node(id).is_some_and(|n| n.is_named("figcaption")),
            |tree, parent| tree.node(parent).is_some_and(|n| n.is_named("figure")),
            PlacementFix::WrapIn("figure".into()),
        )]
    }
}

#[test]
fn host_placement_rules_apply() {
    let registry = ArchRegistry::with_plugins([Box::new(Figures) as Box<dyn ArchPlugin>]).unwrap();
    let editor = Editor::from_markup("<figcaption>c</figcaption>", registry, EditorConfig::default())
        .unwrap();
    assert_eq!(html(&editor), "<figure><figcaption>c</figcaption></figure>");
}

struct Paragraphs;

impl ArchPlugin for Paragraphs {
    fn id(&self) -> &'static str {
        "test.paragraphs"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::text_block("p")]
    }
}

#[test]
fn duplicate_node_names_are_rejected() {
    let result = ArchRegistry::with_plugins([Box::new(Paragraphs) as Box<dyn ArchPlugin>]);
    assert!(matches!(result, Err(ArchError::DuplicateRegistration(_))));
}
