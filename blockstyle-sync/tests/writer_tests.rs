use blockstyle_model::{ResolvedStyle, StyleSource};
use blockstyle_sync::tree::memory::MemoryTree;
use blockstyle_sync::writer::{ATTR_COLOR, ATTR_GLYPH, ATTR_ICON_CLASSES, ATTR_SOURCE};
use blockstyle_sync::{BackgroundMode, EntityNodes, StyleSettings, StyleWriter};
use blockstyle_types::{Color, EntityId, NodeId};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

struct Block {
    container: NodeId,
    handle: NodeId,
    content: NodeId,
}

fn color(hex: &str) -> Color {
    Color::parse_hex(hex).unwrap()
}

fn make_tree() -> (Arc<MemoryTree>, NodeId) {
    let tree = Arc::new(MemoryTree::new());
    let root = tree.mount_panel("p1");
    (tree, root)
}

fn add_block(tree: &MemoryTree, parent: NodeId, entity: i64) -> Block {
    let (container, handle, content) = tree.add_block(parent, EntityId::new(entity)).unwrap();
    Block {
        container,
        handle,
        content,
    }
}

fn make_writer(tree: &Arc<MemoryTree>) -> StyleWriter {
    StyleWriter::new(tree.clone(), StyleSettings::default())
}

fn own_style(hex: &str, icon: Option<&str>) -> ResolvedStyle {
    ResolvedStyle {
        display_color: Some(color(hex)),
        background_base: Some(color(hex)),
        icon: icon.map(str::to_string),
        source: StyleSource::Own,
        tag_colors: vec![],
    }
}

fn tag_style(hexes: &[&str]) -> ResolvedStyle {
    let colors: Vec<Color> = hexes.iter().map(|h| color(h)).collect();
    ResolvedStyle {
        display_color: colors.first().copied(),
        background_base: colors.first().copied(),
        icon: None,
        source: StyleSource::Tag,
        tag_colors: colors,
    }
}

fn style_of(tree: &MemoryTree, node: NodeId, property: &str) -> Option<String> {
    tree.styles_of(node).get(property).cloned()
}

fn attr_of(tree: &MemoryTree, node: NodeId, name: &str) -> Option<String> {
    tree.attributes_of(node).get(name).cloned()
}

type NodeState = (
    BTreeMap<String, String>,
    Vec<String>,
    BTreeMap<String, String>,
);

fn state_of(tree: &MemoryTree, nodes: &[NodeId]) -> Vec<NodeState> {
    nodes
        .iter()
        .map(|n| {
            let mut classes = tree.classes_of(*n);
            classes.sort();
            (tree.styles_of(*n), classes, tree.attributes_of(*n))
        })
        .collect()
}

// ── Single-color path ───────────────────────────────────────────

#[test]
fn single_color_expanded() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let writer = make_writer(&tree);

    let report = writer.apply(
        &EntityNodes::container(EntityId::new(100), block.container),
        &own_style("#ff0000", None),
    );

    assert_eq!(report.nodes_touched, 1);
    assert_eq!(style_of(&tree, block.handle, "color").as_deref(), Some("#ff0000"));
    assert_eq!(style_of(&tree, block.handle, "background-color"), None);
    assert_eq!(style_of(&tree, block.handle, "opacity").as_deref(), Some("1"));
    assert_eq!(
        attr_of(&tree, block.container, ATTR_COLOR).as_deref(),
        Some("#ff0000")
    );
    assert_eq!(attr_of(&tree, block.container, ATTR_SOURCE).as_deref(), Some("self"));
    assert_eq!(style_of(&tree, block.content, "background-image"), None);
}

#[test]
fn single_color_collapsed_alpha_background() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    tree.toggle_class(block.container, "collapsed", true);
    let writer = make_writer(&tree);

    writer.apply(
        &EntityNodes::container(EntityId::new(100), block.container),
        &own_style("#ff0000", None),
    );

    assert_eq!(
        style_of(&tree, block.handle, "background-color").as_deref(),
        Some("rgba(255,0,0,0.45)")
    );
    assert_eq!(style_of(&tree, block.handle, "opacity"), None);
}

#[test]
fn single_color_collapsed_lighten_background() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    tree.toggle_class(block.container, "collapsed", true);
    let settings = StyleSettings {
        collapsed_background: BackgroundMode::Lighten,
        ..StyleSettings::default()
    };
    let writer = StyleWriter::new(tree.clone(), settings);

    writer.apply(
        &EntityNodes::container(EntityId::new(100), block.container),
        &own_style("#ff0000", None),
    );

    assert_eq!(
        style_of(&tree, block.handle, "background-color").as_deref(),
        Some("#ff8c8c")
    );
}

#[test]
fn expanding_clears_background_and_restores_opacity() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let nodes = EntityNodes::container(EntityId::new(100), block.container);
    let writer = make_writer(&tree);

    tree.toggle_class(block.container, "collapsed", true);
    writer.apply(&nodes, &own_style("#ff0000", None));
    tree.toggle_class(block.container, "collapsed", false);
    writer.apply(&nodes, &own_style("#ff0000", None));

    assert_eq!(style_of(&tree, block.handle, "background-color"), None);
    assert_eq!(style_of(&tree, block.handle, "opacity").as_deref(), Some("1"));
}

// ── Multi-tag path ──────────────────────────────────────────────

#[test]
fn multi_tag_gradients() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let writer = make_writer(&tree);

    writer.apply(
        &EntityNodes::container(EntityId::new(100), block.container),
        &tag_style(&["#111111", "#222222"]),
    );

    let handle_bg = style_of(&tree, block.handle, "background-image").unwrap();
    assert!(handle_bg.starts_with("conic-gradient("), "{handle_bg}");
    assert!(handle_bg.contains("rgba(17,17,17,0.75)"), "{handle_bg}");
    let content_bg = style_of(&tree, block.content, "background-image").unwrap();
    assert!(content_bg.starts_with("linear-gradient("), "{content_bg}");
    assert!(content_bg.contains("rgba(34,34,34,0.45)"), "{content_bg}");
    assert_eq!(style_of(&tree, block.handle, "color").as_deref(), Some("#111111"));
    assert_eq!(attr_of(&tree, block.container, ATTR_SOURCE).as_deref(), Some("tag"));
}

#[test]
fn multi_tag_without_content_gradient() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let settings = StyleSettings {
        gradient_content: false,
        ..StyleSettings::default()
    };
    let writer = StyleWriter::new(tree.clone(), settings);

    writer.apply(
        &EntityNodes::container(EntityId::new(100), block.container),
        &tag_style(&["#111111", "#222222", "#333333"]),
    );

    assert!(style_of(&tree, block.handle, "background-image").is_some());
    assert_eq!(style_of(&tree, block.content, "background-image"), None);
}

#[test]
fn switching_from_gradient_to_single_color_drops_gradient() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let nodes = EntityNodes::container(EntityId::new(100), block.container);
    let writer = make_writer(&tree);

    writer.apply(&nodes, &tag_style(&["#111111", "#222222"]));
    writer.apply(&nodes, &tag_style(&["#111111"]));

    assert_eq!(style_of(&tree, block.handle, "background-image"), None);
    assert_eq!(style_of(&tree, block.content, "background-image"), None);
    assert_eq!(style_of(&tree, block.handle, "color").as_deref(), Some("#111111"));
}

// ── Titles and inline references ────────────────────────────────

#[test]
fn titles_and_inline_refs_get_display_color_only() {
    let (tree, root) = make_tree();
    let title = tree.add_title(root, EntityId::new(100)).unwrap();
    let other = add_block(&tree, root, 200);
    let reference = tree.add_inline_ref(other.content, EntityId::new(100)).unwrap();
    let writer = make_writer(&tree);

    let mut nodes = EntityNodes::new(EntityId::new(100));
    nodes.titles.push(title);
    nodes.inline_refs.push(reference);
    writer.apply(&nodes, &tag_style(&["#111111", "#222222"]));

    for node in [title, reference] {
        assert_eq!(style_of(&tree, node, "color").as_deref(), Some("#111111"));
        assert_eq!(style_of(&tree, node, "background-image"), None);
        assert_eq!(attr_of(&tree, node, ATTR_SOURCE).as_deref(), Some("tag"));
    }
}

#[test]
fn disabled_toggles_leave_titles_and_refs_alone() {
    let (tree, root) = make_tree();
    let title = tree.add_title(root, EntityId::new(100)).unwrap();
    let reference = tree.add_inline_ref(root, EntityId::new(100)).unwrap();
    let settings = StyleSettings {
        color_titles: false,
        color_inline_refs: false,
        ..StyleSettings::default()
    };
    let writer = StyleWriter::new(tree.clone(), settings);

    let mut nodes = EntityNodes::new(EntityId::new(100));
    nodes.titles.push(title);
    nodes.inline_refs.push(reference);
    let report = writer.apply(&nodes, &own_style("#ff0000", None));

    assert_eq!(report.writes, 0);
    assert!(tree.styles_of(title).is_empty());
    assert!(tree.styles_of(reference).is_empty());
}

// ── Icons ───────────────────────────────────────────────────────

#[test]
fn class_icon_swap_removes_previous_classes() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let nodes = EntityNodes::container(EntityId::new(100), block.container);
    let writer = make_writer(&tree);

    writer.apply(&nodes, &own_style("#ff0000", Some("ti ti-star")));
    writer.apply(&nodes, &own_style("#ff0000", Some("ti ti-flag")));

    let mut classes = tree.classes_of(block.handle);
    classes.sort();
    assert_eq!(classes, vec!["ti".to_string(), "ti-flag".to_string()]);
    assert_eq!(
        attr_of(&tree, block.handle, ATTR_ICON_CLASSES).as_deref(),
        Some("ti ti-flag")
    );
}

#[test]
fn glyph_icon_uses_attribute() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let nodes = EntityNodes::container(EntityId::new(100), block.container);
    let writer = make_writer(&tree);

    writer.apply(&nodes, &own_style("#ff0000", Some("ti ti-star")));
    writer.apply(&nodes, &own_style("#ff0000", Some("🔥")));

    assert!(tree.classes_of(block.handle).is_empty());
    assert_eq!(attr_of(&tree, block.handle, ATTR_GLYPH).as_deref(), Some("🔥"));
    assert_eq!(attr_of(&tree, block.handle, ATTR_ICON_CLASSES), None);
}

#[test]
fn host_classes_survive_icon_changes() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    tree.toggle_class(block.handle, "bullet", true);
    let nodes = EntityNodes::container(EntityId::new(100), block.container);
    let writer = make_writer(&tree);

    writer.apply(&nodes, &own_style("#ff0000", Some("ti ti-star")));
    writer.clear(&nodes);

    assert_eq!(tree.classes_of(block.handle), vec!["bullet".to_string()]);
}

#[test]
fn host_owned_icon_class_survives_clear() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    tree.toggle_class(block.handle, "ti", true);
    let nodes = EntityNodes::container(EntityId::new(100), block.container);
    let writer = make_writer(&tree);

    writer.apply(&nodes, &own_style("#ff0000", Some("ti ti-star")));
    assert_eq!(
        attr_of(&tree, block.handle, ATTR_ICON_CLASSES).as_deref(),
        Some("ti-star")
    );
    assert_eq!(writer.apply(&nodes, &own_style("#ff0000", Some("ti ti-star"))).writes, 0);

    writer.clear(&nodes);
    assert_eq!(tree.classes_of(block.handle), vec!["ti".to_string()]);
}

#[test]
fn host_owned_icon_class_survives_swap() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    tree.toggle_class(block.handle, "ti", true);
    let nodes = EntityNodes::container(EntityId::new(100), block.container);
    let writer = make_writer(&tree);

    writer.apply(&nodes, &own_style("#ff0000", Some("ti ti-star")));
    writer.apply(&nodes, &own_style("#ff0000", Some("ti ti-flag")));
    writer.apply(&nodes, &own_style("#ff0000", Some("🔥")));

    assert_eq!(tree.classes_of(block.handle), vec!["ti".to_string()]);
    assert_eq!(attr_of(&tree, block.handle, ATTR_ICON_CLASSES), None);
}

// ── Idempotence and clearing ────────────────────────────────────

#[test]
fn second_apply_writes_nothing() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let nodes = EntityNodes::container(EntityId::new(100), block.container);
    let writer = make_writer(&tree);
    let style = own_style("#ff0000", Some("ti ti-star"));

    let first = writer.apply(&nodes, &style);
    let state = state_of(&tree, &[block.container, block.handle, block.content]);
    let writes = tree.write_count();
    let second = writer.apply(&nodes, &style);

    assert!(first.writes > 0);
    assert_eq!(second.writes, 0);
    assert_eq!(tree.write_count(), writes);
    assert_eq!(
        state_of(&tree, &[block.container, block.handle, block.content]),
        state
    );
}

#[test]
fn clear_removes_everything_written() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let title = tree.add_title(root, EntityId::new(100)).unwrap();
    let before = state_of(&tree, &[block.container, block.handle, block.content, title]);
    let mut nodes = EntityNodes::container(EntityId::new(100), block.container);
    nodes.titles.push(title);
    let writer = make_writer(&tree);

    tree.toggle_class(block.container, "collapsed", true);
    writer.apply(&nodes, &own_style("#ff0000", Some("ti ti-star")));
    writer.clear(&nodes);
    tree.toggle_class(block.container, "collapsed", false);

    assert_eq!(
        state_of(&tree, &[block.container, block.handle, block.content, title]),
        before
    );
}

#[test]
fn applying_none_clears() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let nodes = EntityNodes::container(EntityId::new(100), block.container);
    let writer = make_writer(&tree);

    writer.apply(&nodes, &own_style("#ff0000", None));
    writer.apply(&nodes, &ResolvedStyle::none());

    assert!(tree.styles_of(block.handle).is_empty());
    assert!(tree.attributes_of(block.container).is_empty());
}

#[test]
fn clearing_an_unstyled_node_writes_nothing() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let writer = make_writer(&tree);

    let report = writer.clear(&EntityNodes::container(EntityId::new(100), block.container));
    assert_eq!(report.writes, 0);
    assert_eq!(tree.write_count(), 0);
}

// ── Scoping ─────────────────────────────────────────────────────

#[test]
fn nested_child_block_is_not_touched() {
    let (tree, root) = make_tree();
    let parent = add_block(&tree, root, 100);
    let child = add_block(&tree, parent.container, 200);
    let writer = make_writer(&tree);

    writer.apply(
        &EntityNodes::container(EntityId::new(100), parent.container),
        &own_style("#ff0000", Some("ti ti-star")),
    );

    assert!(tree.styles_of(child.handle).is_empty());
    assert!(tree.classes_of(child.handle).is_empty());
    assert!(tree.attributes_of(child.container).is_empty());
}

#[test]
fn foreign_container_is_skipped() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 200);
    let writer = make_writer(&tree);

    let report = writer.apply(
        &EntityNodes::container(EntityId::new(100), block.container),
        &own_style("#ff0000", None),
    );

    assert_eq!(report.skipped_foreign, 1);
    assert_eq!(tree.write_count(), 0);
}

#[test]
fn detached_container_is_skipped() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    tree.detach(block.container);
    let writer = make_writer(&tree);

    let report = writer.apply(
        &EntityNodes::container(EntityId::new(100), block.container),
        &own_style("#ff0000", None),
    );

    assert_eq!(report.skipped_stale, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(tree.write_count(), 0);
}

// ── Snapshots ───────────────────────────────────────────────────

#[test]
fn snapshot_sees_external_reset() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let writer = make_writer(&tree);
    writer.apply(
        &EntityNodes::container(EntityId::new(100), block.container),
        &own_style("#ff0000", Some("ti ti-star")),
    );

    let expected = writer.snapshot(block.container);
    assert_eq!(expected.get("handle:color"), Some("#ff0000"));
    assert_eq!(expected.get("handle:class:ti-star"), Some("true"));
    assert_eq!(writer.snapshot(block.container), expected);

    tree.reset_styles(block.handle);
    assert_ne!(writer.snapshot(block.container), expected);
}

#[test]
fn snapshot_sees_dropped_icon_class() {
    let (tree, root) = make_tree();
    let block = add_block(&tree, root, 100);
    let writer = make_writer(&tree);
    writer.apply(
        &EntityNodes::container(EntityId::new(100), block.container),
        &own_style("#ff0000", Some("ti ti-star")),
    );
    let expected = writer.snapshot(block.container);

    tree.toggle_class(block.handle, "ti-star", false);
    let observed = writer.snapshot(block.container);
    assert_eq!(observed.get("handle:class:ti-star"), Some("false"));
    assert_ne!(observed, expected);
}

// ── Properties ──────────────────────────────────────────────────

fn arb_color() -> impl Strategy<Value = Color> {
    (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(r, g, b)| Color::rgb(r, g, b))
}

fn arb_icon() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("ti ti-star".to_string())),
        Just(Some("ti ti-flag ti-filled".to_string())),
        Just(Some("🔥".to_string())),
    ]
}

fn arb_style() -> impl Strategy<Value = ResolvedStyle> {
    prop_oneof![
        Just(ResolvedStyle::none()),
        (arb_color(), arb_icon()).prop_map(|(c, icon)| ResolvedStyle {
            display_color: Some(c),
            background_base: Some(c),
            icon,
            source: StyleSource::Own,
            tag_colors: vec![],
        }),
        (proptest::collection::vec(arb_color(), 0..=4), arb_icon()).prop_map(|(colors, icon)| {
            ResolvedStyle {
                display_color: colors.first().copied(),
                background_base: colors.first().copied(),
                icon,
                source: StyleSource::Tag,
                tag_colors: colors,
            }
        }),
    ]
}

proptest! {
    #[test]
    fn apply_is_idempotent(
        previous in arb_style(),
        style in arb_style(),
        collapsed in any::<bool>(),
    ) {
        let (tree, root) = make_tree();
        let block = add_block(&tree, root, 100);
        let title = tree.add_title(root, EntityId::new(100)).unwrap();
        tree.toggle_class(block.container, "collapsed", collapsed);
        let mut nodes = EntityNodes::container(EntityId::new(100), block.container);
        nodes.titles.push(title);
        let writer = make_writer(&tree);
        let all = [block.container, block.handle, block.content, title];

        writer.apply(&nodes, &previous);
        writer.apply(&nodes, &style);
        let once = state_of(&tree, &all);
        let second = writer.apply(&nodes, &style);

        prop_assert_eq!(second.writes, 0);
        prop_assert_eq!(state_of(&tree, &all), once);
    }
}
