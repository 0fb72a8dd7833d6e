//! Idempotent style writer.
//!
//! Applies or clears a [`ResolvedStyle`] on the nodes of one entity. Every
//! write is preceded by a read, so applying the same style twice leaves the
//! tree exactly as one application did and emits no second round of
//! mutations. Icon classes are recorded in [`ATTR_ICON_CLASSES`] so that a
//! later write removes exactly the classes this writer added.
//!
//! Only nodes that belong to the entity are touched: containers must carry
//! the entity id, and handle/content surfaces must have that container as
//! their nearest enclosing container. Nested child blocks reuse the same
//! roles and would otherwise pick up their parent's style.

use crate::config::{BackgroundMode, StyleSettings};
use crate::error::{StyleError, StyleResult};
use crate::gradient::{GradientShape, generate_multi_color_background};
use crate::tree::{self, COLLAPSED_CLASS, NodeRole, RenderTree};
use blockstyle_model::{IconSpec, ResolvedStyle};
use blockstyle_types::{EntityId, NodeId};
use std::collections::BTreeMap;
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::debug;

/// Resolved display color, on containers, titles and inline references.
pub const ATTR_COLOR: &str = "data-style-color";
/// Where the style came from (`self`, `tag`).
pub const ATTR_SOURCE: &str = "data-style-source";
/// Icon classes this writer added to a handle.
pub const ATTR_ICON_CLASSES: &str = "data-style-icon";
/// Glyph icon shown on a handle.
pub const ATTR_GLYPH: &str = "data-icon";

const STYLE_COLOR: &str = "color";
const STYLE_BACKGROUND: &str = "background-color";
const STYLE_BACKGROUND_IMAGE: &str = "background-image";
const STYLE_OPACITY: &str = "opacity";

/// The nodes of one entity within the visible panels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityNodes {
    pub entity: EntityId,
    pub containers: Vec<NodeId>,
    pub titles: Vec<NodeId>,
    pub inline_refs: Vec<NodeId>,
}

impl EntityNodes {
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            containers: Vec::new(),
            titles: Vec::new(),
            inline_refs: Vec::new(),
        }
    }

    /// Just one container of the entity.
    pub fn container(entity: EntityId, container: NodeId) -> Self {
        let mut nodes = Self::new(entity);
        nodes.containers.push(container);
        nodes
    }

    /// Files a node under its role. Surfaces other than containers, titles
    /// and inline references are reached through their container.
    pub fn push(&mut self, node: NodeId, role: NodeRole) {
        let list = match role {
            NodeRole::Container => &mut self.containers,
            NodeRole::Title => &mut self.titles,
            NodeRole::InlineReference => &mut self.inline_refs,
            NodeRole::Handle | NodeRole::Content => return,
        };
        if !list.contains(&node) {
            list.push(node);
        }
    }

    /// Adds the nodes of `other`, which must be for the same entity.
    pub fn merge(&mut self, other: EntityNodes) {
        debug_assert_eq!(self.entity, other.entity);
        for node in other.containers {
            self.push(node, NodeRole::Container);
        }
        for node in other.titles {
            self.push(node, NodeRole::Title);
        }
        for node in other.inline_refs {
            self.push(node, NodeRole::InlineReference);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.titles.is_empty() && self.inline_refs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.containers.len() + self.titles.len() + self.inline_refs.len()
    }
}

/// What one apply/clear call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Individual attribute/class/style writes performed.
    pub writes: usize,
    /// Nodes visited and found up to date or brought up to date.
    pub nodes_touched: usize,
    /// Handles that were no longer attached.
    pub skipped_stale: usize,
    /// Nodes that belonged to another entity.
    pub skipped_foreign: usize,
    pub failures: usize,
}

impl AddAssign for WriteReport {
    fn add_assign(&mut self, rhs: Self) {
        self.writes += rhs.writes;
        self.nodes_touched += rhs.nodes_touched;
        self.skipped_stale += rhs.skipped_stale;
        self.skipped_foreign += rhs.skipped_foreign;
        self.failures += rhs.failures;
    }
}

/// The writer-owned state of a container and its surfaces, as read back
/// from the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSnapshot(BTreeMap<String, String>);

impl StyleSnapshot {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Applies and clears resolved styles.
pub struct StyleWriter {
    tree: Arc<dyn RenderTree>,
    settings: StyleSettings,
}

impl StyleWriter {
    pub fn new(tree: Arc<dyn RenderTree>, settings: StyleSettings) -> Self {
        Self { tree, settings }
    }

    pub fn settings(&self) -> &StyleSettings {
        &self.settings
    }

    /// Brings every node of `nodes` to `style`. An unstyled style clears.
    pub fn apply(&self, nodes: &EntityNodes, style: &ResolvedStyle) -> WriteReport {
        if style.is_none() {
            return self.clear(nodes);
        }

        let mut report = WriteReport::default();
        for &container in &nodes.containers {
            self.guarded(&mut report, container, nodes.entity, |w, r| {
                w.apply_container(container, nodes.entity, style, r)
            });
        }

        let color = style.display_color.map(|c| c.to_hex());
        let text_style = TextStyle {
            color: color.as_deref(),
            source: Some(style.source.as_str()),
        };
        for &title in &nodes.titles {
            let text = if self.settings.color_titles {
                text_style
            } else {
                TextStyle::CLEAR
            };
            self.guarded(&mut report, title, nodes.entity, |w, r| {
                w.write_text(title, text, r)
            });
        }
        for &reference in &nodes.inline_refs {
            let text = if self.settings.color_inline_refs {
                text_style
            } else {
                TextStyle::CLEAR
            };
            self.guarded(&mut report, reference, nodes.entity, |w, r| {
                w.write_text(reference, text, r)
            });
        }
        report
    }

    /// Removes everything this writer may have written on `nodes`.
    pub fn clear(&self, nodes: &EntityNodes) -> WriteReport {
        let mut report = WriteReport::default();
        for &container in &nodes.containers {
            self.guarded(&mut report, container, nodes.entity, |w, r| {
                w.clear_container(container, nodes.entity, r)
            });
        }
        for &node in nodes.titles.iter().chain(&nodes.inline_refs) {
            self.guarded(&mut report, node, nodes.entity, |w, r| {
                w.write_text(node, TextStyle::CLEAR, r)
            });
        }
        report
    }

    /// Reads back the writer-owned state of a container and its surfaces.
    pub fn snapshot(&self, container: NodeId) -> StyleSnapshot {
        let tree = self.tree.as_ref();
        let mut map = BTreeMap::new();
        for attr in [ATTR_COLOR, ATTR_SOURCE] {
            if let Some(v) = tree.attribute(container, attr) {
                map.insert(format!("container:{attr}"), v);
            }
        }
        for (node, role) in tree::own_surfaces(tree, container) {
            let prefix = match role {
                NodeRole::Handle => "handle",
                _ => "content",
            };
            for prop in [STYLE_COLOR, STYLE_BACKGROUND, STYLE_BACKGROUND_IMAGE, STYLE_OPACITY] {
                if let Some(v) = tree.style(node, prop) {
                    map.insert(format!("{prefix}:{prop}"), v);
                }
            }
            for attr in [ATTR_ICON_CLASSES, ATTR_GLYPH] {
                if let Some(v) = tree.attribute(node, attr) {
                    map.insert(format!("{prefix}:{attr}"), v);
                }
            }
            for class in recorded_icon_classes(tree, node) {
                let present = tree.has_class(node, &class);
                map.insert(format!("{prefix}:class:{class}"), present.to_string());
            }
        }
        StyleSnapshot(map)
    }

    fn guarded(
        &self,
        report: &mut WriteReport,
        node: NodeId,
        entity: EntityId,
        f: impl FnOnce(&Self, &mut WriteReport) -> StyleResult<()>,
    ) {
        if !self.tree.is_attached(node) {
            debug!("Skipping detached node {} of entity {}", node, entity);
            report.skipped_stale += 1;
            return;
        }
        if self.tree.entity_id(node) != Some(entity) {
            report.skipped_foreign += 1;
            return;
        }
        match f(self, report) {
            Ok(()) => report.nodes_touched += 1,
            Err(StyleError::Detached(n)) => {
                debug!("Node {} detached while writing entity {}", n, entity);
                report.skipped_stale += 1;
            }
            Err(e) => {
                debug!("Failed to write node {} of entity {}: {}", node, entity, e);
                report.failures += 1;
            }
        }
    }

    /// Whether `surface` sits directly in `container`'s scope.
    fn owned_by(&self, surface: NodeId, container: NodeId) -> bool {
        tree::enclosing_container(self.tree.as_ref(), surface) == Some(container)
    }

    fn apply_container(
        &self,
        container: NodeId,
        entity: EntityId,
        style: &ResolvedStyle,
        report: &mut WriteReport,
    ) -> StyleResult<()> {
        let color = style.display_color.map(|c| c.to_hex());
        self.set_attr(container, ATTR_COLOR, color.as_deref(), report)?;
        self.set_attr(container, ATTR_SOURCE, Some(style.source.as_str()), report)?;

        let collapsed = self.tree.has_class(container, COLLAPSED_CLASS);
        for (surface, role) in tree::own_surfaces(self.tree.as_ref(), container) {
            if !self.owned_by(surface, container) {
                debug!("Surface {} is outside entity {}", surface, entity);
                report.skipped_foreign += 1;
                continue;
            }
            match role {
                NodeRole::Handle => {
                    self.apply_handle(surface, style, color.as_deref(), collapsed, report)?
                }
                NodeRole::Content => self.apply_content(surface, style, report)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn apply_handle(
        &self,
        handle: NodeId,
        style: &ResolvedStyle,
        color: Option<&str>,
        collapsed: bool,
        report: &mut WriteReport,
    ) -> StyleResult<()> {
        self.set_style(handle, STYLE_COLOR, color, report)?;

        if style.is_multi_tag() {
            let gradient = generate_multi_color_background(
                &style.tag_colors,
                GradientShape::Conic,
                self.settings.handle_gradient_alpha,
            );
            self.set_style(handle, STYLE_BACKGROUND_IMAGE, gradient.as_deref(), report)?;
            self.set_style(handle, STYLE_BACKGROUND, None, report)?;
            self.set_style(handle, STYLE_OPACITY, Some("1"), report)?;
        } else {
            self.set_style(handle, STYLE_BACKGROUND_IMAGE, None, report)?;
            match (collapsed, style.background_base) {
                (true, Some(base)) => {
                    let background = match self.settings.collapsed_background {
                        BackgroundMode::Alpha => base.to_rgba(self.settings.collapsed_alpha),
                        BackgroundMode::Lighten => {
                            base.lighten(self.settings.lighten_amount).to_hex()
                        }
                    };
                    self.set_style(handle, STYLE_BACKGROUND, Some(&background), report)?;
                    self.set_style(handle, STYLE_OPACITY, None, report)?;
                }
                _ => {
                    // host animations can leave a translucent handle behind
                    self.set_style(handle, STYLE_BACKGROUND, None, report)?;
                    self.set_style(handle, STYLE_OPACITY, Some("1"), report)?;
                }
            }
        }

        self.write_icon(handle, style.icon.as_deref(), report)
    }

    fn apply_content(
        &self,
        content: NodeId,
        style: &ResolvedStyle,
        report: &mut WriteReport,
    ) -> StyleResult<()> {
        let gradient = if style.is_multi_tag() && self.settings.gradient_content {
            generate_multi_color_background(
                &style.tag_colors,
                GradientShape::Linear,
                self.settings.content_gradient_alpha,
            )
        } else {
            None
        };
        self.set_style(content, STYLE_BACKGROUND_IMAGE, gradient.as_deref(), report)
    }

    fn clear_container(
        &self,
        container: NodeId,
        entity: EntityId,
        report: &mut WriteReport,
    ) -> StyleResult<()> {
        self.set_attr(container, ATTR_COLOR, None, report)?;
        self.set_attr(container, ATTR_SOURCE, None, report)?;
        for (surface, _) in tree::own_surfaces(self.tree.as_ref(), container) {
            if !self.owned_by(surface, container) {
                debug!("Surface {} is outside entity {}", surface, entity);
                report.skipped_foreign += 1;
                continue;
            }
            for prop in [STYLE_COLOR, STYLE_BACKGROUND, STYLE_BACKGROUND_IMAGE, STYLE_OPACITY] {
                self.set_style(surface, prop, None, report)?;
            }
            self.write_icon(surface, None, report)?;
        }
        Ok(())
    }

    fn write_text(&self, node: NodeId, text: TextStyle<'_>, report: &mut WriteReport) -> StyleResult<()> {
        self.set_style(node, STYLE_COLOR, text.color, report)?;
        self.set_attr(node, ATTR_COLOR, text.color, report)?;
        self.set_attr(node, ATTR_SOURCE, text.source.filter(|_| text.color.is_some()), report)
    }

    fn write_icon(&self, node: NodeId, icon: Option<&str>, report: &mut WriteReport) -> StyleResult<()> {
        let (classes, glyph) = match icon.and_then(IconSpec::parse) {
            Some(IconSpec::Classes(classes)) => (classes, None),
            Some(IconSpec::Glyph(glyph)) => (Vec::new(), Some(glyph)),
            None => (Vec::new(), None),
        };

        let previous = recorded_icon_classes(self.tree.as_ref(), node);
        for class in previous.iter().filter(|c| !classes.contains(c)) {
            if self.tree.has_class(node, class) {
                self.tree.remove_class(node, class)?;
                report.writes += 1;
            }
        }

        // Only classes this writer put on the node are recorded, so a later
        // clear leaves host-owned classes alone.
        let mut owned: Vec<&str> = Vec::new();
        for class in &classes {
            if owned.contains(&class.as_str()) {
                continue;
            }
            let present = self.tree.has_class(node, class);
            if !present {
                self.tree.add_class(node, class)?;
                report.writes += 1;
            }
            if !present || previous.contains(class) {
                owned.push(class);
            }
        }

        let recorded = (!owned.is_empty()).then(|| owned.join(" "));
        self.set_attr(node, ATTR_ICON_CLASSES, recorded.as_deref(), report)?;
        self.set_attr(node, ATTR_GLYPH, glyph.as_deref(), report)
    }

    fn set_style(
        &self,
        node: NodeId,
        property: &str,
        value: Option<&str>,
        report: &mut WriteReport,
    ) -> StyleResult<()> {
        let current = self.tree.style(node, property);
        match value {
            Some(v) if current.as_deref() != Some(v) => {
                self.tree.set_style(node, property, v)?;
                report.writes += 1;
            }
            None if current.is_some() => {
                self.tree.remove_style(node, property)?;
                report.writes += 1;
            }
            _ => {}
        }
        Ok(())
    }

    fn set_attr(
        &self,
        node: NodeId,
        name: &str,
        value: Option<&str>,
        report: &mut WriteReport,
    ) -> StyleResult<()> {
        let current = self.tree.attribute(node, name);
        match value {
            Some(v) if current.as_deref() != Some(v) => {
                self.tree.set_attribute(node, name, v)?;
                report.writes += 1;
            }
            None if current.is_some() => {
                self.tree.remove_attribute(node, name)?;
                report.writes += 1;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Color and source written to a title or inline reference.
#[derive(Debug, Clone, Copy)]
struct TextStyle<'a> {
    color: Option<&'a str>,
    source: Option<&'a str>,
}

impl TextStyle<'_> {
    const CLEAR: TextStyle<'static> = TextStyle {
        color: None,
        source: None,
    };
}

fn recorded_icon_classes(tree: &dyn RenderTree, node: NodeId) -> Vec<String> {
    tree.attribute(node, ATTR_ICON_CLASSES)
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
