//! A thread-safe in-memory render tree.
//!
//! Behaves like the host tree as far as the engine can tell: nodes can be
//! detached while handles to them are still held, every attribute write is
//! reported to subscribers (even when the value did not change), and child
//! insertions/removals are reported on the parent.

use super::{MutationKind, NodeRole, ObserveOptions, RenderTree, TreeMutation, TreeSubscription};
use crate::error::{StyleError, StyleResult};
use crate::lock;
use blockstyle_types::{EntityId, NodeId, PanelId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct MemNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    role: Option<NodeRole>,
    entity: Option<EntityId>,
    classes: Vec<String>,
    styles: BTreeMap<String, String>,
    attributes: BTreeMap<String, String>,
}

#[derive(Debug)]
struct Subscriber {
    roots: Vec<NodeId>,
    options: ObserveOptions,
    sender: mpsc::UnboundedSender<Vec<TreeMutation>>,
}

#[derive(Debug)]
struct Inner {
    next_id: u64,
    document: NodeId,
    nodes: HashMap<NodeId, MemNode>,
    panels: HashMap<PanelId, NodeId>,
    subscribers: Vec<Subscriber>,
    writes: usize,
}

impl Inner {
    fn alloc(&mut self, role: Option<NodeRole>, entity: Option<EntityId>) -> NodeId {
        let id = NodeId::from_raw(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            MemNode {
                role,
                entity,
                ..MemNode::default()
            },
        );
        id
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == self.document {
                return true;
            }
            current = self.nodes.get(&n).and_then(|m| m.parent);
        }
        false
    }

    fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.nodes.get(&n).and_then(|m| m.parent);
        }
        false
    }

    fn attached_mut(&mut self, node: NodeId) -> StyleResult<&mut MemNode> {
        if !self.is_attached(node) {
            return Err(StyleError::Detached(node));
        }
        self.nodes.get_mut(&node).ok_or(StyleError::Detached(node))
    }

    fn emit(&mut self, mutation: TreeMutation) {
        self.subscribers.retain(|s| !s.sender.is_closed());
        for sub in &self.subscribers {
            let wanted = match mutation.kind {
                MutationKind::Attribute { .. } => sub.options.attributes,
                MutationKind::ChildList { .. } => sub.options.child_list,
            };
            if wanted && sub.roots.iter().any(|r| self.is_within(mutation.target, *r)) {
                let _ = sub.sender.send(vec![mutation.clone()]);
            }
        }
    }

    fn detach(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(&node).and_then(|m| m.parent)?;
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != node);
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = None;
        }
        Some(parent)
    }
}

/// In-memory [`RenderTree`].
#[derive(Debug)]
pub struct MemoryTree {
    inner: Mutex<Inner>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    /// Creates a tree holding only the document node.
    pub fn new() -> Self {
        let document = NodeId::from_raw(0);
        let mut nodes = HashMap::new();
        nodes.insert(document, MemNode::default());
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                document,
                nodes,
                panels: HashMap::new(),
                subscribers: Vec::new(),
                writes: 0,
            }),
        }
    }

    /// The document node every attached node descends from.
    pub fn document(&self) -> NodeId {
        lock(&self.inner).document
    }

    /// Creates a detached node.
    pub fn create(&self, role: Option<NodeRole>, entity: Option<EntityId>) -> NodeId {
        lock(&self.inner).alloc(role, entity)
    }

    /// Appends `child` under `parent`, moving it if it already has a parent.
    pub fn append(&self, parent: NodeId, child: NodeId) -> StyleResult<()> {
        let mut inner = lock(&self.inner);
        if !inner.nodes.contains_key(&parent) || !inner.nodes.contains_key(&child) {
            return Err(StyleError::Detached(parent));
        }
        if let Some(old_parent) = inner.detach(child) {
            inner.emit(TreeMutation::child_list(old_parent, Vec::new(), vec![child]));
        }
        if let Some(p) = inner.nodes.get_mut(&parent) {
            p.children.push(child);
        }
        if let Some(c) = inner.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
        inner.emit(TreeMutation::child_list(parent, vec![child], Vec::new()));
        Ok(())
    }

    /// Removes `node` (and its subtree) from its parent. Handles stay valid
    /// but report detached.
    pub fn detach(&self, node: NodeId) {
        let mut inner = lock(&self.inner);
        if let Some(parent) = inner.detach(node) {
            inner.emit(TreeMutation::child_list(parent, Vec::new(), vec![node]));
        }
    }

    /// Renders a panel root under the document.
    pub fn mount_panel(&self, panel: impl Into<PanelId>) -> NodeId {
        let root = self.create(None, None);
        let document = self.document();
        // both nodes exist, so this cannot fail
        let _ = self.append(document, root);
        lock(&self.inner).panels.insert(panel.into(), root);
        root
    }

    /// Removes a panel root from the tree.
    pub fn unmount_panel(&self, panel: &PanelId) {
        let root = lock(&self.inner).panels.remove(panel);
        if let Some(root) = root {
            self.detach(root);
        }
    }

    /// Renders a block: a container with a handle and a content node.
    /// Returns `(container, handle, content)`.
    pub fn add_block(
        &self,
        parent: NodeId,
        entity: EntityId,
    ) -> StyleResult<(NodeId, NodeId, NodeId)> {
        let container = self.create(Some(NodeRole::Container), Some(entity));
        let handle = self.create(Some(NodeRole::Handle), None);
        let content = self.create(Some(NodeRole::Content), None);
        self.append(container, handle)?;
        self.append(container, content)?;
        self.append(parent, container)?;
        Ok((container, handle, content))
    }

    /// Renders a title for `entity` under `parent`.
    pub fn add_title(&self, parent: NodeId, entity: EntityId) -> StyleResult<NodeId> {
        let title = self.create(Some(NodeRole::Title), Some(entity));
        self.append(parent, title)?;
        Ok(title)
    }

    /// Renders an inline reference to `entity` under `parent`.
    pub fn add_inline_ref(&self, parent: NodeId, entity: EntityId) -> StyleResult<NodeId> {
        let node = self.create(Some(NodeRole::InlineReference), Some(entity));
        self.append(parent, node)?;
        Ok(node)
    }

    /// Adds or removes a class the way a host re-render would. Not counted
    /// as an engine write.
    pub fn toggle_class(&self, node: NodeId, class: &str, present: bool) {
        let mut inner = lock(&self.inner);
        let Some(n) = inner.nodes.get_mut(&node) else {
            return;
        };
        n.classes.retain(|c| c != class);
        if present {
            n.classes.push(class.to_string());
        }
        inner.emit(TreeMutation::attribute(node, "class"));
    }

    /// Drops all inline styles of a node, as a host re-render does. Not
    /// counted as an engine write.
    pub fn reset_styles(&self, node: NodeId) {
        let mut inner = lock(&self.inner);
        if let Some(n) = inner.nodes.get_mut(&node) {
            n.styles.clear();
            inner.emit(TreeMutation::attribute(node, "style"));
        }
    }

    /// Number of writes made through the [`RenderTree`] interface.
    pub fn write_count(&self) -> usize {
        lock(&self.inner).writes
    }

    /// Inline styles of a node.
    pub fn styles_of(&self, node: NodeId) -> BTreeMap<String, String> {
        lock(&self.inner)
            .nodes
            .get(&node)
            .map(|n| n.styles.clone())
            .unwrap_or_default()
    }

    /// Classes of a node, in insertion order.
    pub fn classes_of(&self, node: NodeId) -> Vec<String> {
        lock(&self.inner)
            .nodes
            .get(&node)
            .map(|n| n.classes.clone())
            .unwrap_or_default()
    }

    /// Attributes of a node.
    pub fn attributes_of(&self, node: NodeId) -> BTreeMap<String, String> {
        lock(&self.inner)
            .nodes
            .get(&node)
            .map(|n| n.attributes.clone())
            .unwrap_or_default()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = lock(&self.inner);
        inner.subscribers.retain(|s| !s.sender.is_closed());
        inner.subscribers.len()
    }

    fn write(
        &self,
        node: NodeId,
        attribute: &str,
        f: impl FnOnce(&mut MemNode),
    ) -> StyleResult<()> {
        let mut inner = lock(&self.inner);
        f(inner.attached_mut(node)?);
        inner.writes += 1;
        inner.emit(TreeMutation::attribute(node, attribute));
        Ok(())
    }

    fn read<T>(&self, node: NodeId, f: impl FnOnce(&MemNode) -> Option<T>) -> Option<T> {
        lock(&self.inner).nodes.get(&node).and_then(f)
    }
}

impl RenderTree for MemoryTree {
    fn panel_root(&self, panel: &PanelId) -> Option<NodeId> {
        let inner = lock(&self.inner);
        inner
            .panels
            .get(panel)
            .copied()
            .filter(|root| inner.is_attached(*root))
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.read(node, |n| n.parent)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.read(node, |n| Some(n.children.clone()))
            .unwrap_or_default()
    }

    fn is_attached(&self, node: NodeId) -> bool {
        lock(&self.inner).is_attached(node)
    }

    fn role(&self, node: NodeId) -> Option<NodeRole> {
        self.read(node, |n| n.role)
    }

    fn entity_id(&self, node: NodeId) -> Option<EntityId> {
        self.read(node, |n| n.entity)
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.read(node, |n| Some(n.classes.iter().any(|c| c == class)))
            .unwrap_or(false)
    }

    fn style(&self, node: NodeId, property: &str) -> Option<String> {
        self.read(node, |n| n.styles.get(property).cloned())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.read(node, |n| n.attributes.get(name).cloned())
    }

    fn add_class(&self, node: NodeId, class: &str) -> StyleResult<()> {
        self.write(node, "class", |n| {
            if !n.classes.iter().any(|c| c == class) {
                n.classes.push(class.to_string());
            }
        })
    }

    fn remove_class(&self, node: NodeId, class: &str) -> StyleResult<()> {
        self.write(node, "class", |n| n.classes.retain(|c| c != class))
    }

    fn set_style(&self, node: NodeId, property: &str, value: &str) -> StyleResult<()> {
        self.write(node, "style", |n| {
            n.styles.insert(property.to_string(), value.to_string());
        })
    }

    fn remove_style(&self, node: NodeId, property: &str) -> StyleResult<()> {
        self.write(node, "style", |n| {
            n.styles.remove(property);
        })
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> StyleResult<()> {
        self.write(node, name, |n| {
            n.attributes.insert(name.to_string(), value.to_string());
        })
    }

    fn remove_attribute(&self, node: NodeId, name: &str) -> StyleResult<()> {
        self.write(node, name, |n| {
            n.attributes.remove(name);
        })
    }

    fn subscribe(&self, roots: &[NodeId], options: ObserveOptions) -> TreeSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.inner).subscribers.push(Subscriber {
            roots: roots.to_vec(),
            options,
            sender,
        });
        TreeSubscription::new(receiver)
    }
}
