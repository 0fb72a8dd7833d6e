//! Render-tree abstraction.
//!
//! The render tree is owned and rebuilt by the host. The engine reads it,
//! patches a handful of attributes on it, and subscribes to its mutations.
//! Everything the engine needs goes through [`RenderTree`], so the same
//! engine drives a browser DOM adapter or the in-memory [`memory::MemoryTree`].

pub mod memory;

use crate::error::StyleResult;
use blockstyle_types::{EntityId, NodeId, PanelId};
use tokio::sync::mpsc;

/// Class the host puts on a container whose children are folded away.
pub const COLLAPSED_CLASS: &str = "collapsed";

/// What a node renders, as far as styling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// The block container; carries the entity id.
    Container,
    /// The bullet/handle of a container; receives color, icon and gradient.
    Handle,
    /// The text area of a container; receives the content gradient.
    Content,
    /// A panel or block title for an entity.
    Title,
    /// An inline reference to an entity inside some other block's text.
    InlineReference,
}

/// Which mutations a subscription reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveOptions {
    pub attributes: bool,
    pub child_list: bool,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            attributes: true,
            child_list: true,
        }
    }
}

/// What changed on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    /// An attribute changed. Class changes use `class`, inline style
    /// changes use `style`.
    Attribute { name: String },
    /// Children were inserted or removed.
    ChildList {
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
}

/// One observed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeMutation {
    pub target: NodeId,
    pub kind: MutationKind,
}

impl TreeMutation {
    pub fn attribute(target: NodeId, name: impl Into<String>) -> Self {
        Self {
            target,
            kind: MutationKind::Attribute { name: name.into() },
        }
    }

    pub fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            target,
            kind: MutationKind::ChildList { added, removed },
        }
    }

    /// Whether this is a class attribute change.
    pub fn is_class_change(&self) -> bool {
        matches!(&self.kind, MutationKind::Attribute { name } if name == "class")
    }
}

/// A stream of mutation batches. Dropping it unsubscribes.
#[derive(Debug)]
pub struct TreeSubscription {
    receiver: mpsc::UnboundedReceiver<Vec<TreeMutation>>,
}

impl TreeSubscription {
    /// Wraps the receiving end of a tree's mutation channel.
    pub fn new(receiver: mpsc::UnboundedReceiver<Vec<TreeMutation>>) -> Self {
        Self { receiver }
    }

    /// Waits for the next batch. `None` once the tree drops the sender.
    pub async fn recv(&mut self) -> Option<Vec<TreeMutation>> {
        self.receiver.recv().await
    }

    /// Returns a batch if one is already queued.
    pub fn try_recv(&mut self) -> Option<Vec<TreeMutation>> {
        self.receiver.try_recv().ok()
    }

    /// Stops the subscription.
    pub fn unsubscribe(mut self) {
        self.receiver.close();
    }
}

/// The externally owned render tree.
///
/// Reads on unknown or detached nodes return `None`/empty; writes on them
/// fail with [`StyleError::Detached`](crate::StyleError::Detached).
pub trait RenderTree: Send + Sync {
    /// Root node of a panel, if the host has rendered it.
    fn panel_root(&self, panel: &PanelId) -> Option<NodeId>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Whether the node is still part of the tree.
    fn is_attached(&self, node: NodeId) -> bool;

    fn role(&self, node: NodeId) -> Option<NodeRole>;

    /// Entity a container, title or inline reference stands for.
    fn entity_id(&self, node: NodeId) -> Option<EntityId>;

    fn has_class(&self, node: NodeId, class: &str) -> bool;

    fn style(&self, node: NodeId, property: &str) -> Option<String>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn add_class(&self, node: NodeId, class: &str) -> StyleResult<()>;

    fn remove_class(&self, node: NodeId, class: &str) -> StyleResult<()>;

    fn set_style(&self, node: NodeId, property: &str, value: &str) -> StyleResult<()>;

    fn remove_style(&self, node: NodeId, property: &str) -> StyleResult<()>;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> StyleResult<()>;

    fn remove_attribute(&self, node: NodeId, name: &str) -> StyleResult<()>;

    /// Subscribes to mutations of `roots` and their descendants.
    fn subscribe(&self, roots: &[NodeId], options: ObserveOptions) -> TreeSubscription;
}

/// Nearest container at or above `node`.
pub fn nearest_container(tree: &dyn RenderTree, node: NodeId) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(n) = current {
        if tree.role(n) == Some(NodeRole::Container) {
            return Some(n);
        }
        current = tree.parent(n);
    }
    None
}

/// Nearest container strictly above `node`.
pub fn enclosing_container(tree: &dyn RenderTree, node: NodeId) -> Option<NodeId> {
    tree.parent(node).and_then(|p| nearest_container(tree, p))
}

/// Whether `node` is `ancestor` or lies below it.
pub fn is_within(tree: &dyn RenderTree, node: NodeId, ancestor: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if n == ancestor {
            return true;
        }
        current = tree.parent(n);
    }
    false
}

/// All nodes of the subtree rooted at `root`, in document order.
///
/// Iterative so that deep outlines cannot exhaust the stack.
pub fn descendants(tree: &dyn RenderTree, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        out.push(node);
        let children = tree.children(node);
        stack.extend(children.into_iter().rev());
    }
    out
}

/// Handle and content nodes that belong to `container` itself.
///
/// The walk does not descend into nested containers, whose surfaces share
/// the same roles but belong to other entities.
pub fn own_surfaces(tree: &dyn RenderTree, container: NodeId) -> Vec<(NodeId, NodeRole)> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = tree.children(container).into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        match tree.role(node) {
            Some(NodeRole::Container) => continue,
            Some(role @ (NodeRole::Handle | NodeRole::Content)) => out.push((node, role)),
            _ => {}
        }
        stack.extend(tree.children(node).into_iter().rev());
    }
    out
}
