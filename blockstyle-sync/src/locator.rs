//! Panel and container lookup.
//!
//! Scanning a panel for containers walks its whole subtree, so the result is
//! kept per panel. Any cached node is revalidated before reuse: the host
//! replaces subtrees without notice, and a cached root or container that is
//! no longer attached triggers a rescan instead of being handed out.

use crate::lock;
use crate::tree::{self, NodeRole, RenderTree};
use crate::writer::EntityNodes;
use blockstyle_types::{EntityId, NodeId, PanelId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Styled nodes found under one panel root, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelNodes {
    pub root: NodeId,
    pub containers: Vec<NodeId>,
    pub titles: Vec<NodeId>,
    pub inline_refs: Vec<NodeId>,
}

impl PanelNodes {
    /// Collects the styled nodes of the subtree rooted at `root`.
    pub fn scan(tree: &dyn RenderTree, root: NodeId) -> Self {
        let mut nodes = Self {
            root,
            containers: Vec::new(),
            titles: Vec::new(),
            inline_refs: Vec::new(),
        };
        for node in tree::descendants(tree, root) {
            if tree.entity_id(node).is_none() {
                continue;
            }
            match tree.role(node) {
                Some(NodeRole::Container) => nodes.containers.push(node),
                Some(NodeRole::Title) => nodes.titles.push(node),
                Some(NodeRole::InlineReference) => nodes.inline_refs.push(node),
                _ => {}
            }
        }
        nodes
    }

    /// Groups the nodes by the entity they stand for.
    pub fn by_entity(&self, tree: &dyn RenderTree) -> BTreeMap<EntityId, EntityNodes> {
        let mut out: BTreeMap<EntityId, EntityNodes> = BTreeMap::new();
        let roles = [
            (NodeRole::Container, &self.containers),
            (NodeRole::Title, &self.titles),
            (NodeRole::InlineReference, &self.inline_refs),
        ];
        for (role, list) in roles {
            for &node in list {
                if let Some(entity) = tree.entity_id(node) {
                    out.entry(entity)
                        .or_insert_with(|| EntityNodes::new(entity))
                        .push(node, role);
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.containers.len() + self.titles.len() + self.inline_refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn all_attached(&self, tree: &dyn RenderTree) -> bool {
        tree.is_attached(self.root)
            && self
                .containers
                .iter()
                .chain(&self.titles)
                .chain(&self.inline_refs)
                .all(|n| tree.is_attached(*n))
    }
}

#[derive(Debug)]
struct PanelEntry {
    root: NodeId,
    nodes: Option<PanelNodes>,
}

/// Finds panel roots and their styled nodes, with cached lookups.
pub struct NodeLocator {
    tree: Arc<dyn RenderTree>,
    panels: Mutex<HashMap<PanelId, PanelEntry>>,
    scans: AtomicUsize,
}

impl NodeLocator {
    pub fn new(tree: Arc<dyn RenderTree>) -> Self {
        Self {
            tree,
            panels: Mutex::new(HashMap::new()),
            scans: AtomicUsize::new(0),
        }
    }

    /// The root node of `panel`, if it is rendered.
    pub fn panel_root(&self, panel: &PanelId) -> Option<NodeId> {
        {
            let panels = lock(&self.panels);
            if let Some(entry) = panels.get(panel) {
                if self.tree.is_attached(entry.root)
                    && self.tree.panel_root(panel) == Some(entry.root)
                {
                    return Some(entry.root);
                }
            }
        }

        let root = self.tree.panel_root(panel);
        let mut panels = lock(&self.panels);
        match root {
            Some(root) => {
                let replaced = panels.insert(panel.clone(), PanelEntry { root, nodes: None });
                if replaced.is_some() {
                    debug!("Panel {} was re-rendered under {}", panel, root);
                }
            }
            None => {
                panels.remove(panel);
            }
        }
        root
    }

    /// The styled nodes of `panel`, rescanning when the cached set went
    /// stale.
    pub fn panel_nodes(&self, panel: &PanelId) -> Option<PanelNodes> {
        let root = self.panel_root(panel)?;
        {
            let panels = lock(&self.panels);
            if let Some(nodes) = panels.get(panel).and_then(|e| e.nodes.as_ref()) {
                if nodes.root == root && nodes.all_attached(self.tree.as_ref()) {
                    return Some(nodes.clone());
                }
            }
        }

        let nodes = PanelNodes::scan(self.tree.as_ref(), root);
        self.scans.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Scanned panel {}: {} containers, {} titles, {} inline references",
            panel,
            nodes.containers.len(),
            nodes.titles.len(),
            nodes.inline_refs.len()
        );
        lock(&self.panels).insert(
            panel.clone(),
            PanelEntry {
                root,
                nodes: Some(nodes.clone()),
            },
        );
        Some(nodes)
    }

    /// Container nodes of `panel`.
    pub fn container_nodes(&self, panel: &PanelId) -> Vec<NodeId> {
        self.panel_nodes(panel)
            .map(|n| n.containers)
            .unwrap_or_default()
    }

    /// Panel whose cached root contains `node`.
    pub fn panel_of(&self, node: NodeId) -> Option<PanelId> {
        let panels = lock(&self.panels);
        panels
            .iter()
            .find(|(_, entry)| tree::is_within(self.tree.as_ref(), node, entry.root))
            .map(|(id, _)| id.clone())
    }

    /// Forgets the scanned nodes of one panel. The root stays cached and is
    /// revalidated on next use.
    pub fn invalidate_panel(&self, panel: &PanelId) {
        if let Some(entry) = lock(&self.panels).get_mut(panel) {
            entry.nodes = None;
        }
    }

    /// Forgets everything.
    pub fn invalidate_all(&self) {
        lock(&self.panels).clear();
    }

    /// Drops panels that are not in `visible` or whose root was detached.
    /// Returns how many were dropped.
    pub fn prune(&self, visible: &[PanelId]) -> usize {
        let mut panels = lock(&self.panels);
        let before = panels.len();
        panels.retain(|id, entry| visible.contains(id) && self.tree.is_attached(entry.root));
        before - panels.len()
    }

    /// Roots currently cached.
    pub fn cached_roots(&self) -> Vec<NodeId> {
        lock(&self.panels).values().map(|e| e.root).collect()
    }

    /// Number of subtree scans performed so far.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }
}
