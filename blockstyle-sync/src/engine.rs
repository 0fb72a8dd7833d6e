//! Sync passes.
//!
//! [`StyleEngine`] owns the caches, the locator, the writer and the
//! detector, and runs the two kinds of work the scheduler hands it: full
//! passes over every visible panel, and incremental handling of observed
//! change batches. It does no scheduling of its own.
//!
//! Every pass remembers the generation and the panel layout hash it
//! started with. Backend fetches are the only suspension points; if either
//! changed while they were in flight the results are dropped instead of
//! written.

use crate::backend::EntityBackend;
use crate::cache::PropertyCache;
use crate::config::EngineConfig;
use crate::detector::{ChangeDetector, DetectorPhase, Verdict};
use crate::host::HostState;
use crate::locator::NodeLocator;
use crate::lock;
use crate::multiplexer::ChangeBatch;
use crate::resolver::StyleResolver;
use crate::tree::{self, COLLAPSED_CLASS, MutationKind, NodeRole, RenderTree, TreeMutation};
use crate::writer::{EntityNodes, StyleWriter, WriteReport};
use blockstyle_model::{ResolvedStyle, topology_hash};
use blockstyle_types::{EntityId, NodeId, PanelId};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info};

/// Outcome of a full sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Generation the pass started in.
    pub generation: u64,
    /// Visible panels whose root was rendered.
    pub panels_seen: usize,
    pub entities_resolved: usize,
    pub entities_styled: usize,
    pub entities_cleared: usize,
    /// Individual tree writes.
    pub nodes_written: usize,
    pub stale_skipped: usize,
    /// Entities whose fetch failed plus node writes that failed.
    pub failures: usize,
    /// The topology changed mid-pass and nothing was written.
    pub discarded: bool,
    /// At least one panel was rendered with styled nodes in it.
    pub tree_ready: bool,
}

/// Outcome of handling one change batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub mutations: usize,
    /// Recorded containers compared against their expected state.
    pub containers_checked: usize,
    pub reapplied: usize,
    pub suppressed: usize,
    /// Newly rendered nodes that were styled.
    pub new_nodes: usize,
    pub entities_resolved: usize,
    pub nodes_written: usize,
    pub stale_skipped: usize,
    pub discarded: bool,
}

/// Outcome of a garbage collection sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub cache_purged: usize,
    pub panels_pruned: usize,
    pub nodes_forgotten: usize,
    pub styles_dropped: usize,
}

/// Resolves styles and keeps them applied to the render tree.
pub struct StyleEngine {
    tree: Arc<dyn RenderTree>,
    host: Arc<dyn HostState>,
    resolver: StyleResolver,
    locator: NodeLocator,
    writer: StyleWriter,
    detector: Mutex<ChangeDetector>,
    /// Last resolved style per entity in the current generation.
    styles: Mutex<HashMap<EntityId, ResolvedStyle>>,
    generation: AtomicU64,
    disposed: AtomicBool,
    config: EngineConfig,
}

impl StyleEngine {
    pub fn new(
        tree: Arc<dyn RenderTree>,
        backend: Arc<dyn EntityBackend>,
        host: Arc<dyn HostState>,
        config: EngineConfig,
    ) -> Self {
        let cache = Arc::new(PropertyCache::new(config.property_ttl, config.negative_ttl));
        Self {
            resolver: StyleResolver::new(backend, cache, config.max_tags),
            locator: NodeLocator::new(Arc::clone(&tree)),
            writer: StyleWriter::new(Arc::clone(&tree), config.style.clone()),
            detector: Mutex::new(ChangeDetector::new(
                config.stability_threshold,
                config.stable_window,
            )),
            styles: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            tree,
            host,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<PropertyCache> {
        self.resolver.cache()
    }

    pub fn locator(&self) -> &NodeLocator {
        &self.locator
    }

    pub fn writer(&self) -> &StyleWriter {
        &self.writer
    }

    /// Current topology generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Hash of the visible panel layout.
    pub fn topology_hash(&self) -> u64 {
        topology_hash(&self.host.panels())
    }

    /// Rendered roots of the visible panels.
    pub fn panel_roots(&self) -> Vec<NodeId> {
        self.host
            .panels()
            .iter()
            .filter_map(|p| self.locator.panel_root(&p.id))
            .collect()
    }

    /// Whether `entity` currently has a style applied.
    pub fn is_tracked(&self, entity: EntityId) -> bool {
        lock(&self.styles)
            .get(&entity)
            .is_some_and(|s| !s.is_none())
    }

    /// Last style resolved for `entity` in this generation.
    pub fn style_of(&self, entity: EntityId) -> Option<ResolvedStyle> {
        lock(&self.styles).get(&entity).cloned()
    }

    /// Detector phase of a container.
    pub fn node_phase(&self, node: NodeId) -> DetectorPhase {
        lock(&self.detector).phase(node)
    }

    /// Number of containers the detector is following.
    pub fn tracked_nodes(&self) -> usize {
        lock(&self.detector).len()
    }

    /// Drops everything derived from the old panel layout and starts a new
    /// generation. In-flight passes of the old generation are discarded.
    pub fn invalidate_topology(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.locator.invalidate_all();
        self.resolver.cache().clear();
        self.resolver.clear_aliases();
        lock(&self.styles).clear();
        lock(&self.detector).clear();
        info!("Panel topology changed, now at generation {}", generation);
    }

    /// Forgets what is known about one entity so the next resolution
    /// refetches it.
    pub fn forget_entity(&self, entity: EntityId) {
        self.resolver.cache().invalidate(entity);
        lock(&self.styles).remove(&entity);
    }

    /// Filter for the observation multiplexer.
    ///
    /// Keeps class changes inside a styled entity's container, and child
    /// insertions or removals that either happen inside one or bring in new
    /// styled nodes.
    pub fn is_relevant(&self, mutation: &TreeMutation) -> bool {
        let tree = self.tree.as_ref();
        let in_tracked = || {
            tree::nearest_container(tree, mutation.target)
                .and_then(|c| tree.entity_id(c))
                .is_some_and(|e| self.is_tracked(e))
        };
        match &mutation.kind {
            MutationKind::Attribute { .. } => mutation.is_class_change() && in_tracked(),
            MutationKind::ChildList { added, .. } => {
                in_tracked() || added.iter().any(|node| !styled_nodes(tree, *node).is_empty())
            }
        }
    }

    /// Runs a full pass over every visible panel.
    pub async fn sync_pass(&self) -> PassReport {
        let mut report = PassReport::default();
        if self.is_disposed() {
            return report;
        }
        let generation = self.generation();
        report.generation = generation;

        let panels = self.host.panels();
        let topology = topology_hash(&panels);
        debug!("Starting style sync over {} panels", panels.len());
        let mut targets: BTreeMap<EntityId, EntityNodes> = BTreeMap::new();
        for panel in &panels {
            let Some(nodes) = self.locator.panel_nodes(&panel.id) else {
                debug!("Panel {} is not rendered yet", panel.id);
                continue;
            };
            report.panels_seen += 1;
            for (entity, found) in nodes.by_entity(self.tree.as_ref()) {
                targets
                    .entry(entity)
                    .or_insert_with(|| EntityNodes::new(entity))
                    .merge(found);
            }
        }

        report.tree_ready = report.panels_seen > 0 && !targets.is_empty();
        if !report.tree_ready {
            debug!("Render tree not ready: {} panels rendered", report.panels_seen);
            return report;
        }

        let resolved = join_all(targets.keys().map(|id| async move {
            (*id, self.resolver.resolve_entity(*id).await)
        }))
        .await;
        report.entities_resolved = resolved.len();

        if !self.is_current(generation, topology) {
            info!(
                "Discarding style sync of generation {}: panel layout changed mid-pass",
                generation
            );
            report.discarded = true;
            return report;
        }

        for (id, style) in resolved {
            if self.resolver.has_failed(id) {
                report.failures += 1;
            }
            let Some(nodes) = targets.get(&id) else {
                continue;
            };
            let written = self.write_entity(nodes, &style);
            if style.is_none() {
                report.entities_cleared += 1;
            } else {
                report.entities_styled += 1;
            }
            report.nodes_written += written.writes;
            report.stale_skipped += written.skipped_stale;
            report.failures += written.failures;
        }

        info!(
            "Style sync finished: {} styled, {} cleared, {} writes, {} failures",
            report.entities_styled, report.entities_cleared, report.nodes_written, report.failures
        );
        report
    }

    /// Handles one coalesced batch of observed mutations.
    ///
    /// Newly rendered nodes are styled from the last resolved style of their
    /// entity, resolving only entities not seen yet. Containers the engine
    /// wrote before go through the detector.
    pub async fn handle_batch(&self, batch: &ChangeBatch) -> BatchReport {
        let mut report = BatchReport {
            mutations: batch.len(),
            ..BatchReport::default()
        };
        if self.is_disposed() {
            return report;
        }
        let generation = self.generation();
        let topology = self.topology_hash();
        let tree = self.tree.as_ref();

        let mut observed: Vec<(NodeId, bool)> = Vec::new();
        let mut fresh: BTreeMap<EntityId, EntityNodes> = BTreeMap::new();
        for mutation in &batch.mutations {
            let children_changed = match &mutation.kind {
                MutationKind::Attribute { .. } => false,
                MutationKind::ChildList { added, .. } => {
                    if let Some(panel) = self.locator.panel_of(mutation.target) {
                        self.locator.invalidate_panel(&panel);
                    }
                    for &node in added {
                        for (styled, role, entity) in styled_nodes(tree, node) {
                            fresh
                                .entry(entity)
                                .or_insert_with(|| EntityNodes::new(entity))
                                .push(styled, role);
                        }
                    }
                    true
                }
            };
            if let Some(container) = tree::nearest_container(tree, mutation.target) {
                match observed.iter_mut().find(|(c, _)| *c == container) {
                    Some(entry) => entry.1 |= children_changed,
                    None => observed.push((container, children_changed)),
                }
            }
        }

        let fresh_containers: HashSet<NodeId> = fresh
            .values()
            .flat_map(|n| n.containers.iter().copied())
            .collect();
        let mut reapply: BTreeMap<EntityId, EntityNodes> = BTreeMap::new();
        {
            let now = Instant::now();
            let mut detector = lock(&self.detector);
            for (container, children_changed) in observed {
                if fresh_containers.contains(&container) {
                    continue;
                }
                if !tree.is_attached(container) {
                    report.stale_skipped += 1;
                    continue;
                }
                let Some(entity) = tree.entity_id(container) else {
                    continue;
                };
                let snapshot = self.writer.snapshot(container);
                let collapsed = tree.has_class(container, COLLAPSED_CLASS);
                let verdict =
                    detector.observe(container, &snapshot, collapsed, children_changed, now);
                let write = match verdict {
                    Verdict::Untracked => self.is_tracked(entity),
                    Verdict::Suppressed => {
                        report.suppressed += 1;
                        false
                    }
                    Verdict::Matched | Verdict::BecameStable => false,
                    Verdict::Reapply => true,
                };
                if verdict != Verdict::Untracked {
                    report.containers_checked += 1;
                }
                if write {
                    report.reapplied += 1;
                    reapply
                        .entry(entity)
                        .or_insert_with(|| EntityNodes::new(entity))
                        .push(container, NodeRole::Container);
                }
            }
        }

        let unknown: Vec<EntityId> = {
            let styles = lock(&self.styles);
            fresh
                .keys()
                .chain(reapply.keys())
                .filter(|id| !styles.contains_key(id))
                .copied()
                .collect::<HashSet<_>>()
                .into_iter()
                .collect()
        };
        if !unknown.is_empty() {
            let resolved = join_all(unknown.iter().map(|id| async move {
                (*id, self.resolver.resolve_entity(*id).await)
            }))
            .await;
            report.entities_resolved = resolved.len();
            if !self.is_current(generation, topology) {
                debug!("Discarding change batch of generation {}", generation);
                report.discarded = true;
                return report;
            }
            lock(&self.styles).extend(resolved);
        }

        for nodes in fresh.values() {
            report.new_nodes += nodes.len();
        }
        for (entity, nodes) in fresh.into_iter().chain(reapply) {
            let style = self.style_of(entity).unwrap_or_default();
            let written = self.write_entity(&nodes, &style);
            report.nodes_written += written.writes;
            report.stale_skipped += written.skipped_stale;
        }

        if report.nodes_written > 0 || report.reapplied > 0 {
            debug!(
                "Handled {} mutations: {} reapplied, {} new nodes, {} writes",
                report.mutations, report.reapplied, report.new_nodes, report.nodes_written
            );
        }
        report
    }

    /// Drops expired cache entries and everything that refers to detached
    /// nodes or hidden panels.
    pub fn gc(&self) -> GcReport {
        let visible: Vec<PanelId> = self.host.panels().into_iter().map(|p| p.id).collect();
        let mut report = GcReport {
            cache_purged: self.resolver.cache().purge_expired(),
            panels_pruned: self.locator.prune(&visible),
            ..GcReport::default()
        };

        let live: HashSet<EntityId> = {
            let mut detector = lock(&self.detector);
            report.nodes_forgotten = detector.retain(|node| self.tree.is_attached(node));
            detector.entities().into_iter().collect()
        };
        {
            let mut styles = lock(&self.styles);
            let before = styles.len();
            styles.retain(|id, _| live.contains(id));
            report.styles_dropped = before - styles.len();
        }

        debug!(
            "Garbage collected {} cache entries, {} panels, {} nodes, {} styles",
            report.cache_purged, report.panels_pruned, report.nodes_forgotten, report.styles_dropped
        );
        report
    }

    /// Drops all state. Later passes do nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        lock(&self.detector).clear();
        lock(&self.styles).clear();
        self.locator.invalidate_all();
        self.resolver.cache().clear();
        self.resolver.clear_aliases();
        info!("Style engine disposed");
    }

    /// Whether a pass started in `generation` under the `topology` layout
    /// may still write.
    fn is_current(&self, generation: u64, topology: u64) -> bool {
        self.generation() == generation && self.topology_hash() == topology
    }

    /// Applies `style` to `nodes`, then records the written containers with
    /// the detector and the style in the per-entity map.
    fn write_entity(&self, nodes: &EntityNodes, style: &ResolvedStyle) -> WriteReport {
        let written = self.writer.apply(nodes, style);
        {
            let mut detector = lock(&self.detector);
            if style.is_none() {
                detector.retain(|node| !nodes.containers.contains(&node));
            } else {
                for &container in &nodes.containers {
                    if !self.tree.is_attached(container)
                        || self.tree.entity_id(container) != Some(nodes.entity)
                    {
                        continue;
                    }
                    detector.record_write(
                        container,
                        nodes.entity,
                        self.writer.snapshot(container),
                        self.tree.has_class(container, COLLAPSED_CLASS),
                    );
                }
            }
        }
        lock(&self.styles).insert(nodes.entity, style.clone());
        written
    }
}

/// Styled nodes (containers, titles, inline references with an entity id)
/// in the subtree rooted at `root`.
fn styled_nodes(tree: &dyn RenderTree, root: NodeId) -> Vec<(NodeId, NodeRole, EntityId)> {
    tree::descendants(tree, root)
        .into_iter()
        .filter_map(|node| {
            let role = tree.role(node)?;
            if !matches!(
                role,
                NodeRole::Container | NodeRole::Title | NodeRole::InlineReference
            ) {
                return None;
            }
            tree.entity_id(node).map(|entity| (node, role, entity))
        })
        .collect()
}
