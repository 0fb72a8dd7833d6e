//! Per-node change detection.
//!
//! Every container the engine writes is recorded with the snapshot the write
//! produced. Observation ticks compare what the tree shows now against that
//! snapshot:
//!
//! ```text
//! Unseen --write--> Unstable(0) --match--> Unstable(n) --n >= K--> Stable
//!                        ^                                            |
//!                        +------ mismatch / structural change --------+
//! ```
//!
//! While a node is [`Stable`](DetectorPhase::Stable) and still inside the
//! stability window, ticks are ignored outright. The writer's own mutations
//! come back through the observer; this is what stops them from turning
//! into another write.

use crate::writer::StyleSnapshot;
use blockstyle_types::{EntityId, NodeId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Detector state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    /// Never written.
    Unseen,
    /// Written; `matches` consecutive ticks agreed with the expected state.
    Unstable { matches: u32 },
    /// Agreed `K` times in a row; ticks are ignored until the window ends.
    Stable { since: Instant },
}

/// What an observation tick asks the caller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The node is not recorded.
    Untracked,
    /// Stable and inside the window; nothing was compared.
    Suppressed,
    /// The observed state matches; no write needed.
    Matched,
    /// The observed state matched for the K-th time in a row.
    BecameStable,
    /// The observed state diverged or the node changed structurally; the
    /// caller should re-apply and record the write.
    Reapply,
}

impl Verdict {
    pub fn needs_write(&self) -> bool {
        matches!(self, Verdict::Reapply)
    }
}

#[derive(Debug, Clone)]
struct NodeRecord {
    entity: EntityId,
    expected: StyleSnapshot,
    collapsed: bool,
    phase: DetectorPhase,
}

/// Expected-vs-observed bookkeeping for written nodes.
#[derive(Debug)]
pub struct ChangeDetector {
    threshold: u32,
    window: Duration,
    nodes: HashMap<NodeId, NodeRecord>,
}

impl ChangeDetector {
    /// `threshold` consecutive matches make a node stable for `window`.
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            nodes: HashMap::new(),
        }
    }

    /// Records that `node` was just written and now shows `expected`.
    pub fn record_write(
        &mut self,
        node: NodeId,
        entity: EntityId,
        expected: StyleSnapshot,
        collapsed: bool,
    ) {
        self.nodes.insert(
            node,
            NodeRecord {
                entity,
                expected,
                collapsed,
                phase: DetectorPhase::Unstable { matches: 0 },
            },
        );
    }

    /// Feeds one observation tick for `node`.
    ///
    /// `collapsed` is the node's current collapsed marker; `children_changed`
    /// reports a child insertion or removal under the node. Either change
    /// forces the node back to unstable and asks for a re-apply.
    pub fn observe(
        &mut self,
        node: NodeId,
        observed: &StyleSnapshot,
        collapsed: bool,
        children_changed: bool,
        now: Instant,
    ) -> Verdict {
        let threshold = self.threshold;
        let window = self.window;
        let Some(record) = self.nodes.get_mut(&node) else {
            return Verdict::Untracked;
        };

        if children_changed || collapsed != record.collapsed {
            record.collapsed = collapsed;
            record.phase = DetectorPhase::Unstable { matches: 0 };
            return Verdict::Reapply;
        }

        let matches = match record.phase {
            DetectorPhase::Stable { since } if now.saturating_duration_since(since) < window => {
                return Verdict::Suppressed;
            }
            DetectorPhase::Stable { .. } => threshold - 1,
            DetectorPhase::Unstable { matches } => matches,
            DetectorPhase::Unseen => 0,
        };

        if *observed != record.expected {
            record.phase = DetectorPhase::Unstable { matches: 0 };
            return Verdict::Reapply;
        }

        let matches = matches + 1;
        if matches >= threshold {
            let was_stable = matches!(record.phase, DetectorPhase::Stable { .. });
            record.phase = DetectorPhase::Stable { since: now };
            if was_stable {
                Verdict::Matched
            } else {
                Verdict::BecameStable
            }
        } else {
            record.phase = DetectorPhase::Unstable { matches };
            Verdict::Matched
        }
    }

    /// Current phase of `node`.
    pub fn phase(&self, node: NodeId) -> DetectorPhase {
        self.nodes
            .get(&node)
            .map(|r| r.phase)
            .unwrap_or(DetectorPhase::Unseen)
    }

    /// Entity a recorded node was written for.
    pub fn entity_of(&self, node: NodeId) -> Option<EntityId> {
        self.nodes.get(&node).map(|r| r.entity)
    }

    pub fn is_tracked(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Distinct entities with at least one recorded node.
    pub fn entities(&self) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = self.nodes.values().map(|r| r.entity).collect();
        out.sort();
        out.dedup();
        out
    }

    /// Forgets nodes for which `keep` returns false. Returns how many
    /// were forgotten.
    pub fn retain(&mut self, mut keep: impl FnMut(NodeId) -> bool) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|node, _| keep(*node));
        before - self.nodes.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
