//! Shared tree observation.
//!
//! One subscription covers every panel root. Incoming mutations are run
//! through a relevance filter and gathered for a short coalescing window,
//! so that a burst of re-renders reaches the engine as a single
//! [`ChangeBatch`].

use crate::error::{StyleError, StyleResult};
use crate::tree::{MutationKind, ObserveOptions, RenderTree, TreeMutation, TreeSubscription};
use blockstyle_types::NodeId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Relevant mutations gathered over one coalescing window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub mutations: Vec<TreeMutation>,
}

impl ChangeBatch {
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Nodes inserted anywhere in the batch.
    pub fn added_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for m in &self.mutations {
            if let MutationKind::ChildList { added, .. } = &m.kind {
                for node in added {
                    if !out.contains(node) {
                        out.push(*node);
                    }
                }
            }
        }
        out
    }

    /// Whether any mutation inserted or removed children.
    pub fn has_child_changes(&self) -> bool {
        self.mutations
            .iter()
            .any(|m| matches!(m.kind, MutationKind::ChildList { .. }))
    }
}

/// One subscription over all panel roots.
pub struct ObservationMultiplexer {
    tree: Arc<dyn RenderTree>,
    subscription: Option<TreeSubscription>,
    roots: Vec<NodeId>,
    pending: Vec<TreeMutation>,
    deadline: Option<Instant>,
    coalesce_window: Duration,
    attach_attempts: u32,
    attach_backoff: Duration,
}

impl ObservationMultiplexer {
    pub fn new(
        tree: Arc<dyn RenderTree>,
        coalesce_window: Duration,
        attach_attempts: u32,
        attach_backoff: Duration,
    ) -> Self {
        Self {
            tree,
            subscription: None,
            roots: Vec::new(),
            pending: Vec::new(),
            deadline: None,
            coalesce_window,
            attach_attempts: attach_attempts.max(1),
            attach_backoff,
        }
    }

    /// Subscribes over the roots returned by `roots`, retrying with a
    /// doubling backoff while there are none.
    pub async fn start(&mut self, roots: impl Fn() -> Vec<NodeId>) -> StyleResult<usize> {
        let mut delay = self.attach_backoff;
        for attempt in 1..=self.attach_attempts {
            let found = roots();
            if !found.is_empty() {
                self.attach(found);
                return Ok(self.roots.len());
            }
            if attempt < self.attach_attempts {
                debug!(
                    "No panel roots to observe (attempt {}/{}), retrying in {:?}",
                    attempt, self.attach_attempts, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
        warn!(
            "Gave up attaching the observer after {} attempts",
            self.attach_attempts
        );
        Err(StyleError::NoPanelRoots {
            attempts: self.attach_attempts,
        })
    }

    /// Re-attaches if the set of roots changed. Returns whether it did.
    pub fn refresh(&mut self, roots: Vec<NodeId>) -> bool {
        let mut sorted = roots.clone();
        sorted.sort();
        let mut current = self.roots.clone();
        current.sort();
        if self.subscription.is_some() && sorted == current {
            return false;
        }
        self.stop();
        if !roots.is_empty() {
            self.attach(roots);
        }
        true
    }

    /// Drops the subscription and anything still pending.
    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            debug!("Observer detached from {} roots", self.roots.len());
        }
        self.roots.clear();
        self.pending.clear();
        self.deadline = None;
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    /// Roots currently observed.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Waits for the next coalesced batch of mutations accepted by
    /// `relevant`.
    ///
    /// Pending while detached. Cancel-safe: mutations received before the
    /// future is dropped stay queued for the next call.
    pub async fn next_batch(
        &mut self,
        relevant: impl Fn(&TreeMutation) -> bool,
    ) -> Option<ChangeBatch> {
        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                return std::future::pending().await;
            };

            let received = match self.deadline {
                None => subscription.recv().await,
                Some(deadline) => tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        self.deadline = None;
                        let mutations = std::mem::take(&mut self.pending);
                        return Some(ChangeBatch { mutations });
                    }
                    received = subscription.recv() => received,
                },
            };

            match received {
                Some(mutations) => {
                    let before = self.pending.len();
                    self.pending
                        .extend(mutations.into_iter().filter(|m| relevant(m)));
                    if self.deadline.is_none() && self.pending.len() > before {
                        self.deadline = Some(Instant::now() + self.coalesce_window);
                    }
                }
                None => {
                    debug!("Render tree closed the observer channel");
                    self.subscription = None;
                    if !self.pending.is_empty() {
                        self.deadline = None;
                        let mutations = std::mem::take(&mut self.pending);
                        return Some(ChangeBatch { mutations });
                    }
                }
            }
        }
    }

    fn attach(&mut self, roots: Vec<NodeId>) {
        let subscription = self.tree.subscribe(&roots, ObserveOptions::default());
        info!("Observer attached to {} panel roots", roots.len());
        self.subscription = Some(subscription);
        self.roots = roots;
    }
}
