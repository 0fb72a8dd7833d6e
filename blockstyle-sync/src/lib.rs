//! Style synchronization engine for blockstyle.
//!
//! Keeps the display color and icon derived from block properties (and the
//! properties of their tags) applied to a live render tree that the host
//! owns and rebuilds at will, across every visible panel.
//!
//! # Architecture
//!
//! Leaves first:
//!
//! - **Resolver**: pure priority rules turning an entity and its first tags
//!   into a [`ResolvedStyle`](blockstyle_model::ResolvedStyle)
//! - **Cache**: TTL-memoized backend fetches, including negative results
//! - **Locator**: panel roots and container nodes, revalidated before reuse
//! - **Writer**: idempotent apply/clear of a resolved style on one
//!   entity's nodes, with single-color and gradient paths
//! - **Detector**: per-node expected-vs-observed snapshots with a stability
//!   window, which keeps the writer's own mutations from re-triggering it
//! - **Multiplexer**: one subscription over all panel roots, filtered to
//!   structurally relevant changes and coalesced
//! - **Engine**: full and incremental sync passes
//! - **Scheduler**: debouncing, initial-load retries, topology changes and
//!   periodic garbage collection, run as a single task
//!
//! ## Sync pass
//!
//! 1. **Locate**: enumerate containers, titles and inline references per panel
//! 2. **Resolve**: fan out one resolution per entity through the cache
//! 3. **Check**: discard the results if the panel topology changed meanwhile
//! 4. **Write**: apply or clear each entity's style on its nodes
//! 5. **Register**: record written containers with the detector
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use blockstyle_model::PanelDescriptor;
//! use blockstyle_sync::backend::mock::MockBackend;
//! use blockstyle_sync::host::StaticHost;
//! use blockstyle_sync::tree::memory::MemoryTree;
//! use blockstyle_sync::{EngineConfig, StyleEngine};
//! use blockstyle_types::EntityId;
//!
//! # tokio_test::block_on(async {
//! let tree = Arc::new(MemoryTree::new());
//! let root = tree.mount_panel("p1");
//! let (_, handle, _) = tree.add_block(root, EntityId::new(100)).unwrap();
//!
//! let backend = Arc::new(MockBackend::new());
//! backend.insert_styled(100, Some("#ff0000"), None, &[]);
//! let host = Arc::new(StaticHost::new(vec![PanelDescriptor::new("p1", "block")]));
//!
//! let engine = StyleEngine::new(tree.clone(), backend, host, EngineConfig::default());
//! let report = engine.sync_pass().await;
//! assert_eq!(report.entities_styled, 1);
//! assert_eq!(tree.styles_of(handle).get("color").map(String::as_str), Some("#ff0000"));
//! # });
//! ```

pub mod backend;
pub mod cache;
mod config;
pub mod detector;
mod engine;
mod error;
pub mod gradient;
pub mod host;
pub mod locator;
pub mod multiplexer;
pub mod resolver;
mod runtime;
pub mod scheduler;
pub mod tree;
pub mod writer;

pub use backend::EntityBackend;
pub use cache::{CachedLookup, PropertyCache, TtlCache};
pub use config::{BackgroundMode, EngineConfig, MAX_TAGS, StyleSettings};
pub use detector::{ChangeDetector, DetectorPhase, Verdict};
pub use engine::{BatchReport, GcReport, PassReport, StyleEngine};
pub use error::{StyleError, StyleResult};
pub use gradient::{GradientShape, generate_multi_color_background};
pub use host::HostState;
pub use locator::{NodeLocator, PanelNodes};
pub use multiplexer::{ChangeBatch, ObservationMultiplexer};
pub use resolver::{StyleResolver, resolve};
pub use runtime::SyncEngine;
pub use scheduler::{SchedulerCommand, SchedulerEvent, SchedulerHandle, SyncScheduler};
pub use tree::{NodeRole, RenderTree, TreeMutation};
pub use writer::{EntityNodes, StyleSnapshot, StyleWriter, WriteReport};

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
