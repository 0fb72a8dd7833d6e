//! The embedding façade.
//!
//! [`SyncEngine`] bundles a [`StyleEngine`] with its scheduler task and the
//! editing affordances, behind an explicit `init()`/`dispose()` lifecycle.
//! No state lives outside the object.

use crate::backend::EntityBackend;
use crate::config::EngineConfig;
use crate::engine::StyleEngine;
use crate::error::{StyleError, StyleResult};
use crate::host::HostState;
use crate::lock;
use crate::scheduler::{SchedulerEvent, SchedulerHandle, SyncScheduler};
use crate::tree::RenderTree;
use blockstyle_model::{Property, PropertyName};
use blockstyle_types::{Color, EntityId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A style engine with its lifecycle.
pub struct SyncEngine {
    engine: Arc<StyleEngine>,
    tree: Arc<dyn RenderTree>,
    backend: Arc<dyn EntityBackend>,
    scheduler: Mutex<Option<SchedulerHandle>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<SchedulerEvent>>>,
    disposed: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        tree: Arc<dyn RenderTree>,
        backend: Arc<dyn EntityBackend>,
        host: Arc<dyn HostState>,
        config: EngineConfig,
    ) -> Self {
        let engine = StyleEngine::new(Arc::clone(&tree), Arc::clone(&backend), host, config);
        Self {
            engine: Arc::new(engine),
            tree,
            backend,
            scheduler: Mutex::new(None),
            events: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Arc<StyleEngine> {
        &self.engine
    }

    /// Starts the scheduler. Must be called within a tokio runtime.
    /// Calling it again while running does nothing.
    pub fn init(&self) -> StyleResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StyleError::Disposed);
        }
        let mut scheduler = lock(&self.scheduler);
        if scheduler.as_ref().is_some_and(SchedulerHandle::is_running) {
            debug!("Style engine already initialized");
            return Ok(());
        }
        let (handle, events) =
            SyncScheduler::spawn(Arc::clone(&self.engine), Arc::clone(&self.tree));
        *scheduler = Some(handle);
        *lock(&self.events) = Some(events);
        info!("Style engine initialized");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.scheduler)
            .as_ref()
            .is_some_and(SchedulerHandle::is_running)
    }

    /// Takes the scheduler event stream. Only the first caller after each
    /// `init()` gets it.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SchedulerEvent>> {
        lock(&self.events).take()
    }

    /// Reports a host state change; the pass runs after the debounce.
    pub fn notify_state_changed(&self) -> StyleResult<()> {
        self.with_scheduler(SchedulerHandle::notify)
    }

    /// Runs a pass right away.
    pub fn resync(&self) -> StyleResult<()> {
        self.with_scheduler(SchedulerHandle::resync)
    }

    /// Sets or clears an entity's own color.
    pub async fn set_color(&self, entity: EntityId, color: Option<Color>) -> StyleResult<()> {
        let property = match color {
            Some(color) => Property::enabled(PropertyName::Color, color.to_hex()),
            None => Property::disabled(PropertyName::Color),
        };
        self.write_property(entity, property).await
    }

    /// Sets or clears an entity's own icon.
    pub async fn set_icon(&self, entity: EntityId, icon: Option<String>) -> StyleResult<()> {
        let property = match icon.filter(|i| !i.trim().is_empty()) {
            Some(icon) => Property::enabled(PropertyName::Icon, icon),
            None => Property::disabled(PropertyName::Icon),
        };
        self.write_property(entity, property).await
    }

    /// Stops the scheduler and drops all engine state. Final.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = lock(&self.scheduler).take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        *lock(&self.events) = None;
        self.engine.dispose();
    }

    async fn write_property(&self, entity: EntityId, property: Property) -> StyleResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StyleError::Disposed);
        }
        self.backend
            .write_entity_properties(entity, vec![property.to_raw()])
            .await?;
        debug!("Wrote {} of entity {}", property.name.as_str(), entity);
        self.engine.forget_entity(entity);
        if self.is_running() {
            self.notify_state_changed()
        } else {
            Ok(())
        }
    }

    fn with_scheduler(
        &self,
        f: impl FnOnce(&SchedulerHandle) -> StyleResult<()>,
    ) -> StyleResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StyleError::Disposed);
        }
        match lock(&self.scheduler).as_ref() {
            Some(handle) => f(handle),
            None => Err(StyleError::ChannelClosed),
        }
    }
}
