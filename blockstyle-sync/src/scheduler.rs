//! Sync scheduling.
//!
//! [`SyncScheduler`] runs as a single task that owns the observation
//! multiplexer and drives the engine:
//!
//! - initial load: full passes with a fixed delay until the tree is ready,
//!   then the observer is attached
//! - state changes: debounced, a newer notification pushes the deadline
//!   out; a changed panel topology invalidates caches and re-attaches the
//!   observer before the pass
//! - observed batches: handled incrementally
//! - periodic garbage collection
//!
//! Hosts talk to the task through a [`SchedulerHandle`] and can follow it
//! through the [`SchedulerEvent`] channel.

use crate::config::EngineConfig;
use crate::engine::{BatchReport, GcReport, PassReport, StyleEngine};
use crate::error::{StyleError, StyleResult};
use crate::multiplexer::ObservationMultiplexer;
use crate::tree::RenderTree;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Commands accepted by the scheduler task.
#[derive(Debug)]
pub enum SchedulerCommand {
    /// The host state changed; run a debounced pass.
    StateChanged,
    /// Run a pass now, skipping the debounce.
    Resync,
    /// Run garbage collection now.
    CollectGarbage,
    /// Stop the task.
    Shutdown(oneshot::Sender<()>),
}

/// What the scheduler did, for hosts and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    PassCompleted(PassReport),
    BatchHandled(BatchReport),
    TopologyChanged { generation: u64 },
    ObserverAttached { roots: usize },
    ObserverAttachFailed { attempts: u32 },
    InitialSyncGaveUp { attempts: u32 },
    GarbageCollected(GcReport),
}

/// Handle to a running scheduler task.
#[derive(Debug)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Reports a host state change.
    pub fn notify(&self) -> StyleResult<()> {
        self.send(SchedulerCommand::StateChanged)
    }

    /// Requests an immediate pass.
    pub fn resync(&self) -> StyleResult<()> {
        self.send(SchedulerCommand::Resync)
    }

    /// Requests an immediate garbage collection.
    pub fn collect_garbage(&self) -> StyleResult<()> {
        self.send(SchedulerCommand::CollectGarbage)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(SchedulerCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
        if let Err(e) = self.task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }

    fn send(&self, command: SchedulerCommand) -> StyleResult<()> {
        self.commands
            .send(command)
            .map_err(|_| StyleError::ChannelClosed)
    }
}

/// The scheduler task.
pub struct SyncScheduler {
    engine: Arc<StyleEngine>,
    multiplexer: ObservationMultiplexer,
    commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    events: mpsc::UnboundedSender<SchedulerEvent>,
    config: EngineConfig,
    topology: u64,
    deadline: Option<Instant>,
}

impl SyncScheduler {
    /// Spawns the scheduler on the current tokio runtime.
    pub fn spawn(
        engine: Arc<StyleEngine>,
        tree: Arc<dyn RenderTree>,
    ) -> (SchedulerHandle, mpsc::UnboundedReceiver<SchedulerEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let config = engine.config().clone();
        let scheduler = Self {
            multiplexer: ObservationMultiplexer::new(
                tree,
                config.coalesce_window,
                config.attach_attempts,
                config.attach_backoff,
            ),
            topology: engine.topology_hash(),
            engine,
            commands: command_rx,
            events: event_tx,
            config,
            deadline: None,
        };
        let task = tokio::spawn(scheduler.run());
        (
            SchedulerHandle {
                commands: command_tx,
                task,
            },
            event_rx,
        )
    }

    async fn run(mut self) {
        info!("Style scheduler started");
        let mut shutdown = self.initial_sync().await;
        if shutdown.is_none() && !self.engine.is_disposed() {
            self.attach().await;
        }

        let period = self.config.gc_interval;
        let mut gc = tokio::time::interval_at(Instant::now() + period, period);
        gc.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while shutdown.is_none() {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SchedulerCommand::StateChanged) => {
                        self.deadline = Some(Instant::now() + self.config.debounce);
                    }
                    Some(SchedulerCommand::Resync) => {
                        self.deadline = None;
                        self.on_state_changed().await;
                    }
                    Some(SchedulerCommand::CollectGarbage) => self.collect_garbage(),
                    Some(SchedulerCommand::Shutdown(ack)) => shutdown = Some(Some(ack)),
                    None => shutdown = Some(None),
                },
                _ = tokio::time::sleep_until(self.deadline.unwrap_or_else(Instant::now)),
                    if self.deadline.is_some() =>
                {
                    self.deadline = None;
                    self.on_state_changed().await;
                }
                Some(batch) = self.multiplexer.next_batch(|m| self.engine.is_relevant(m)) => {
                    let report = self.engine.handle_batch(&batch).await;
                    if report.discarded {
                        self.retry_later();
                    }
                    self.emit(SchedulerEvent::BatchHandled(report));
                }
                _ = gc.tick() => self.collect_garbage(),
            }
        }

        self.multiplexer.stop();
        info!("Style scheduler stopped");
        if let Some(Some(ack)) = shutdown {
            let _ = ack.send(());
        }
    }

    /// Runs full passes until the tree is ready or the retries run out.
    ///
    /// Returns `Some` if a shutdown arrived meanwhile. Other commands are
    /// dropped; the pending initial pass covers them.
    async fn initial_sync(&mut self) -> Option<Option<oneshot::Sender<()>>> {
        let attempts = self.config.initial_retries.max(1);
        for attempt in 1..=attempts {
            let report = self.engine.sync_pass().await;
            self.emit(SchedulerEvent::PassCompleted(report));
            if report.tree_ready && !report.discarded {
                debug!("Initial style sync succeeded on attempt {}", attempt);
                return None;
            }
            if attempt == attempts {
                break;
            }
            let sleep = tokio::time::sleep(self.config.initial_retry_delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    command = self.commands.recv() => match command {
                        Some(SchedulerCommand::Shutdown(ack)) => return Some(Some(ack)),
                        None => return Some(None),
                        Some(_) => {}
                    },
                }
            }
        }
        warn!(
            "Render tree still not ready after {} attempts, waiting for the next change",
            attempts
        );
        self.emit(SchedulerEvent::InitialSyncGaveUp { attempts });
        None
    }

    async fn attach(&mut self) {
        let engine = Arc::clone(&self.engine);
        match self.multiplexer.start(|| engine.panel_roots()).await {
            Ok(roots) => self.emit(SchedulerEvent::ObserverAttached { roots }),
            Err(StyleError::NoPanelRoots { attempts }) => {
                self.emit(SchedulerEvent::ObserverAttachFailed { attempts });
            }
            Err(e) => warn!("Failed to attach observer: {}", e),
        }
    }

    async fn on_state_changed(&mut self) {
        let topology = self.engine.topology_hash();
        if topology != self.topology {
            self.topology = topology;
            self.engine.invalidate_topology();
            self.emit(SchedulerEvent::TopologyChanged {
                generation: self.engine.generation(),
            });
        }

        let report = self.engine.sync_pass().await;
        if report.discarded {
            self.retry_later();
        }
        self.emit(SchedulerEvent::PassCompleted(report));

        if self.multiplexer.refresh(self.engine.panel_roots()) {
            let roots = self.multiplexer.roots().len();
            if roots > 0 {
                self.emit(SchedulerEvent::ObserverAttached { roots });
            }
        }
    }

    /// Schedules another pass after the debounce. The next pass notices the
    /// new layout and starts a fresh generation.
    fn retry_later(&mut self) {
        debug!("Results were discarded, retrying after the debounce");
        self.deadline = Some(Instant::now() + self.config.debounce);
    }

    fn collect_garbage(&mut self) {
        let report = self.engine.gc();
        self.emit(SchedulerEvent::GarbageCollected(report));
    }

    fn emit(&self, event: SchedulerEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }
}
